//! JSON graph document adapter.

use std::fs;
use std::path::PathBuf;

use crate::domain::error::EaforgeError;
use crate::domain::graph::document::GraphDocument;
use crate::ports::graph_port::GraphPort;

pub struct JsonGraphAdapter {
    path: PathBuf,
}

impl JsonGraphAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl GraphPort for JsonGraphAdapter {
    fn load_document(&self) -> Result<GraphDocument, EaforgeError> {
        let text = fs::read_to_string(&self.path)?;
        GraphDocument::from_json(&text).map_err(|e| match e {
            EaforgeError::Json(inner) => EaforgeError::InvalidDocument {
                reason: format!("{}: {}", self.path.display(), inner),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_doc(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn loads_document_from_file() {
        let file = write_doc(r#"{ "nodes": [ { "id": "a", "type": "atr" } ], "edges": [] }"#);
        let doc = JsonGraphAdapter::new(file.path().to_path_buf())
            .load_document()
            .unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].id, "a");
    }

    #[test]
    fn malformed_json_names_the_file() {
        let file = write_doc("{ not json");
        let err = JsonGraphAdapter::new(file.path().to_path_buf())
            .load_document()
            .unwrap_err();
        match err {
            EaforgeError::InvalidDocument { reason } => {
                assert!(reason.contains(&file.path().display().to_string()))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = JsonGraphAdapter::new(PathBuf::from("/nonexistent/graph.json"))
            .load_document()
            .unwrap_err();
        assert!(matches!(err, EaforgeError::Io(_)));
    }

    #[test]
    fn unknown_node_type_passes_through() {
        let file = write_doc(r#"{ "nodes": [ { "id": "x", "type": "neural-net" } ] }"#);
        let err = JsonGraphAdapter::new(file.path().to_path_buf())
            .load_document()
            .unwrap_err();
        assert!(matches!(err, EaforgeError::UnknownNodeType { .. }));
    }
}
