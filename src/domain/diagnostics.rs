//! Compile-time warnings.
//!
//! Recoverable configuration problems never abort a compile. They are logged
//! through `tracing` and collected so the caller can show them next to the
//! generated source.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub node_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(id) => write!(f, "node {}: {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, node_id: Option<&str>, message: impl Into<String>) {
        let warning = Warning {
            node_id: node_id.map(str::to_string),
            message: message.into(),
        };
        tracing::warn!(node = ?warning.node_id, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order() {
        let mut diag = Diagnostics::new();
        diag.warn(Some("n1"), "first");
        diag.warn(None, "second");
        let w = diag.into_warnings();
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].to_string(), "node n1: first");
        assert_eq!(w[1].to_string(), "second");
    }
}
