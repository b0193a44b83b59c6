//! File output adapter: generated `.mq5` source and the input sheet CSV.

use std::fs;
use std::path::Path;

use crate::domain::error::EaforgeError;
use crate::domain::program::DeclaredInput;
use crate::ports::output_port::OutputPort;

pub const INPUT_SHEET_HEADER: [&str; 6] =
    ["name", "type", "default", "group", "optimizable", "comment"];

pub struct FileOutputAdapter;

fn ensure_parent(path: &Path) -> Result<(), EaforgeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Declared inputs as CSV text, header first.
pub fn input_sheet(inputs: &[DeclaredInput]) -> Result<String, EaforgeError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let to_io = |e: csv::Error| EaforgeError::Io(std::io::Error::other(e));
    writer.write_record(INPUT_SHEET_HEADER).map_err(to_io)?;
    for input in inputs {
        writer
            .write_record([
                input.name.as_str(),
                input.ty.mql(),
                input.default_value.as_str(),
                input.group.as_str(),
                if input.optimizable { "true" } else { "false" },
                input.comment.as_str(),
            ])
            .map_err(to_io)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| EaforgeError::Io(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| EaforgeError::Io(std::io::Error::other(e)))
}

impl OutputPort for FileOutputAdapter {
    fn write_source(&self, source: &str, output_path: &str) -> Result<(), EaforgeError> {
        let path = Path::new(output_path);
        ensure_parent(path)?;
        fs::write(path, source)?;
        Ok(())
    }

    fn write_inputs(
        &self,
        inputs: &[DeclaredInput],
        output_path: &str,
    ) -> Result<(), EaforgeError> {
        let path = Path::new(output_path);
        ensure_parent(path)?;
        fs::write(path, input_sheet(inputs)?)?;
        Ok(())
    }
}
