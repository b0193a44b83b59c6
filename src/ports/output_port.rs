//! Compile output port trait.

use crate::domain::error::EaforgeError;
use crate::domain::program::DeclaredInput;

/// Port for writing generated source and the declared-input sheet.
pub trait OutputPort {
    fn write_source(&self, source: &str, output_path: &str) -> Result<(), EaforgeError>;

    fn write_inputs(&self, inputs: &[DeclaredInput], output_path: &str)
    -> Result<(), EaforgeError>;
}
