//! Graph document source port trait.

use crate::domain::error::EaforgeError;
use crate::domain::graph::document::GraphDocument;

pub trait GraphPort {
    fn load_document(&self) -> Result<GraphDocument, EaforgeError>;
}
