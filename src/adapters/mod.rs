//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod file_output_adapter;
pub mod json_graph_adapter;
pub mod ledger_file_adapter;
