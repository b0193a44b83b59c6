//! Port traits at the I/O seams.

pub mod config_port;
pub mod graph_port;
pub mod ledger_port;
pub mod output_port;
