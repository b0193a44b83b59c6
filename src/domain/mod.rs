//! Domain layer: graph model, program representation and the compiler passes.

pub mod assembler;
pub mod config_validation;
pub mod context;
pub mod diagnostics;
pub mod emit;
pub mod entry_logic;
pub mod error;
pub mod graph;
pub mod multi_pair;
pub mod pipeline;
pub mod program;
pub mod telemetry;
pub mod track_record;
