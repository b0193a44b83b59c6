//! Compile pipeline.
//!
//! One graph in, one program out: validate settings, build the graph,
//! assemble, then run the optional passes in a fixed order (multi-pair,
//! telemetry, track-record) and render.

use tracing::{debug, info};

use crate::domain::assembler;
use crate::domain::config_validation::validate_generation_context;
use crate::domain::context::GenerationContext;
use crate::domain::diagnostics::{Diagnostics, Warning};
use crate::domain::error::EaforgeError;
use crate::domain::graph::StrategyGraph;
use crate::domain::graph::document::GraphDocument;
use crate::domain::multi_pair;
use crate::domain::program::{DeclaredInput, Program};
use crate::domain::telemetry;
use crate::domain::track_record;

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub source: String,
    pub inputs: Vec<DeclaredInput>,
    pub warnings: Vec<Warning>,
    pub program: Program,
}

/// Trim and upper-case multi-pair symbols so `eurusd ` and `EURUSD` agree.
pub fn normalize_context(ctx: &GenerationContext) -> GenerationContext {
    let mut ctx = ctx.clone();
    ctx.ea_name = ctx.ea_name.trim().to_string();
    if let Some(multi) = ctx.multi_pair.as_mut() {
        multi.symbols = multi
            .symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .collect();
    }
    ctx
}

/// Compile `document` with the already merged generation context.
pub fn compile(
    document: &GraphDocument,
    context: &GenerationContext,
) -> Result<CompileOutput, EaforgeError> {
    let ctx = normalize_context(context);
    validate_generation_context(&ctx)?;

    let mut diag = Diagnostics::new();
    let graph = StrategyGraph::new(document.nodes.clone(), document.edges.clone(), &mut diag)?;
    debug!(nodes = graph.nodes().len(), edges = graph.edges().len(), "graph built");

    let mut program = assembler::assemble(&graph, &ctx, &mut diag)?;

    if let Some(multi) = &ctx.multi_pair {
        program = multi_pair::apply(program, &multi.symbols)?;
    }
    if let Some(settings) = ctx.telemetry.as_ref().filter(|t| !t.base_url.trim().is_empty()) {
        program = telemetry::apply(program, settings)?;
    }
    if let Some(settings) = ctx
        .track_record
        .as_ref()
        .filter(|t| !t.base_url.trim().is_empty())
    {
        program = track_record::apply(program, settings)?;
    }

    let source = program.render();
    let warnings = diag.into_warnings();
    info!(
        ea = %ctx.ea_name,
        inputs = program.inputs().len(),
        warnings = warnings.len(),
        bytes = source.len(),
        "compiled"
    );

    Ok(CompileOutput {
        source,
        inputs: program.inputs().to_vec(),
        warnings,
        program,
    })
}
