//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_output_adapter::FileOutputAdapter;
use crate::adapters::json_graph_adapter::JsonGraphAdapter;
use crate::adapters::ledger_file_adapter::JsonlEventLog;
use crate::domain::context::{Combinator, GenerationContext};
use crate::domain::error::EaforgeError;
use crate::domain::graph::NodeCategory;
use crate::domain::graph::document::GraphDocument;
use crate::domain::pipeline::{CompileOutput, compile};
use crate::domain::track_record::chain::verify_chain;
use crate::ports::config_port::ConfigPort;
use crate::ports::graph_port::GraphPort;
use crate::ports::output_port::OutputPort;

#[derive(Parser, Debug)]
#[command(name = "eaforge", about = "Compile strategy graphs into MQL5 expert advisors")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a graph document to MQL5 source
    Compile {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        inputs_csv: Option<PathBuf>,
    },
    /// Run the pipeline without writing anything
    Validate {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the declared inputs of the generated program
    Inputs {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Verify the hash chain of a track-record event log
    VerifyChain {
        #[arg(short, long)]
        events: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Compile {
            graph,
            config,
            output,
            inputs_csv,
        } => run_compile(&graph, config.as_deref(), output.as_deref(), inputs_csv.as_deref()),
        Command::Validate { graph, config } => run_validate(&graph, config.as_deref()),
        Command::Inputs { graph, config } => run_inputs(&graph, config.as_deref()),
        Command::VerifyChain { events } => run_verify_chain(&events),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Overlay INI keys on the document settings. Absent keys keep the
/// document value; an empty `url` switches the matching pass off.
pub fn build_generation_context(
    base: &GenerationContext,
    config: &dyn ConfigPort,
) -> Result<GenerationContext, EaforgeError> {
    let mut ctx = base.clone();

    if let Some(name) = config.get_string("generator", "ea_name") {
        ctx.ea_name = name;
    }
    ctx.magic_number = config.get_int("generator", "magic_number", ctx.magic_number);
    if let Some(comment) = config.get_string("generator", "order_comment") {
        ctx.order_comment = comment;
    }
    ctx.slippage_points = config.get_int("generator", "slippage_points", ctx.slippage_points);

    let limits = &mut ctx.limits;
    limits.max_open_trades = config.get_int("limits", "max_open_trades", limits.max_open_trades);
    limits.max_buy_positions =
        config.get_int("limits", "max_buy_positions", limits.max_buy_positions);
    limits.max_sell_positions =
        config.get_int("limits", "max_sell_positions", limits.max_sell_positions);

    let risk = &mut ctx.risk;
    risk.max_daily_loss_percent =
        config.get_double("risk", "max_daily_loss_percent", risk.max_daily_loss_percent);
    risk.max_drawdown_percent =
        config.get_double("risk", "max_drawdown_percent", risk.max_drawdown_percent);

    if let Some(raw) = config.get_string("entry", "combinator") {
        ctx.entry.combinator =
            Combinator::parse(&raw).ok_or_else(|| EaforgeError::ConfigInvalid {
                section: "entry".into(),
                key: "combinator".into(),
                reason: format!("'{}' is not one of and, or", raw),
            })?;
    }
    ctx.entry.one_trade_per_bar =
        config.get_bool("entry", "one_trade_per_bar", ctx.entry.one_trade_per_bar);
    ctx.entry.one_trade_per_day =
        config.get_bool("entry", "one_trade_per_day", ctx.entry.one_trade_per_day);

    let multi_enabled = match config.get_string("multi_pair", "enabled") {
        Some(_) => config.get_bool("multi_pair", "enabled", false),
        None => ctx.multi_pair.is_some(),
    };
    ctx.multi_pair = if multi_enabled {
        let mut multi = ctx.multi_pair.take().unwrap_or_default();
        if let Some(symbols) = config.get_list("multi_pair", "symbols") {
            multi.symbols = symbols;
        }
        Some(multi)
    } else {
        None
    };

    let telemetry_url = config.get_string("telemetry", "url");
    if telemetry_url.is_some() || ctx.telemetry.is_some() {
        let mut telemetry = ctx.telemetry.take().unwrap_or_default();
        if let Some(url) = telemetry_url {
            telemetry.base_url = url;
        }
        if let Some(key) = config.get_string("telemetry", "api_key") {
            telemetry.api_key = key;
        }
        telemetry.heartbeat_seconds =
            config.get_int("telemetry", "heartbeat_seconds", telemetry.heartbeat_seconds);
        ctx.telemetry = Some(telemetry).filter(|t| !t.base_url.trim().is_empty());
    }

    let track_url = config.get_string("track_record", "url");
    if track_url.is_some() || ctx.track_record.is_some() {
        let mut track = ctx.track_record.take().unwrap_or_default();
        if let Some(url) = track_url {
            track.base_url = url;
        }
        if let Some(key) = config.get_string("track_record", "api_key") {
            track.api_key = key;
        }
        if let Some(id) = config.get_string("track_record", "instance_id") {
            track.instance_id = id;
        }
        track.snapshot_minutes =
            config.get_int("track_record", "snapshot_minutes", track.snapshot_minutes);
        ctx.track_record = Some(track).filter(|t| !t.base_url.trim().is_empty());
    }

    Ok(ctx)
}

/// Load the graph document and merge the optional INI overrides.
pub fn load_inputs(
    graph_path: &Path,
    config_path: Option<&Path>,
) -> Result<(GraphDocument, GenerationContext), EaforgeError> {
    let document = JsonGraphAdapter::new(graph_path.to_path_buf()).load_document()?;
    let ctx = match config_path {
        Some(path) => {
            let adapter = FileConfigAdapter::from_file(path)?;
            build_generation_context(&document.settings, &adapter)?
        }
        None => document.settings.clone(),
    };
    Ok((document, ctx))
}

fn compile_from(graph_path: &Path, config_path: Option<&Path>) -> Result<CompileOutput, EaforgeError> {
    let (document, ctx) = load_inputs(graph_path, config_path)?;
    let output = compile(&document, &ctx)?;
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(output)
}

fn run_compile(
    graph_path: &Path,
    config_path: Option<&Path>,
    output_path: Option<&Path>,
    inputs_csv: Option<&Path>,
) -> Result<(), EaforgeError> {
    let output = compile_from(graph_path, config_path)?;
    let writer = FileOutputAdapter;
    match output_path {
        Some(path) => {
            writer.write_source(&output.source, &path.to_string_lossy())?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", output.source),
    }
    if let Some(path) = inputs_csv {
        writer.write_inputs(&output.inputs, &path.to_string_lossy())?;
        eprintln!("Wrote {} inputs to {}", output.inputs.len(), path.display());
    }
    Ok(())
}

fn run_validate(graph_path: &Path, config_path: Option<&Path>) -> Result<(), EaforgeError> {
    let (document, ctx) = load_inputs(graph_path, config_path)?;
    let output = compile(&document, &ctx)?;
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }

    let mut counts: Vec<(NodeCategory, usize)> = Vec::new();
    for node in &document.nodes {
        let category = node.category();
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }
    let breakdown: Vec<String> = counts.iter().map(|(c, n)| format!("{} {}", n, c)).collect();

    println!("EA:       {}", ctx.ea_name.trim());
    println!(
        "Nodes:    {} ({})",
        document.nodes.len(),
        if breakdown.is_empty() { "none".to_string() } else { breakdown.join(", ") }
    );
    println!("Edges:    {}", document.edges.len());
    println!("Inputs:   {}", output.inputs.len());
    println!("Warnings: {}", output.warnings.len());
    let passes = output.program.passes();
    let enabled: Vec<&str> = [
        (passes.multi_pair, "multi-pair"),
        (passes.telemetry, "telemetry"),
        (passes.track_record, "track-record"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();
    if !enabled.is_empty() {
        println!("Passes:   {}", enabled.join(", "));
    }
    println!("OK");
    Ok(())
}

fn run_inputs(graph_path: &Path, config_path: Option<&Path>) -> Result<(), EaforgeError> {
    let output = compile_from(graph_path, config_path)?;
    println!(
        "{:<28} {:<20} {:<24} {:<16} {}",
        "NAME", "TYPE", "DEFAULT", "GROUP", "OPT"
    );
    for input in &output.inputs {
        println!(
            "{:<28} {:<20} {:<24} {:<16} {}",
            input.name,
            input.ty.mql(),
            input.default_value,
            input.group,
            if input.optimizable { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn run_verify_chain(events_path: &Path) -> Result<(), EaforgeError> {
    let events = JsonlEventLog::new(events_path.to_path_buf()).read_events()?;
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        println!("No events in {}", events_path.display());
        return Ok(());
    };
    verify_chain(&events)?;
    println!(
        "Chain OK: {} events, seqNo {}..{}, head {}",
        events.len(),
        first.seq_no,
        last.seq_no,
        last.event_hash
    );
    println!(
        "Span:     {} .. {}",
        format_timestamp(first.timestamp),
        format_timestamp(last.timestamp)
    );
    Ok(())
}

/// Terminal server time as `YYYY-MM-DD HH:MM:SS`; out-of-range values print raw.
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
