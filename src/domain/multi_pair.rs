//! Single-symbol to multi-symbol rewrite.
//!
//! Handles and per-symbol state become arrays indexed by the symbol loop
//! variable `s`. Handle creation moves into a per-symbol loop in init, the
//! tick body runs once per symbol, and shared helpers read the symbol they
//! act on from a small context that the tick loop sets before any call.
//!
//! The pass matches statement roles and line pieces only. A tick-level
//! `$EXIT` becomes `continue`, so tick code must not place `$EXIT` inside a
//! nested loop of its own.

use tracing::info;

use crate::domain::error::EaforgeError;
use crate::domain::program::{
    Decl, DeclaredInput, Helper, InputType, Line, Piece, Program, ProgramParts, Role, Stmt,
    quote, validation_line,
};

const PASS: &str = "multi-pair";

const SET_SYMBOL_CONTEXT: &str = "void SetSymbolContext(string symbol, double point, int digits, double pipFactorValue)
{
   ctxSymbol = symbol;
   ctxPoint = point;
   ctxDigits = digits;
   ctxPipFactor = pipFactorValue;
}";

/// Identifiers introduced by this pass.
const INTRODUCED: [&str; 12] = [
    "symbols",
    "symbolCount",
    "requested",
    "requestedCount",
    "sym",
    "symPoint",
    "symDigits",
    "symPipFactor",
    "ctxSymbol",
    "ctxPoint",
    "ctxDigits",
    "ctxPipFactor",
];

fn text(s: impl Into<String>) -> Piece {
    Piece::Text(s.into())
}

/// Tick code: everything resolves against the loop's symbol.
fn in_symbol_loop(piece: &Piece) -> Piece {
    match piece {
        Piece::Text(t) => text(t.clone()),
        Piece::Symbol => text("sym"),
        Piece::Point => text("symPoint"),
        Piece::Digits => text("symDigits"),
        Piece::PipFactor => text("symPipFactor"),
        Piece::Handle(name) | Piece::State(name) => text(format!("{}[s]", name)),
        Piece::Exit => text("continue"),
    }
}

/// Init code inside the creation loop.
fn in_creation_loop(piece: &Piece) -> Piece {
    match piece {
        Piece::Text(t) => text(t.clone()),
        Piece::Symbol => text("symbols[s]"),
        Piece::Point => text("SymbolInfoDouble(symbols[s], SYMBOL_POINT)"),
        Piece::Digits => text("(int)SymbolInfoInteger(symbols[s], SYMBOL_DIGITS)"),
        Piece::PipFactor => text("pipFactor"),
        Piece::Handle(name) | Piece::State(name) => text(format!("{}[s]", name)),
        Piece::Exit => text("return"),
    }
}

/// Helpers: symbol scope comes from the context set by the tick loop.
fn in_helper(piece: &Piece) -> Piece {
    match piece {
        Piece::Text(t) => text(t.clone()),
        Piece::Symbol => text("ctxSymbol"),
        Piece::Point => text("ctxPoint"),
        Piece::Digits => text("ctxDigits"),
        Piece::PipFactor => text("ctxPipFactor"),
        Piece::Handle(name) | Piece::State(name) => text(name.clone()),
        Piece::Exit => text("return"),
    }
}

fn stmt(depth: usize, line: &str) -> Stmt {
    Stmt::plain(depth, line)
}

struct Arrays {
    handles: Vec<String>,
    /// `(name, init)` of every per-symbol state slot.
    states: Vec<(String, String)>,
}

impl Arrays {
    fn all(&self) -> impl Iterator<Item = &str> {
        self.handles
            .iter()
            .map(String::as_str)
            .chain(self.states.iter().map(|(n, _)| n.as_str()))
    }
}

fn rewrite_globals(parts: &mut ProgramParts) -> Arrays {
    let mut arrays = Arrays {
        handles: Vec::new(),
        states: Vec::new(),
    };
    let globals = std::mem::take(&mut parts.globals);
    parts.globals.push(Decl::plain("string symbols[];"));
    parts.globals.push(Decl::plain("int symbolCount = 0;"));
    parts.globals.push(Decl::plain("string ctxSymbol = \"\";"));
    parts.globals.push(Decl::plain("double ctxPoint = 0.0;"));
    parts.globals.push(Decl::plain("int ctxDigits = 0;"));
    parts.globals.push(Decl::plain("double ctxPipFactor = 1.0;"));
    for decl in globals {
        let decl = match decl {
            Decl::Handle(name) => {
                arrays.handles.push(name.clone());
                Decl::HandleArray(name)
            }
            Decl::SymbolState { ty, name, init } => {
                arrays.states.push((name.clone(), init.clone()));
                Decl::SymbolStateArray { ty, name, init }
            }
            other => other,
        };
        parts.globals.push(decl);
    }
    arrays
}

fn symbol_setup(symbols_input: &str, arrays: &Arrays) -> Vec<Stmt> {
    let mut out = vec![
        stmt(0, "string requested[];"),
        stmt(0, &format!("int requestedCount = StringSplit({}, ',', requested);", symbols_input)),
        stmt(0, "ArrayResize(symbols, 0);"),
        stmt(0, "symbolCount = 0;"),
        stmt(0, "for(int k = 0; k < requestedCount; k++)"),
        stmt(0, "{"),
        stmt(1, "string name = requested[k];"),
        stmt(1, "StringTrimLeft(name);"),
        stmt(1, "StringTrimRight(name);"),
        stmt(1, "if(name == \"\" || !SymbolSelect(name, true))"),
        stmt(1, "{"),
        stmt(2, "Print(\"Skipping unavailable symbol \", name);"),
        stmt(2, "continue;"),
        stmt(1, "}"),
        stmt(1, "ArrayResize(symbols, symbolCount + 1);"),
        stmt(1, "symbols[symbolCount] = name;"),
        stmt(1, "symbolCount++;"),
        stmt(0, "}"),
        stmt(0, "if(symbolCount == 0) { Print(\"No tradable symbols configured\"); return(INIT_FAILED); }"),
    ];
    for handle in &arrays.handles {
        out.push(stmt(0, &format!("ArrayResize({}, symbolCount);", handle)));
        out.push(stmt(0, &format!("ArrayInitialize({}, INVALID_HANDLE);", handle)));
    }
    for (state, init) in &arrays.states {
        out.push(stmt(0, &format!("ArrayResize({}, symbolCount);", state)));
        out.push(stmt(0, &format!("ArrayInitialize({}, {});", state, init)));
    }
    out
}

/// Drop symbols that cannot be traded, shifting the symbol list and every
/// per-symbol array down together.
fn tradability_sweep(arrays: &Arrays) -> Vec<Stmt> {
    let mut out = vec![
        stmt(0, "for(int s = symbolCount - 1; s >= 0; s--)"),
        stmt(0, "{"),
        stmt(1, "if(SymbolInfoInteger(symbols[s], SYMBOL_TRADE_MODE) != SYMBOL_TRADE_MODE_DISABLED) continue;"),
        stmt(1, "Print(\"Dropping symbol \", symbols[s], \": trading disabled\");"),
    ];
    for handle in &arrays.handles {
        out.push(stmt(
            1,
            &format!("if({h}[s] != INVALID_HANDLE) IndicatorRelease({h}[s]);", h = handle),
        ));
    }
    out.push(stmt(1, "for(int k = s; k < symbolCount - 1; k++)"));
    out.push(stmt(1, "{"));
    out.push(stmt(2, "symbols[k] = symbols[k + 1];"));
    for name in arrays.all() {
        out.push(stmt(2, &format!("{n}[k] = {n}[k + 1];", n = name)));
    }
    out.push(stmt(1, "}"));
    out.push(stmt(1, "symbolCount--;"));
    out.push(stmt(0, "}"));
    out.push(stmt(0, "ArrayResize(symbols, symbolCount);"));
    for name in arrays.all() {
        out.push(stmt(0, &format!("ArrayResize({}, symbolCount);", name)));
    }
    out.push(stmt(
        0,
        "if(symbolCount == 0) { Print(\"No tradable symbols left\"); return(INIT_FAILED); }",
    ));
    out
}

fn rewrite_init(init: Vec<Stmt>, setup: Vec<Stmt>, arrays: &Arrays) -> Vec<Stmt> {
    let mut out = setup;
    let mut created = Vec::new();
    let mut loop_at = None;
    for st in init {
        match &st.role {
            Role::CreateHandle(_) => {
                loop_at.get_or_insert(out.len());
                created.push(Stmt {
                    depth: st.depth + 1,
                    line: st.line.map(in_creation_loop),
                    role: st.role.clone(),
                });
            }
            Role::ValidateHandle { handle, message } => {
                created.push(Stmt {
                    depth: st.depth + 1,
                    line: validation_line(handle, message, true).map(in_creation_loop),
                    role: st.role.clone(),
                });
            }
            _ => out.push(st),
        }
    }

    let at = loop_at.unwrap_or(out.len());
    let mut block = Vec::new();
    if !created.is_empty() {
        block.push(stmt(0, "for(int s = 0; s < symbolCount; s++)"));
        block.push(stmt(0, "{"));
        block.extend(created);
        block.push(stmt(0, "}"));
    }
    block.extend(tradability_sweep(arrays));
    out.splice(at..at, block);
    out
}

fn rewrite_tick(tick: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = vec![
        stmt(0, "for(int s = 0; s < symbolCount; s++)"),
        stmt(0, "{"),
        stmt(1, "string sym = symbols[s];"),
        stmt(1, "double symPoint = SymbolInfoDouble(sym, SYMBOL_POINT);"),
        stmt(1, "int symDigits = (int)SymbolInfoInteger(sym, SYMBOL_DIGITS);"),
        stmt(1, "double symPipFactor = (symDigits == 3 || symDigits == 5) ? 10.0 : 1.0;"),
        stmt(1, "SetSymbolContext(sym, symPoint, symDigits, symPipFactor);"),
    ];
    out.extend(tick.into_iter().map(|s| Stmt {
        depth: s.depth + 1,
        line: s.line.map(in_symbol_loop),
        role: s.role,
    }));
    out.push(stmt(0, "}"));
    out
}

fn rewrite_teardown(teardown: Vec<Stmt>) -> Vec<Stmt> {
    let (releases, rest): (Vec<Stmt>, Vec<Stmt>) = teardown
        .into_iter()
        .partition(|s| matches!(s.role, Role::ReleaseHandle(_)));
    let mut out = Vec::new();
    if !releases.is_empty() {
        out.push(stmt(0, "for(int s = 0; s < symbolCount; s++)"));
        out.push(stmt(0, "{"));
        out.extend(releases.into_iter().map(|s| Stmt {
            depth: s.depth + 1,
            line: s.line.map(in_symbol_loop),
            role: s.role,
        }));
        out.push(stmt(0, "}"));
    }
    out.extend(rest);
    out
}

/// Rewrite a single-symbol program to trade every symbol in `symbols`.
pub fn apply(program: Program, symbols: &[String]) -> Result<Program, EaforgeError> {
    if program.passes().multi_pair {
        return Err(EaforgeError::TransformReapplied { pass: PASS });
    }
    if symbols.is_empty() {
        return Err(EaforgeError::InvalidSettings {
            reason: "multi-pair mode needs at least one symbol".to_string(),
        });
    }

    let mut parts = program.into_parts();
    for name in INTRODUCED {
        parts.names.reserve(name);
    }
    let input_name = parts.names.allocate("InpSymbols");
    parts.inputs.push(
        DeclaredInput::new(
            &input_name,
            InputType::String,
            quote(&symbols.join(",")),
            "Comma separated symbols to trade",
        )
        .in_group("Multi-Pair"),
    );

    let arrays = rewrite_globals(&mut parts);
    let setup = symbol_setup(&input_name, &arrays);
    parts.init = rewrite_init(std::mem::take(&mut parts.init), setup, &arrays);
    parts.tick = rewrite_tick(std::mem::take(&mut parts.tick));
    parts.teardown = rewrite_teardown(std::mem::take(&mut parts.teardown));
    for helper in &mut parts.helpers {
        helper.lines = helper.lines.iter().map(|l| l.map(in_helper)).collect();
    }
    parts.helpers.push(Helper::new("SetSymbolContext", SET_SYMBOL_CONTEXT));
    parts.passes.multi_pair = true;

    info!(
        symbols = symbols.len(),
        handles = arrays.handles.len(),
        states = arrays.states.len(),
        "multi-pair rewrite applied"
    );
    let program = Program::from_parts(parts);
    check_totality(&program)?;
    Ok(program)
}

/// No scalar handle may survive in globals and no tick line may still
/// refer to the chart symbol.
pub fn check_totality(program: &Program) -> Result<(), EaforgeError> {
    if let Some(Decl::Handle(name)) = program.globals().iter().find(|d| matches!(d, Decl::Handle(_))) {
        return Err(EaforgeError::TransformIncomplete {
            reason: format!("handle {} is still scalar", name),
        });
    }
    if let Some(stmt) = program.tick().iter().find(|s| s.line.has_symbol_scope()) {
        return Err(EaforgeError::TransformIncomplete {
            reason: format!("tick statement still bound to one symbol: {}", stmt.line.render()),
        });
    }
    if let Some(helper) = program
        .helpers()
        .iter()
        .find(|h| h.lines.iter().any(Line::has_symbol_scope))
    {
        return Err(EaforgeError::TransformIncomplete {
            reason: format!("helper {} still bound to one symbol", helper.name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assembler::assemble;
    use crate::domain::context::GenerationContext;
    use crate::domain::diagnostics::Diagnostics;
    use crate::domain::graph::node::*;
    use crate::domain::graph::{Node, StrategyGraph};

    fn single(nodes: Vec<Node>) -> Program {
        let mut diag = Diagnostics::new();
        let graph = StrategyGraph::new(nodes, vec![], &mut diag).unwrap();
        assemble(&graph, &GenerationContext::default(), &mut diag).unwrap()
    }

    fn rsi_program() -> Program {
        single(vec![
            Node::new("rsi", NodeData::Rsi(RsiData::default())),
            Node::new("buy", NodeData::PlaceBuy(EntryData::default())),
            Node::new("sell", NodeData::PlaceSell(EntryData::default())),
            Node::new("be", NodeData::BreakevenStop(BreakevenData::default())),
        ])
    }

    fn pair() -> Vec<String> {
        vec!["EURUSD".to_string(), "GBPUSD".to_string()]
    }

    #[test]
    fn rsi_handle_becomes_one_array() {
        let program = apply(rsi_program(), &pair()).unwrap();
        let arrays: Vec<_> = program
            .globals()
            .iter()
            .filter(|d| matches!(d, Decl::HandleArray(_)))
            .collect();
        assert_eq!(arrays, vec![&Decl::HandleArray("ind0Handle".into())]);
        assert!(!program.globals().iter().any(|d| matches!(d, Decl::Handle(_))));

        let input = program.inputs().iter().find(|i| i.name == "InpSymbols").unwrap();
        assert_eq!(input.default_value, "\"EURUSD,GBPUSD\"");
    }

    #[test]
    fn creation_and_validation_move_into_symbol_loop() {
        let program = apply(rsi_program(), &pair()).unwrap();
        let init: Vec<String> = program.init().iter().map(|s| s.line.render()).collect();
        let header = init
            .iter()
            .position(|l| l == "for(int s = 0; s < symbolCount; s++)")
            .unwrap();
        let create = program
            .init()
            .iter()
            .position(|s| matches!(s.role, Role::CreateHandle(_)))
            .unwrap();
        assert!(create > header);
        assert!(init[create].starts_with("ind0Handle[s] = iRSI(symbols[s], "));
        assert_eq!(program.init()[create].depth, 1);
        assert!(matches!(program.init()[create + 1].role, Role::ValidateHandle { .. }));
        assert!(init[create + 1].contains("\" for \", symbols[s]"));
        // series setup stays outside the loop
        let series = program
            .init()
            .iter()
            .find(|s| s.role == Role::SeriesSetup)
            .unwrap();
        assert_eq!(series.depth, 0);
    }

    #[test]
    fn tick_is_fully_symbol_indexed() {
        let program = apply(rsi_program(), &pair()).unwrap();
        assert!(program.tick().iter().all(|s| !s.line.has_symbol_scope()));
        let tick: Vec<String> = program.tick().iter().map(|s| s.line.render()).collect();
        assert_eq!(tick[0], "for(int s = 0; s < symbolCount; s++)");
        assert!(tick.iter().any(|l| l.contains("CopyBuffer(ind0Handle[s], 0, 0, 3, ind0Buffer) < 3) continue;")));
        assert!(tick.iter().any(|l| l.contains("PositionGetString(POSITION_SYMBOL) != sym")));
        assert!(!tick.iter().any(|l| l.contains("return")));
    }

    #[test]
    fn helpers_read_symbol_context() {
        let program = apply(rsi_program(), &pair()).unwrap();
        let breakeven = program.helper("ApplyBreakeven").unwrap();
        let body: Vec<String> = breakeven.lines.iter().map(Line::render).collect();
        assert!(body.iter().any(|l| l.contains("SymbolInfoDouble(ctxSymbol, SYMBOL_BID)")));
        assert!(body.iter().any(|l| l.contains("ctxPipFactor * ctxPoint")));
        assert!(program.helper("SetSymbolContext").is_some());
    }

    #[test]
    fn releases_run_per_symbol() {
        let program = apply(rsi_program(), &pair()).unwrap();
        let teardown: Vec<String> = program.teardown().iter().map(|s| s.line.render()).collect();
        assert_eq!(teardown[0], "for(int s = 0; s < symbolCount; s++)");
        assert!(teardown.contains(&"if(ind0Handle[s] != INVALID_HANDLE) IndicatorRelease(ind0Handle[s]);".to_string()));
    }

    #[test]
    fn sweep_compacts_all_arrays() {
        let program = apply(rsi_program(), &pair()).unwrap();
        let init: Vec<String> = program.init().iter().map(|s| s.line.render()).collect();
        assert!(init.contains(&"ind0Handle[k] = ind0Handle[k + 1];".to_string()));
        assert!(init.contains(&"lastEntryBarTime[k] = lastEntryBarTime[k + 1];".to_string()));
        assert!(init.contains(&"symbols[k] = symbols[k + 1];".to_string()));
    }

    #[test]
    fn state_slots_become_arrays() {
        let program = apply(rsi_program(), &pair()).unwrap();
        assert!(program.globals().iter().any(|d| matches!(
            d,
            Decl::SymbolStateArray { name, .. } if name == "lastSignalBarTime"
        )));
        let src = program.render();
        assert!(src.contains("datetime lastSignalBarTime[];"));
        assert!(src.contains("if(signalBarTime == lastSignalBarTime[s])"));
    }

    #[test]
    fn second_application_is_rejected() {
        let once = apply(rsi_program(), &pair()).unwrap();
        let err = apply(once, &pair()).err().unwrap();
        assert!(matches!(err, EaforgeError::TransformReapplied { pass: "multi-pair" }));
    }

    #[test]
    fn empty_symbol_list_is_invalid() {
        let err = apply(rsi_program(), &[]).err().unwrap();
        assert!(matches!(err, EaforgeError::InvalidSettings { .. }));
    }

    #[test]
    fn totality_flags_scalar_handles() {
        let program = rsi_program();
        let err = check_totality(&program).err().unwrap();
        assert!(matches!(err, EaforgeError::TransformIncomplete { .. }));
    }
}
