//! Entry-logic synthesis.
//!
//! Reduces the buy and sell conditions of every node to two booleans, builds
//! the admission gate, and emits one order block per entry plan. Breakout
//! ranges in pending mode replace the order blocks with stop orders placed
//! at the range edges whenever a new range forms.
//!
//! Nothing here returns early from the tick: every block is a guarded `if`,
//! so management code placed after it always runs.

use crate::domain::context::GenerationContext;
use crate::domain::diagnostics::Diagnostics;
use crate::domain::emit::entry::PLACE_PENDING_AT;
use crate::domain::emit::{Condition, EntryPlan, Fragment, Plans, RangePlan, Side};
use crate::domain::graph::node::{OrderType, SignalMode};
use crate::domain::program::{
    Decl, DeclaredInput, InputType, Line, NameRegistry, Piece, Role, StopLossKind, Stmt,
    TakeProfitKind,
};

/// Everything the synthesizer reads from earlier phases.
pub struct EntryInputs<'a> {
    pub buy: &'a [Condition],
    pub sell: &'a [Condition],
    pub gates: &'a [Line],
    pub entries: &'a [EntryPlan],
    pub plans: &'a Plans,
    pub opposite_exit: bool,
}

struct Synth<'a> {
    frag: Fragment,
    names: &'a mut NameRegistry,
}

impl Synth<'_> {
    fn push(&mut self, depth: usize, line: Line) {
        self.frag.tick.push(Stmt {
            depth,
            line,
            role: Role::Plain,
        });
    }

    fn line(&mut self, depth: usize, template: &str) {
        self.frag.tick_line(depth, template);
    }

    fn state(&mut self, base: &str, ty: &str, init: &str) -> String {
        let name = self.names.allocate(base);
        self.frag.globals.push(Decl::state(ty, &name, init));
        name
    }
}

/// `prefix (a) op (b) ... suffix`, keeping every condition's pieces.
fn joined(prefix: &str, parts: &[&Line], op: &str, empty: &str, suffix: &str) -> Line {
    let mut pieces = vec![Piece::Text(prefix.to_string())];
    if parts.is_empty() {
        pieces.push(Piece::Text(empty.to_string()));
    }
    let wrap = parts.len() > 1;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            pieces.push(Piece::Text(format!(" {} ", op)));
        }
        if wrap {
            pieces.push(Piece::Text("(".into()));
        }
        pieces.extend(part.pieces().iter().cloned());
        if wrap {
            pieces.push(Piece::Text(")".into()));
        }
    }
    pieces.push(Piece::Text(suffix.to_string()));
    Line::from_pieces(pieces)
}

pub fn synthesize(
    ctx: &GenerationContext,
    names: &mut NameRegistry,
    diag: &mut Diagnostics,
    input: &EntryInputs<'_>,
) -> Fragment {
    let mut s = Synth {
        frag: Fragment::new("Entry Rules"),
        names,
    };

    let breakout = pending_range(diag, input.plans);
    if breakout.is_none() {
        match (input.buy.is_empty(), input.sell.is_empty()) {
            (true, false) => diag.warn(None, "no buy conditions; buy entries are disabled"),
            (false, true) => diag.warn(None, "no sell conditions; sell entries are disabled"),
            _ => {}
        }
    }

    // Signals
    let op = ctx.entry.combinator.operator();
    let buy: Vec<&Line> = input.buy.iter().map(|c| &c.expr).collect();
    let sell: Vec<&Line> = input.sell.iter().map(|c| &c.expr).collect();
    s.line(0, "//--- Entry signals");
    s.push(0, joined("bool buySignal = ", &buy, op, "false", ";"));
    s.push(0, joined("bool sellSignal = ", &sell, op, "false", ";"));

    let all: Vec<&Condition> = input.buy.iter().chain(input.sell).collect();
    if !all.is_empty() && all.iter().all(|c| c.mode == SignalMode::CandleClose) {
        let last = s.state("lastSignalBarTime", "datetime", "0");
        s.line(0, "datetime signalBarTime = iTime($SYMBOL, PERIOD_CURRENT, 0);");
        s.line(0, &format!("if(signalBarTime == ~{})", last));
        s.line(0, "{");
        s.line(1, "buySignal = false;");
        s.line(1, "sellSignal = false;");
        s.line(0, "}");
        s.line(0, &format!("~{} = signalBarTime;", last));
    }

    if input.opposite_exit {
        s.line(0, "if(sellSignal) ClosePositions(POSITION_TYPE_BUY);");
        s.line(0, "if(buySignal) ClosePositions(POSITION_TYPE_SELL);");
    }

    // Admission gate, also read by grid and pyramid adds
    let gates: Vec<&Line> = input.gates.iter().collect();
    s.line(0, "//--- Entry gate");
    s.push(0, joined("bool entryAllowed = ", &gates, "&&", "true", ";"));

    if input.entries.is_empty() {
        diag.warn(None, "no entry nodes; the program never opens positions");
        return s.frag;
    }

    let per_bar = s.frag.input(
        s.names,
        DeclaredInput::new(
            "InpOneTradePerBar",
            InputType::Bool,
            ctx.entry.one_trade_per_bar.to_string(),
            "Allow at most one entry per bar",
        ),
    );
    let per_day = s.frag.input(
        s.names,
        DeclaredInput::new(
            "InpOneTradePerDay",
            InputType::Bool,
            ctx.entry.one_trade_per_day.to_string(),
            "Allow at most one entry per day",
        ),
    );
    let last_bar = s.state("lastEntryBarTime", "datetime", "0");
    let last_day = s.state("lastEntryDay", "datetime", "0");
    s.line(
        0,
        &format!("if({} && iTime($SYMBOL, PERIOD_CURRENT, 0) == ~{}) entryAllowed = false;", per_bar, last_bar),
    );
    s.line(
        0,
        &format!("if({} && iTime($SYMBOL, PERIOD_D1, 0) == ~{}) entryAllowed = false;", per_day, last_day),
    );

    let on_entry = [
        format!("~{} = iTime($SYMBOL, PERIOD_CURRENT, 0);", last_bar),
        format!("~{} = iTime($SYMBOL, PERIOD_D1, 0);", last_day),
        format!("if({} || {}) entryAllowed = false;", per_bar, per_day),
    ];

    match breakout {
        Some(range) => {
            let conditioned = (!input.buy.is_empty(), !input.sell.is_empty());
            breakout_orders(&mut s, input, range, conditioned, &on_entry);
        }
        None => {
            for plan in input.entries {
                order_block(&mut s, input.plans, plan, &on_entry);
            }
        }
    }
    s.frag
}

fn pending_range<'p>(diag: &mut Diagnostics, plans: &'p Plans) -> Option<&'p RangePlan> {
    let mut pending = plans.ranges.iter().filter(|r| r.pending);
    let first = pending.next()?;
    for extra in pending {
        diag.warn(
            Some(&extra.node_id),
            "only the first pending range breakout places orders",
        );
    }
    Some(first)
}

fn risk_args(plans: &Plans, side: Side) -> (String, String) {
    let sl = plans
        .stop_loss
        .as_ref()
        .map_or("0.0", |p| p.distance(side))
        .to_string();
    let tp = plans
        .take_profit
        .as_ref()
        .filter(|p| p.enabled)
        .map_or("0.0", |p| p.distance(side))
        .to_string();
    (sl, tp)
}

fn order_block(s: &mut Synth<'_>, plans: &Plans, plan: &EntryPlan, on_entry: &[String]) {
    let (signal, position, limit) = match plan.side {
        Side::Buy => ("buySignal", "POSITION_TYPE_BUY", "InpMaxBuyPositions"),
        Side::Sell => ("sellSignal", "POSITION_TYPE_SELL", "InpMaxSellPositions"),
    };
    let (sl, tp) = risk_args(plans, plan.side);
    s.line(0, &format!("//--- {} entry", plan.side.label()));
    s.line(
        0,
        &format!(
            "if(entryAllowed && {} && CountPositions({}) < {} && CountPositions(-1) < InpMaxOpenTrades)",
            signal, position, limit
        ),
    );
    s.line(0, "{");
    let call = match (plan.order_type, &plan.offset_input, &plan.expiry_input) {
        (OrderType::Stop | OrderType::Limit, Some(offset), Some(expiry)) => {
            let (ty, price) = match (plan.side, plan.order_type) {
                (Side::Buy, OrderType::Stop) => ("ORDER_TYPE_BUY_STOP", "SymbolInfoDouble($SYMBOL, SYMBOL_ASK) + "),
                (Side::Buy, _) => ("ORDER_TYPE_BUY_LIMIT", "SymbolInfoDouble($SYMBOL, SYMBOL_ASK) - "),
                (Side::Sell, OrderType::Stop) => ("ORDER_TYPE_SELL_STOP", "SymbolInfoDouble($SYMBOL, SYMBOL_BID) - "),
                (Side::Sell, _) => ("ORDER_TYPE_SELL_LIMIT", "SymbolInfoDouble($SYMBOL, SYMBOL_BID) + "),
            };
            format!(
                "if(PlaceOrRefreshPending({}, {}{} * $PIP * $POINT, {}, {}, {}, {}))",
                ty, price, offset, plan.lots, sl, tp, expiry
            )
        }
        _ => {
            let ty = match plan.side {
                Side::Buy => "ORDER_TYPE_BUY",
                Side::Sell => "ORDER_TYPE_SELL",
            };
            format!("if(OpenPosition({}, {}, {}, {}))", ty, plan.lots, sl, tp)
        }
    };
    s.line(1, &call);
    s.line(1, "{");
    for stmt in on_entry {
        s.line(2, stmt);
    }
    s.line(1, "}");
    s.line(0, "}");
}

/// Stop orders at the range edges, placed once per new range and cancelled
/// as soon as either side fills.
fn breakout_orders(
    s: &mut Synth<'_>,
    input: &EntryInputs<'_>,
    range: &RangePlan,
    conditioned: (bool, bool),
    on_entry: &[String],
) {
    let plans = input.plans;
    s.frag.helper("PlacePendingAt", PLACE_PENDING_AT);
    s.line(0, "//--- Range breakout orders");
    s.line(
        0,
        &format!(
            "if({} && entryAllowed && CountPositions(-1) < InpMaxOpenTrades)",
            range.is_new()
        ),
    );
    s.line(0, "{");
    s.line(1, "DeletePendingOrders();");
    s.line(1, &format!("double breakoutBuffer = {} * $PIP * $POINT;", range.buffer_input));
    s.line(1, "bool placed = false;");

    let mut seen = Vec::new();
    for plan in input.entries {
        if seen.contains(&plan.side) {
            continue;
        }
        seen.push(plan.side);
        let side = plan.side;
        let (label, ty, edge, dir, opposite, guard) = match side {
            Side::Buy => ("buy", "ORDER_TYPE_BUY_STOP", range.high(), "+", range.low(), conditioned.0.then_some("buySignal")),
            Side::Sell => ("sell", "ORDER_TYPE_SELL_STOP", range.low(), "-", range.high(), conditioned.1.then_some("sellSignal")),
        };
        let back = if dir == "+" { "-" } else { "+" };
        let price = format!("{}StopPrice", label);
        let sl = format!("{}StopSl", label);
        let tp = format!("{}StopTp", label);
        let depth = match guard {
            Some(signal) => {
                s.line(1, &format!("if({})", signal));
                s.line(1, "{");
                2
            }
            None => 1,
        };
        s.line(depth, &format!("double {} = NormalizeDouble({} {} breakoutBuffer, $DIGITS);", price, edge, dir));

        let sl_expr = match &plans.stop_loss {
            Some(p) if p.kind == StopLossKind::RangeOpposite => {
                let margin = p
                    .buffer_input
                    .as_ref()
                    .map(|b| format!(" {} {} * $PIP * $POINT", back, b))
                    .unwrap_or_default();
                format!("NormalizeDouble({}{}, $DIGITS)", opposite, margin)
            }
            Some(p) => format!(
                "NormalizeDouble({} {} {} * $POINT, $DIGITS)",
                price,
                back,
                p.distance(side)
            ),
            None => "0.0".to_string(),
        };
        s.line(depth, &format!("double {} = {};", sl, sl_expr));

        let tp_expr = match plans.take_profit.as_ref().filter(|p| p.enabled) {
            Some(p) if p.kind == TakeProfitKind::RiskReward => match &p.ratio_input {
                Some(ratio) => format!(
                    "{sl} > 0.0 ? NormalizeDouble({price} {dir} MathAbs({price} - {sl}) * {ratio}, $DIGITS) : 0.0"
                ),
                None => "0.0".to_string(),
            },
            Some(p) => format!(
                "NormalizeDouble({} {} {} * $POINT, $DIGITS)",
                price,
                dir,
                p.distance(side)
            ),
            None => "0.0".to_string(),
        };
        s.line(depth, &format!("double {} = {};", tp, tp_expr));
        let expiry = plan.expiry_input.as_deref().unwrap_or("0");
        s.line(
            depth,
            &format!(
                "if(PlacePendingAt({}, {}, {}, {}, {}, {})) placed = true;",
                ty, price, plan.lots, sl, tp, expiry
            ),
        );
        if depth == 2 {
            s.line(1, "}");
        }
    }

    s.line(1, "if(placed)");
    s.line(1, "{");
    for stmt in on_entry {
        s.line(2, stmt);
    }
    s.line(1, "}");
    s.line(0, "}");
    s.line(0, "if(CountPositions(-1) > 0 && CountPendingOrders() > 0) DeletePendingOrders();");
}
