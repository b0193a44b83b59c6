//! Program assembly.
//!
//! Runs every node emitter in phase order, merges the fragments into the six
//! program regions, folds all management rules into one position loop and
//! hands the collected conditions to the entry-logic synthesizer.

use tracing::debug;

use crate::domain::context::GenerationContext;
use crate::domain::diagnostics::Diagnostics;
use crate::domain::emit::{
    EmitCx, Fragment, ManagementRule, Outcome, Plans, emit_node,
};
use crate::domain::entry_logic::{self, EntryInputs};
use crate::domain::error::EaforgeError;
use crate::domain::graph::node::NodeData;
use crate::domain::graph::StrategyGraph;
use crate::domain::program::{
    Decl, DeclaredInput, Helper, InputType, Line, NameRegistry, Program, Role, Stmt, fmt_f64,
    quote,
};

/// Identifiers the scaffolding and synthesizer use verbatim.
const RESERVED: [&str; 12] = [
    "trade",
    "pipFactor",
    "buySignal",
    "sellSignal",
    "entryAllowed",
    "signalBarTime",
    "breakoutBuffer",
    "placed",
    "ticket",
    "slPips",
    "tpPips",
    "equityNow",
];

const NORMALIZE_LOTS: &str = "double NormalizeLots(double lots)
{
   double minLot = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_MIN);
   double maxLot = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_MAX);
   double step = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_STEP);
   if(step > 0.0) lots = MathFloor(lots / step) * step;
   lots = MathMax(minLot, MathMin(maxLot, lots));
   return NormalizeDouble(lots, 2);
}";

const COUNT_POSITIONS: &str = "int CountPositions(int type)
{
   int count = 0;
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      if(PositionGetString(POSITION_SYMBOL) != $SYMBOL) continue;
      if(type >= 0 && PositionGetInteger(POSITION_TYPE) != type) continue;
      count++;
   }
   return count;
}";

const CLOSE_POSITIONS: &str = "void ClosePositions(int type)
{
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      if(PositionGetString(POSITION_SYMBOL) != $SYMBOL) continue;
      if(PositionGetInteger(POSITION_TYPE) != type) continue;
      if(!trade.PositionClose(ticket))
         Print(\"Close failed for \", ticket, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
   }
}";

const COUNT_PENDING_ORDERS: &str = "int CountPendingOrders()
{
   int count = 0;
   for(int i = OrdersTotal() - 1; i >= 0; i--)
   {
      ulong ticket = OrderGetTicket(i);
      if(ticket == 0) continue;
      if(OrderGetInteger(ORDER_MAGIC) != InpMagicNumber) continue;
      if(OrderGetString(ORDER_SYMBOL) != $SYMBOL) continue;
      count++;
   }
   return count;
}";

const DELETE_PENDING_ORDERS: &str = "void DeletePendingOrders()
{
   for(int i = OrdersTotal() - 1; i >= 0; i--)
   {
      ulong ticket = OrderGetTicket(i);
      if(ticket == 0) continue;
      if(OrderGetInteger(ORDER_MAGIC) != InpMagicNumber) continue;
      if(OrderGetString(ORDER_SYMBOL) != $SYMBOL) continue;
      if(!trade.OrderDelete(ticket))
         Print(\"Order delete failed for \", ticket, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
   }
}";

/// Node-processing order. Ties keep document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Signals,
    Filters,
    StopLoss,
    TakeProfit,
    Entries,
    Management,
    Grid,
    Exits,
}

impl Phase {
    const ORDER: [Phase; 8] = [
        Phase::Signals,
        Phase::Filters,
        Phase::StopLoss,
        Phase::TakeProfit,
        Phase::Entries,
        Phase::Management,
        Phase::Grid,
        Phase::Exits,
    ];

    fn of(data: &NodeData) -> Phase {
        match data {
            NodeData::MovingAverage(_)
            | NodeData::MaCrossover(_)
            | NodeData::Rsi(_)
            | NodeData::Macd(_)
            | NodeData::BollingerBands(_)
            | NodeData::Atr(_)
            | NodeData::Adx(_)
            | NodeData::Stochastic(_)
            | NodeData::Cci(_)
            | NodeData::RangeBreakout(_)
            | NodeData::CandlestickPattern(_) => Phase::Signals,
            NodeData::TradingSession(_) | NodeData::CustomTimes(_) | NodeData::MaxSpread(_) => {
                Phase::Filters
            }
            NodeData::StopLoss(_) => Phase::StopLoss,
            NodeData::TakeProfit(_) => Phase::TakeProfit,
            NodeData::PlaceBuy(_) | NodeData::PlaceSell(_) => Phase::Entries,
            NodeData::BreakevenStop(_)
            | NodeData::TrailingStop(_)
            | NodeData::PartialClose(_)
            | NodeData::LockProfit(_)
            | NodeData::MultiLevelTp(_) => Phase::Management,
            NodeData::GridPyramid(_) => Phase::Grid,
            NodeData::TimeExit(_) | NodeData::OppositeSignalExit => Phase::Exits,
        }
    }

    /// Tick code of later phases runs after the entry block.
    fn after_entry(self) -> bool {
        matches!(self, Phase::Management | Phase::Grid | Phase::Exits)
    }
}

#[derive(Default)]
struct Accumulator {
    inputs: Vec<DeclaredInput>,
    globals: Vec<Decl>,
    init: Vec<Stmt>,
    tick: Vec<Stmt>,
    late_tick: Vec<Stmt>,
    teardown: Vec<Stmt>,
    helpers: Vec<Helper>,
    buy: Vec<crate::domain::emit::Condition>,
    sell: Vec<crate::domain::emit::Condition>,
    gates: Vec<Line>,
    management: Vec<ManagementRule>,
    lookback: usize,
    runtime_warnings: Vec<String>,
}

impl Accumulator {
    fn absorb(&mut self, frag: Fragment, late: bool) {
        self.inputs.extend(frag.inputs);
        self.globals.extend(frag.globals);
        self.init.extend(frag.init);
        if late {
            self.late_tick.extend(frag.tick);
        } else {
            self.tick.extend(frag.tick);
        }
        self.teardown.extend(frag.teardown);
        self.helpers.extend(frag.helpers);
        self.buy.extend(frag.buy);
        self.sell.extend(frag.sell);
        self.gates.extend(frag.gates);
        self.management.extend(frag.management);
        self.lookback = self.lookback.max(frag.lookback);
        self.runtime_warnings.extend(frag.runtime_warnings);
    }
}

fn int_input(frag: &mut Fragment, names: &mut NameRegistry, name: &str, value: i64, comment: &str) -> String {
    frag.input(names, DeclaredInput::new(name, InputType::Int, value.to_string(), comment))
}

fn general_fragment(ctx: &GenerationContext, names: &mut NameRegistry) -> Fragment {
    let mut frag = Fragment::new("General");
    frag.input(
        names,
        DeclaredInput::new("InpMagicNumber", InputType::Long, ctx.magic_number.to_string(), "Magic number"),
    );
    frag.input(
        names,
        DeclaredInput::new("InpTradeComment", InputType::String, quote(&ctx.order_comment), "Order comment"),
    );
    int_input(&mut frag, names, "InpSlippagePoints", ctx.slippage_points, "Maximum slippage (points)");

    frag.globals.push(Decl::plain("CTrade trade;"));
    frag.globals.push(Decl::plain("double pipFactor = 1.0;"));
    frag.init_line(0, "trade.SetExpertMagicNumber(InpMagicNumber);");
    frag.init_line(0, "trade.SetDeviationInPoints(InpSlippagePoints);");
    frag.init_line(0, "pipFactor = ($DIGITS == 3 || $DIGITS == 5) ? 10.0 : 1.0;");
    frag
}

fn limits_fragment(ctx: &GenerationContext, names: &mut NameRegistry) -> Fragment {
    let mut frag = Fragment::new("Position Limits");
    let limits = &ctx.limits;
    int_input(&mut frag, names, "InpMaxOpenTrades", limits.max_open_trades, "Maximum open positions");
    int_input(&mut frag, names, "InpMaxBuyPositions", limits.max_buy_positions, "Maximum buy positions");
    int_input(&mut frag, names, "InpMaxSellPositions", limits.max_sell_positions, "Maximum sell positions");
    frag
}

/// Account guards. Each one only blocks new entries; open positions keep
/// being managed.
fn risk_fragment(ctx: &GenerationContext, names: &mut NameRegistry) -> Fragment {
    let mut frag = Fragment::new("Risk Management");
    let risk = &ctx.risk;
    if risk.daily_loss_enabled() {
        let limit = frag.input(
            names,
            DeclaredInput::new(
                "InpMaxDailyLossPercent",
                InputType::Double,
                fmt_f64(risk.max_daily_loss_percent),
                "Daily loss that pauses entries (% of balance)",
            ),
        );
        for decl in [
            "datetime riskDay = 0;",
            "double dayStartBalance = 0.0;",
            "bool dailyLossHit = false;",
        ] {
            frag.globals.push(Decl::plain(decl));
        }
        frag.tick_line(0, "if(TimeCurrent() - TimeCurrent() % 86400 != riskDay)");
        frag.tick_line(0, "{");
        frag.tick_line(1, "riskDay = TimeCurrent() - TimeCurrent() % 86400;");
        frag.tick_line(1, "dayStartBalance = AccountInfoDouble(ACCOUNT_BALANCE);");
        frag.tick_line(1, "dailyLossHit = false;");
        frag.tick_line(0, "}");
        frag.tick_line(
            0,
            &format!(
                "if(!dailyLossHit && AccountInfoDouble(ACCOUNT_EQUITY) <= dayStartBalance * (1.0 - {} / 100.0))",
                limit
            ),
        );
        frag.tick_line(0, "{");
        frag.tick_line(1, "dailyLossHit = true;");
        frag.tick_line(1, "Print(\"Daily loss limit reached; entries paused until tomorrow\");");
        frag.tick_line(0, "}");
        frag.gate("!dailyLossHit");
    }
    if risk.drawdown_enabled() {
        let limit = frag.input(
            names,
            DeclaredInput::new(
                "InpMaxDrawdownPercent",
                InputType::Double,
                fmt_f64(risk.max_drawdown_percent),
                "Drawdown from peak equity that stops entries (%)",
            ),
        );
        frag.globals.push(Decl::plain("double peakEquity = 0.0;"));
        frag.globals.push(Decl::plain("bool drawdownHit = false;"));
        frag.init_line(0, "peakEquity = AccountInfoDouble(ACCOUNT_EQUITY);");
        frag.tick_line(0, "double equityNow = AccountInfoDouble(ACCOUNT_EQUITY);");
        frag.tick_line(0, "if(equityNow > peakEquity) peakEquity = equityNow;");
        frag.tick_line(
            0,
            &format!(
                "if(!drawdownHit && peakEquity > 0.0 && (peakEquity - equityNow) / peakEquity * 100.0 >= {})",
                limit
            ),
        );
        frag.tick_line(0, "{");
        frag.tick_line(1, "drawdownHit = true;");
        frag.tick_line(1, "Print(\"Maximum drawdown reached; entries stopped\");");
        frag.tick_line(0, "}");
        frag.gate("!drawdownHit");
    }
    frag
}

/// One loop over open positions. Setup of every rule runs first, then each
/// rule's per-position statements in rule order.
fn management_loop(rules: &[ManagementRule]) -> Vec<Stmt> {
    let mut out = vec![Stmt::plain(0, "//--- Position management")];
    for rule in rules {
        out.extend(rule.setup.iter().cloned());
    }
    out.push(Stmt::with_role(
        0,
        "for(int i = PositionsTotal() - 1; i >= 0; i--)",
        Role::ManagementLoop,
    ));
    out.push(Stmt::plain(0, "{"));
    for line in [
        "ulong ticket = PositionGetTicket(i);",
        "if(ticket == 0) continue;",
        "if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;",
        "if(PositionGetString(POSITION_SYMBOL) != $SYMBOL) continue;",
    ] {
        out.push(Stmt::plain(1, line));
    }
    for rule in rules {
        out.extend(rule.per_position.iter().cloned().map(|s| s.indented(1)));
    }
    out.push(Stmt::plain(0, "}"));
    out
}

/// Assemble a single-symbol program from the graph.
pub fn assemble(
    graph: &StrategyGraph,
    ctx: &GenerationContext,
    diag: &mut Diagnostics,
) -> Result<Program, EaforgeError> {
    let mut names = NameRegistry::new();
    for name in RESERVED {
        names.reserve(name);
    }

    let mut acc = Accumulator::default();
    acc.absorb(general_fragment(ctx, &mut names), false);
    acc.absorb(limits_fragment(ctx, &mut names), false);
    acc.absorb(risk_fragment(ctx, &mut names), false);

    let mut plans = Plans::default();
    let mut entries = Vec::new();
    let mut opposite_exit = false;

    for phase in Phase::ORDER {
        for node in graph.nodes().iter().filter(|n| Phase::of(&n.data) == phase) {
            debug!(node = %node.id, kind = node.data.type_name(), ?phase, "emitting node");
            let emitted = {
                let mut cx = EmitCx {
                    graph,
                    ctx,
                    names: &mut names,
                    diag: &mut *diag,
                    plans: &plans,
                };
                emit_node(&mut cx, node)?
            };
            match emitted.outcome {
                Outcome::Plain => {}
                Outcome::StopLoss(plan) => plans.stop_loss = Some(plan),
                Outcome::TakeProfit(plan) => plans.take_profit = Some(plan),
                Outcome::Range(plan) => plans.ranges.push(plan),
                Outcome::OppositeExit => opposite_exit = true,
                Outcome::Entry(plan) => {
                    if entries.iter().any(|e: &crate::domain::emit::EntryPlan| e.side == plan.side) {
                        diag.warn(
                            Some(&node.id),
                            format!("additional {} entry node ignored", plan.side.label().to_lowercase()),
                        );
                        continue;
                    }
                    entries.push(plan);
                }
            }
            acc.absorb(emitted.fragment, phase.after_entry());
        }
    }

    let pending_breakout = plans.ranges.iter().any(|r| r.pending) && !entries.is_empty();
    let synthesized = entry_logic::synthesize(
        ctx,
        &mut names,
        diag,
        &EntryInputs {
            buy: &acc.buy,
            sell: &acc.sell,
            gates: &acc.gates,
            entries: &entries,
            plans: &plans,
            opposite_exit,
        },
    );
    acc.absorb(synthesized, false);

    let mut program = Program::new(&ctx.ea_name, names);
    program.set_risk_methods(
        plans.stop_loss.as_ref().map(|p| p.kind),
        plans.take_profit.as_ref().map(|p| p.kind),
    );
    program.set_max_lookback(acc.lookback);

    for input in acc.inputs {
        program.push_input(input);
    }
    for decl in acc.globals {
        program.push_global(decl);
    }
    for stmt in acc.init {
        program.push_init(stmt);
    }
    for message in &acc.runtime_warnings {
        program.push_init(Stmt {
            depth: 0,
            line: Line::text(format!("Print({});", quote(&format!("WARNING: {}", message)))),
            role: Role::Plain,
        });
    }

    if acc.lookback > 0 {
        program.push_tick(Stmt::plain(
            0,
            &format!("if(Bars($SYMBOL, PERIOD_CURRENT) < {}) $EXIT;", acc.lookback),
        ));
    }
    for stmt in acc.tick {
        program.push_tick(stmt);
    }
    if !acc.management.is_empty() {
        for stmt in management_loop(&acc.management) {
            program.push_tick(stmt);
        }
    }
    for stmt in acc.late_tick {
        program.push_tick(stmt);
    }
    for stmt in acc.teardown {
        program.push_teardown(stmt);
    }

    program.push_helper(Helper::new("NormalizeLots", NORMALIZE_LOTS));
    program.push_helper(Helper::new("CountPositions", COUNT_POSITIONS));
    if opposite_exit {
        program.push_helper(Helper::new("ClosePositions", CLOSE_POSITIONS));
    }
    if pending_breakout {
        program.push_helper(Helper::new("CountPendingOrders", COUNT_PENDING_ORDERS));
        program.push_helper(Helper::new("DeletePendingOrders", DELETE_PENDING_ORDERS));
    }
    for helper in acc.helpers {
        program.push_helper(helper);
    }
    Ok(program)
}
