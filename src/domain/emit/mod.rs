//! Per-node code emission.
//!
//! Each node type has one emitter. An emitter returns a [`Fragment`]: the
//! inputs, globals, statements and helpers it contributes, plus buy/sell
//! condition expressions and admission gates for the entry synthesizer.
//! Emitters never touch the program directly; the assembler merges
//! fragments in phase order.

pub mod entry;
pub mod grid;
pub mod indicator;
pub mod management;
pub mod price_action;
pub mod risk;
pub mod timing;

use crate::domain::context::GenerationContext;
use crate::domain::diagnostics::Diagnostics;
use crate::domain::error::EaforgeError;
use crate::domain::graph::node::{NodeData, OrderType, SignalMode};
use crate::domain::graph::{Node, StrategyGraph};
use crate::domain::program::{
    Decl, DeclaredInput, Helper, InputType, Line, NameRegistry, StopLossKind, Stmt,
    TakeProfitKind,
};

/// A buy or sell condition contributed by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub node_id: String,
    pub expr: Line,
    pub mode: SignalMode,
}

/// Work done once per tick inside the shared position loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementRule {
    /// Statements run once before the loop.
    pub setup: Vec<Stmt>,
    /// Statements run for each selected position; `ticket` is in scope.
    pub per_position: Vec<Stmt>,
}

#[derive(Debug, Default)]
pub struct Fragment {
    group: String,
    pub inputs: Vec<DeclaredInput>,
    pub globals: Vec<Decl>,
    pub init: Vec<Stmt>,
    pub tick: Vec<Stmt>,
    pub teardown: Vec<Stmt>,
    pub helpers: Vec<Helper>,
    pub buy: Vec<Condition>,
    pub sell: Vec<Condition>,
    pub gates: Vec<Line>,
    pub management: Vec<ManagementRule>,
    pub lookback: usize,
    /// Printed once from `OnInit` so the problem is visible in the terminal.
    pub runtime_warnings: Vec<String>,
}

impl Fragment {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            ..Default::default()
        }
    }

    /// Register an input under a unique name and return that name.
    pub fn input(&mut self, names: &mut NameRegistry, input: DeclaredInput) -> String {
        let name = names.allocate(&input.name);
        let group = self.group.clone();
        self.inputs.push(DeclaredInput { name: name.clone(), ..input }.in_group(&group));
        name
    }

    pub fn tick_line(&mut self, depth: usize, template: &str) {
        self.tick.push(Stmt::plain(depth, template));
    }

    pub fn init_line(&mut self, depth: usize, template: &str) {
        self.init.push(Stmt::plain(depth, template));
    }

    pub fn helper(&mut self, name: &str, body: &str) {
        self.helpers.push(Helper::new(name, body));
    }

    /// Declare an indicator handle with creation, validation and release.
    pub fn handle(&mut self, handle: &str, create: &str, failure: &str) {
        self.globals.push(Decl::Handle(handle.to_string()));
        self.init.push(Stmt::create_handle(handle, create));
        self.init.push(Stmt::validate_handle(handle, failure));
        self.teardown.push(Stmt::release_handle(handle));
    }

    /// Declare a series buffer read with `CopyBuffer`.
    pub fn buffer(&mut self, name: &str) {
        self.globals.push(Decl::plain(format!("double {}[];", name)));
        self.init.push(Stmt::series_setup(&format!("ArraySetAsSeries({}, true);", name)));
    }

    /// Copy `count` values of buffer `index` of `handle`; skips the tick on
    /// a short read.
    pub fn copy_buffer(&mut self, handle: &str, index: usize, count: usize, buffer: &str) {
        self.tick_line(
            0,
            &format!(
                "if(CopyBuffer(@{}, {}, 0, {}, {}) < {}) $EXIT;",
                handle, index, count, buffer, count
            ),
        );
    }

    pub fn buy_when(&mut self, node: &Node, expr: &str, mode: SignalMode) {
        self.buy.push(Condition {
            node_id: node.id.clone(),
            expr: Line::parse(expr),
            mode,
        });
    }

    pub fn sell_when(&mut self, node: &Node, expr: &str, mode: SignalMode) {
        self.sell.push(Condition {
            node_id: node.id.clone(),
            expr: Line::parse(expr),
            mode,
        });
    }

    pub fn gate(&mut self, expr: &str) {
        self.gates.push(Line::parse(expr));
    }

    pub fn needs_bars(&mut self, bars: usize) {
        self.lookback = self.lookback.max(bars);
    }
}

/// Build an input whose `input`/`sinput` keyword follows the node's
/// optimizable field list.
pub fn node_input(
    node: &Node,
    field: &str,
    base: &str,
    ty: InputType,
    default: impl Into<String>,
    comment: &str,
) -> DeclaredInput {
    DeclaredInput::new(base, ty, default, comment).optimizable(node.is_optimizable(field))
}

/// Raise `value` to `min`, warning when it had to be changed.
pub fn clamp_period(diag: &mut Diagnostics, node: &Node, field: &str, value: i32, min: i32) -> i32 {
    if value < min {
        diag.warn(
            Some(&node.id),
            format!("{} {} is below the minimum of {}; using {}", field, value, min, min),
        );
        min
    } else {
        value
    }
}

/// Stop-loss outcome used by take-profit, entries and breakout orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopLossPlan {
    pub node_id: String,
    pub kind: StopLossKind,
    /// Distances differ for buys and sells (`slBuyPips` / `slSellPips`).
    pub directional: bool,
    /// Buffer input used by range-opposite stops on breakout orders.
    pub buffer_input: Option<String>,
}

impl StopLossPlan {
    /// Stop distance variable, in points, for the given side.
    pub fn distance(&self, side: Side) -> &'static str {
        match (self.directional, side) {
            (false, _) => "slPips",
            (true, Side::Buy) => "slBuyPips",
            (true, Side::Sell) => "slSellPips",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeProfitPlan {
    pub node_id: String,
    pub kind: TakeProfitKind,
    pub directional: bool,
    /// Ratio input for risk-reward targets.
    pub ratio_input: Option<String>,
    /// False when the target could not be computed and is disabled.
    pub enabled: bool,
}

impl TakeProfitPlan {
    pub fn distance(&self, side: Side) -> &'static str {
        match (self.directional, side) {
            (false, _) => "tpPips",
            (true, Side::Buy) => "tpBuyPips",
            (true, Side::Sell) => "tpSellPips",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    pub fn position_type(self) -> &'static str {
        match self {
            Side::Buy => "POSITION_TYPE_BUY",
            Side::Sell => "POSITION_TYPE_SELL",
        }
    }
}

/// How an entry node sizes and places its orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlan {
    pub node_id: String,
    pub side: Side,
    /// Expression yielding the lot size; may reference the stop distance.
    pub lots: String,
    pub order_type: OrderType,
    pub offset_input: Option<String>,
    pub expiry_input: Option<String>,
}

/// Range levels published by a range-breakout node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub node_id: String,
    pub prefix: String,
    pub pending: bool,
    pub buffer_input: String,
}

impl RangePlan {
    pub fn high(&self) -> String {
        format!("{}High", self.prefix)
    }

    pub fn low(&self) -> String {
        format!("{}Low", self.prefix)
    }

    pub fn is_new(&self) -> String {
        format!("{}New", self.prefix)
    }
}

/// Cross-node facts resolved by earlier phases.
#[derive(Debug, Clone, Default)]
pub struct Plans {
    pub stop_loss: Option<StopLossPlan>,
    pub take_profit: Option<TakeProfitPlan>,
    pub ranges: Vec<RangePlan>,
}

pub enum Outcome {
    Plain,
    StopLoss(StopLossPlan),
    TakeProfit(TakeProfitPlan),
    Entry(EntryPlan),
    Range(RangePlan),
    OppositeExit,
}

pub struct Emitted {
    pub fragment: Fragment,
    pub outcome: Outcome,
}

impl From<Fragment> for Emitted {
    fn from(fragment: Fragment) -> Self {
        Emitted {
            fragment,
            outcome: Outcome::Plain,
        }
    }
}

pub struct EmitCx<'a> {
    pub graph: &'a StrategyGraph,
    pub ctx: &'a GenerationContext,
    pub names: &'a mut NameRegistry,
    pub diag: &'a mut Diagnostics,
    pub plans: &'a Plans,
}

/// Emit one node. Every node type is handled here; there is no fallback.
pub fn emit_node(cx: &mut EmitCx<'_>, node: &Node) -> Result<Emitted, EaforgeError> {
    let emitted = match &node.data {
        NodeData::MovingAverage(d) => indicator::moving_average(cx, node, d).into(),
        NodeData::MaCrossover(d) => indicator::ma_crossover(cx, node, d).into(),
        NodeData::Rsi(d) => indicator::rsi(cx, node, d).into(),
        NodeData::Macd(d) => indicator::macd(cx, node, d).into(),
        NodeData::BollingerBands(d) => indicator::bollinger(cx, node, d).into(),
        NodeData::Atr(d) => indicator::atr(cx, node, d).into(),
        NodeData::Adx(d) => indicator::adx(cx, node, d).into(),
        NodeData::Stochastic(d) => indicator::stochastic(cx, node, d).into(),
        NodeData::Cci(d) => indicator::cci(cx, node, d).into(),
        NodeData::RangeBreakout(d) => price_action::range_breakout(cx, node, d),
        NodeData::CandlestickPattern(d) => price_action::candlestick(cx, node, d).into(),
        NodeData::TradingSession(d) => timing::trading_session(cx, node, d).into(),
        NodeData::CustomTimes(d) => timing::custom_times(cx, node, d).into(),
        NodeData::MaxSpread(d) => timing::max_spread(cx, node, d).into(),
        NodeData::PlaceBuy(d) => entry::place_order(cx, node, d, Side::Buy),
        NodeData::PlaceSell(d) => entry::place_order(cx, node, d, Side::Sell),
        NodeData::StopLoss(d) => risk::stop_loss(cx, node, d)?,
        NodeData::TakeProfit(d) => risk::take_profit(cx, node, d),
        NodeData::BreakevenStop(d) => management::breakeven(cx, node, d).into(),
        NodeData::TrailingStop(d) => management::trailing_stop(cx, node, d).into(),
        NodeData::PartialClose(d) => management::partial_close(cx, node, d).into(),
        NodeData::LockProfit(d) => management::lock_profit(cx, node, d).into(),
        NodeData::MultiLevelTp(d) => management::multi_level_tp(cx, node, d).into(),
        NodeData::GridPyramid(d) => grid::grid_pyramid(cx, node, d).into(),
        NodeData::TimeExit(d) => management::time_exit(cx, node, d).into(),
        NodeData::OppositeSignalExit => Emitted {
            fragment: Fragment::default(),
            outcome: Outcome::OppositeExit,
        },
    };
    Ok(emitted)
}
