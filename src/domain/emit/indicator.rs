//! Indicator emitters.
//!
//! Indicator `n` (zero-based, document order among indicators) owns the
//! identifier prefix `ind{n}` and the input prefix `InpInd{n}`. Handles are
//! created once in `OnInit`; buffers are refreshed with `CopyBuffer` every
//! tick, and reads are shifted by one bar in candle-close mode.

use super::{EmitCx, Fragment, clamp_period, node_input};
use crate::domain::graph::node::{
    AdxData, AppliedPrice, AtrData, BollingerData, CciData, MaCrossoverData, MaMethod, MacdData,
    MovingAverageData, NodeData, RsiData, SignalMode, StochasticData, Timeframe,
};
use crate::domain::graph::{Node, StrategyGraph};
use crate::domain::program::{InputType, fmt_f64};

/// Smallest period accepted for moving averages and ATR.
pub const MIN_AVERAGE_PERIOD: i32 = 1;
/// Smallest period accepted for oscillators.
pub const MIN_OSCILLATOR_PERIOD: i32 = 2;

struct Scope {
    prefix: String,
    inp: String,
    shift: usize,
    mode: SignalMode,
}

impl Scope {
    fn new(graph: &StrategyGraph, node: &Node, mode: SignalMode) -> Self {
        let n = graph.ordinal(&node.id);
        Self {
            prefix: format!("ind{}", n),
            inp: format!("InpInd{}", n),
            shift: mode.shift(),
            mode,
        }
    }

    fn group(&self, graph: &StrategyGraph, node: &Node, label: &str) -> String {
        format!("{} #{}", label, graph.ordinal(&node.id) + 1)
    }

    fn input_name(&self, suffix: &str) -> String {
        format!("{}{}", self.inp, suffix)
    }

    /// Values copied per buffer: the read bar and the one before it.
    fn count(&self) -> usize {
        self.shift + 2
    }
}

/// Buffer name for the given part of indicator `prefix`.
fn buffer(prefix: &str, part: &str) -> String {
    format!("{}{}Buffer", prefix, part)
}

fn handle(prefix: &str, part: &str) -> String {
    format!("{}{}Handle", prefix, part)
}

fn describe_period(suffix: &str) -> String {
    let base = suffix.trim_end_matches("Period");
    if base.is_empty() {
        "Period".to_string()
    } else {
        format!("{} period", base)
    }
}

#[allow(clippy::too_many_arguments)]
fn period_input(
    cx: &mut EmitCx<'_>,
    frag: &mut Fragment,
    node: &Node,
    scope: &Scope,
    field: &str,
    suffix: &str,
    value: i32,
    min: i32,
) -> (String, i32) {
    let value = clamp_period(cx.diag, node, field, value, min);
    let name = frag.input(
        cx.names,
        node_input(
            node,
            field,
            &scope.input_name(suffix),
            InputType::Int,
            value.to_string(),
            &describe_period(suffix),
        ),
    );
    (name, value)
}

fn timeframe_input(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, scope: &Scope, tf: Timeframe) -> String {
    frag.input(
        cx.names,
        node_input(
            node,
            "timeframe",
            &scope.input_name("Timeframe"),
            InputType::Timeframe,
            tf.mql(),
            "Timeframe",
        ),
    )
}

fn method_input(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, scope: &Scope, method: MaMethod) -> String {
    frag.input(
        cx.names,
        node_input(
            node,
            "method",
            &scope.input_name("Method"),
            InputType::MaMethod,
            method.mql(),
            "Averaging method",
        ),
    )
}

fn price_input(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, scope: &Scope, price: AppliedPrice) -> String {
    frag.input(
        cx.names,
        node_input(
            node,
            "appliedPrice",
            &scope.input_name("Price"),
            InputType::AppliedPrice,
            price.mql(),
            "Applied price",
        ),
    )
}

#[allow(clippy::too_many_arguments)]
fn level_input(
    cx: &mut EmitCx<'_>,
    frag: &mut Fragment,
    node: &Node,
    scope: &Scope,
    field: &str,
    suffix: &str,
    value: f64,
    comment: &str,
) -> String {
    frag.input(
        cx.names,
        node_input(node, field, &scope.input_name(suffix), InputType::Double, fmt_f64(value), comment),
    )
}

/// Declare handle + buffers and the per-tick copies.
fn wire_buffers(frag: &mut Fragment, scope: &Scope, handle_name: &str, create: &str, label: &str, parts: &[(usize, &str)]) {
    frag.handle(
        handle_name,
        create,
        &format!("Failed to create {} handle ({})", label, scope.prefix),
    );
    for (_, part) in parts {
        frag.buffer(&buffer(&scope.prefix, part));
    }
    for (index, part) in parts {
        frag.copy_buffer(handle_name, *index, scope.count(), &buffer(&scope.prefix, part));
    }
}

pub fn moving_average(cx: &mut EmitCx<'_>, node: &Node, d: &MovingAverageData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "Moving Average"));
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_AVERAGE_PERIOD);
    let method = method_input(cx, &mut frag, node, &scope, d.method);
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iMA($SYMBOL, {}, {}, 0, {}, {});", h, tf, period, method, price),
        "Moving Average",
        &[(0, "")],
    );

    let s = scope.shift;
    let buf = buffer(&scope.prefix, "");
    frag.buy_when(node, &format!("iClose($SYMBOL, {}, {}) > {}[{}]", tf, s, buf, s), scope.mode);
    frag.sell_when(node, &format!("iClose($SYMBOL, {}, {}) < {}[{}]", tf, s, buf, s), scope.mode);
    frag.needs_bars(value as usize + s + 2);
    frag
}

pub fn ma_crossover(cx: &mut EmitCx<'_>, node: &Node, d: &MaCrossoverData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "MA Crossover"));
    if d.fast_period >= d.slow_period {
        cx.diag.warn(
            Some(&node.id),
            format!(
                "fast period {} is not below slow period {}; crossovers will be inverted",
                d.fast_period, d.slow_period
            ),
        );
    }
    let (fast, _) = period_input(cx, &mut frag, node, &scope, "fastPeriod", "FastPeriod", d.fast_period, MIN_AVERAGE_PERIOD);
    let (slow, slow_value) = period_input(cx, &mut frag, node, &scope, "slowPeriod", "SlowPeriod", d.slow_period, MIN_AVERAGE_PERIOD);
    let method = method_input(cx, &mut frag, node, &scope, d.method);
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let fast_h = handle(&scope.prefix, "Fast");
    let slow_h = handle(&scope.prefix, "Slow");
    wire_buffers(
        &mut frag,
        &scope,
        &fast_h,
        &format!("@{} = iMA($SYMBOL, {}, {}, 0, {}, {});", fast_h, tf, fast, method, price),
        "fast MA",
        &[(0, "Fast")],
    );
    wire_buffers(
        &mut frag,
        &scope,
        &slow_h,
        &format!("@{} = iMA($SYMBOL, {}, {}, 0, {}, {});", slow_h, tf, slow, method, price),
        "slow MA",
        &[(0, "Slow")],
    );

    let s = scope.shift;
    let f = buffer(&scope.prefix, "Fast");
    let sl = buffer(&scope.prefix, "Slow");
    frag.buy_when(
        node,
        &format!("{f}[{s}] > {sl}[{s}] && {f}[{p}] <= {sl}[{p}]", f = f, sl = sl, s = s, p = s + 1),
        scope.mode,
    );
    frag.sell_when(
        node,
        &format!("{f}[{s}] < {sl}[{s}] && {f}[{p}] >= {sl}[{p}]", f = f, sl = sl, s = s, p = s + 1),
        scope.mode,
    );
    frag.needs_bars(slow_value as usize + s + 2);
    frag
}

pub fn rsi(cx: &mut EmitCx<'_>, node: &Node, d: &RsiData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "RSI"));
    if d.oversold >= d.overbought {
        cx.diag.warn(
            Some(&node.id),
            format!("oversold {} is not below overbought {}", d.oversold, d.overbought),
        );
    }
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_OSCILLATOR_PERIOD);
    let overbought = level_input(cx, &mut frag, node, &scope, "overbought", "Overbought", d.overbought, "Overbought level");
    let oversold = level_input(cx, &mut frag, node, &scope, "oversold", "Oversold", d.oversold, "Oversold level");
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iRSI($SYMBOL, {}, {}, {});", h, tf, period, price),
        "RSI",
        &[(0, "")],
    );

    let s = scope.shift;
    let buf = buffer(&scope.prefix, "");
    frag.buy_when(node, &format!("{}[{}] < {}", buf, s, oversold), scope.mode);
    frag.sell_when(node, &format!("{}[{}] > {}", buf, s, overbought), scope.mode);
    frag.needs_bars(value as usize + s + 2);
    frag
}

pub fn macd(cx: &mut EmitCx<'_>, node: &Node, d: &MacdData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "MACD"));
    let (fast, _) = period_input(cx, &mut frag, node, &scope, "fastPeriod", "FastPeriod", d.fast_period, MIN_OSCILLATOR_PERIOD);
    let (slow, slow_value) = period_input(cx, &mut frag, node, &scope, "slowPeriod", "SlowPeriod", d.slow_period, MIN_OSCILLATOR_PERIOD);
    let (signal, signal_value) = period_input(cx, &mut frag, node, &scope, "signalPeriod", "SignalPeriod", d.signal_period, MIN_OSCILLATOR_PERIOD);
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iMACD($SYMBOL, {}, {}, {}, {}, {});", h, tf, fast, slow, signal, price),
        "MACD",
        &[(0, "Main"), (1, "Signal")],
    );

    let s = scope.shift;
    let m = buffer(&scope.prefix, "Main");
    let g = buffer(&scope.prefix, "Signal");
    frag.buy_when(
        node,
        &format!("{m}[{s}] > {g}[{s}] && {m}[{p}] <= {g}[{p}]", m = m, g = g, s = s, p = s + 1),
        scope.mode,
    );
    frag.sell_when(
        node,
        &format!("{m}[{s}] < {g}[{s}] && {m}[{p}] >= {g}[{p}]", m = m, g = g, s = s, p = s + 1),
        scope.mode,
    );
    frag.needs_bars(slow_value as usize + signal_value as usize + s + 2);
    frag
}

pub fn bollinger(cx: &mut EmitCx<'_>, node: &Node, d: &BollingerData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "Bollinger Bands"));
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_OSCILLATOR_PERIOD);
    let deviation = if d.deviation > 0.0 {
        d.deviation
    } else {
        cx.diag.warn(
            Some(&node.id),
            format!("deviation {} must be positive; using 2.0", d.deviation),
        );
        2.0
    };
    let dev = level_input(cx, &mut frag, node, &scope, "deviation", "Deviation", deviation, "Band deviation");
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iBands($SYMBOL, {}, {}, 0, {}, {});", h, tf, period, dev, price),
        "Bollinger Bands",
        &[(0, "Middle"), (1, "Upper"), (2, "Lower")],
    );

    let s = scope.shift;
    frag.buy_when(
        node,
        &format!("iClose($SYMBOL, {}, {}) < {}[{}]", tf, s, buffer(&scope.prefix, "Lower"), s),
        scope.mode,
    );
    frag.sell_when(
        node,
        &format!("iClose($SYMBOL, {}, {}) > {}[{}]", tf, s, buffer(&scope.prefix, "Upper"), s),
        scope.mode,
    );
    frag.needs_bars(value as usize + s + 2);
    frag
}

/// ATR only publishes its buffer; stops and trailing read it.
pub fn atr(cx: &mut EmitCx<'_>, node: &Node, d: &AtrData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "ATR"));
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_AVERAGE_PERIOD);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iATR($SYMBOL, {}, {});", h, tf, period),
        "ATR",
        &[(0, "")],
    );
    frag.needs_bars(value as usize + scope.shift + 2);
    frag
}

pub fn adx(cx: &mut EmitCx<'_>, node: &Node, d: &AdxData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "ADX"));
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_OSCILLATOR_PERIOD);
    let level = level_input(cx, &mut frag, node, &scope, "trendLevel", "TrendLevel", d.trend_level, "Minimum trend strength");
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iADX($SYMBOL, {}, {});", h, tf, period),
        "ADX",
        &[(0, "Main"), (1, "PlusDi"), (2, "MinusDi")],
    );

    let s = scope.shift;
    let main = buffer(&scope.prefix, "Main");
    let plus = buffer(&scope.prefix, "PlusDi");
    let minus = buffer(&scope.prefix, "MinusDi");
    frag.buy_when(
        node,
        &format!("{}[{s}] > {} && {}[{s}] > {}[{s}]", main, level, plus, minus, s = s),
        scope.mode,
    );
    frag.sell_when(
        node,
        &format!("{}[{s}] > {} && {}[{s}] > {}[{s}]", main, level, minus, plus, s = s),
        scope.mode,
    );
    frag.needs_bars(value as usize * 2 + s + 2);
    frag
}

pub fn stochastic(cx: &mut EmitCx<'_>, node: &Node, d: &StochasticData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "Stochastic"));
    let (k, k_value) = period_input(cx, &mut frag, node, &scope, "kPeriod", "KPeriod", d.k_period, MIN_OSCILLATOR_PERIOD);
    let (dp, d_value) = period_input(cx, &mut frag, node, &scope, "dPeriod", "DPeriod", d.d_period, MIN_AVERAGE_PERIOD);
    let (slowing, slowing_value) = period_input(cx, &mut frag, node, &scope, "slowing", "Slowing", d.slowing, MIN_AVERAGE_PERIOD);
    let overbought = level_input(cx, &mut frag, node, &scope, "overbought", "Overbought", d.overbought, "Overbought level");
    let oversold = level_input(cx, &mut frag, node, &scope, "oversold", "Oversold", d.oversold, "Oversold level");
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!(
            "@{} = iStochastic($SYMBOL, {}, {}, {}, {}, MODE_SMA, STO_LOWHIGH);",
            h, tf, k, dp, slowing
        ),
        "Stochastic",
        &[(0, "Main"), (1, "Signal")],
    );

    let s = scope.shift;
    let main = buffer(&scope.prefix, "Main");
    let signal = buffer(&scope.prefix, "Signal");
    frag.buy_when(
        node,
        &format!("{m}[{s}] < {} && {m}[{s}] > {g}[{s}]", oversold, m = main, g = signal, s = s),
        scope.mode,
    );
    frag.sell_when(
        node,
        &format!("{m}[{s}] > {} && {m}[{s}] < {g}[{s}]", overbought, m = main, g = signal, s = s),
        scope.mode,
    );
    frag.needs_bars((k_value + d_value + slowing_value) as usize + s + 2);
    frag
}

pub fn cci(cx: &mut EmitCx<'_>, node: &Node, d: &CciData) -> Fragment {
    let scope = Scope::new(cx.graph, node, d.signal_mode);
    let mut frag = Fragment::new(scope.group(cx.graph, node, "CCI"));
    let (period, value) = period_input(cx, &mut frag, node, &scope, "period", "Period", d.period, MIN_OSCILLATOR_PERIOD);
    let overbought = level_input(cx, &mut frag, node, &scope, "overbought", "Overbought", d.overbought, "Overbought level");
    let oversold = level_input(cx, &mut frag, node, &scope, "oversold", "Oversold", d.oversold, "Oversold level");
    let price = price_input(cx, &mut frag, node, &scope, d.applied_price);
    let tf = timeframe_input(cx, &mut frag, node, &scope, d.timeframe);

    let h = handle(&scope.prefix, "");
    wire_buffers(
        &mut frag,
        &scope,
        &h,
        &format!("@{} = iCCI($SYMBOL, {}, {}, {});", h, tf, period, price),
        "CCI",
        &[(0, "")],
    );

    let s = scope.shift;
    let buf = buffer(&scope.prefix, "");
    frag.buy_when(node, &format!("{}[{}] < {}", buf, s, oversold), scope.mode);
    frag.sell_when(node, &format!("{}[{}] > {}", buf, s, overbought), scope.mode);
    frag.needs_bars(value as usize + s + 2);
    frag
}

/// What an indicator-based stop can read from a connected indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorLevel {
    /// Price levels the stop sits beyond, per side.
    Price { buy: String, sell: String },
    /// A price distance (ATR value).
    Distance(String),
}

/// Level exposed by an indicator node, or `None` for oscillators whose
/// values are not prices.
pub fn stop_level(graph: &StrategyGraph, node: &Node) -> Option<IndicatorLevel> {
    let prefix = format!("ind{}", graph.ordinal(&node.id));
    let shift = node.data.signal_mode()?.shift();
    let at = |part: &str| format!("{}[{}]", buffer(&prefix, part), shift);
    match &node.data {
        NodeData::MovingAverage(_) => Some(IndicatorLevel::Price {
            buy: at(""),
            sell: at(""),
        }),
        NodeData::MaCrossover(_) => Some(IndicatorLevel::Price {
            buy: at("Slow"),
            sell: at("Slow"),
        }),
        NodeData::BollingerBands(_) => Some(IndicatorLevel::Price {
            buy: at("Lower"),
            sell: at("Upper"),
        }),
        NodeData::Atr(_) => Some(IndicatorLevel::Distance(at(""))),
        _ => None,
    }
}
