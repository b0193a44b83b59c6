//! Price-action emitters: range breakout and candlestick patterns.

use super::{EmitCx, Emitted, Fragment, Outcome, RangePlan, clamp_period, node_input};
use crate::domain::graph::Node;
use crate::domain::graph::node::{BreakoutEntryMode, CandlePattern, CandlestickData, RangeBreakoutData, SignalMode};
use crate::domain::program::{Decl, InputType, fmt_f64};

/// Smallest lookback a range can be built from.
pub const MIN_RANGE_LOOKBACK: i32 = 2;

/// Range `r` publishes `rng{r}High`, `rng{r}Low` and `rng{r}New` as tick
/// locals. The range covers the `lookback` bars before the last closed bar.
pub fn range_breakout(cx: &mut EmitCx<'_>, node: &Node, d: &RangeBreakoutData) -> Emitted {
    let r = cx.graph.ordinal(&node.id);
    let prefix = format!("rng{}", r);
    let inp = format!("InpRng{}", r);
    let mut frag = Fragment::new(format!("Range Breakout #{}", r + 1));

    let lookback = clamp_period(cx.diag, node, "lookbackBars", d.lookback_bars, MIN_RANGE_LOOKBACK);
    let bars = frag.input(
        cx.names,
        node_input(
            node,
            "lookbackBars",
            &format!("{}LookbackBars", inp),
            InputType::Int,
            lookback.to_string(),
            "Bars in the range",
        ),
    );
    let buffer = frag.input(
        cx.names,
        node_input(
            node,
            "bufferPips",
            &format!("{}BufferPips", inp),
            InputType::Double,
            fmt_f64(d.buffer_pips),
            "Breakout buffer (pips)",
        ),
    );
    let tf = frag.input(
        cx.names,
        node_input(
            node,
            "timeframe",
            &format!("{}Timeframe", inp),
            InputType::Timeframe,
            d.timeframe.mql(),
            "Range timeframe",
        ),
    );

    let last_bar = cx.names.allocate(&format!("{}LastBarTime", prefix));
    frag.globals.push(Decl::state("datetime", &last_bar, "0"));

    let p = &prefix;
    frag.tick_line(0, &format!("int {p}HighIdx = iHighest($SYMBOL, {tf}, MODE_HIGH, {bars}, 2);"));
    frag.tick_line(0, &format!("int {p}LowIdx = iLowest($SYMBOL, {tf}, MODE_LOW, {bars}, 2);"));
    frag.tick_line(0, &format!("if({p}HighIdx < 0 || {p}LowIdx < 0) $EXIT;"));
    frag.tick_line(0, &format!("double {p}High = iHigh($SYMBOL, {tf}, {p}HighIdx);"));
    frag.tick_line(0, &format!("double {p}Low = iLow($SYMBOL, {tf}, {p}LowIdx);"));
    frag.tick_line(0, &format!("datetime {p}BarTime = iTime($SYMBOL, {tf}, 0);"));
    frag.tick_line(0, &format!("bool {p}New = ({p}BarTime != ~{last_bar});"));
    frag.tick_line(0, &format!("~{last_bar} = {p}BarTime;"));
    frag.needs_bars(lookback as usize + 3);

    let pending = d.entry_mode == BreakoutEntryMode::Pending;
    if !pending {
        let margin = format!("{} * $PIP * $POINT", buffer);
        frag.buy_when(
            node,
            &format!("iClose($SYMBOL, {tf}, 1) > {p}High + {margin}"),
            SignalMode::CandleClose,
        );
        frag.sell_when(
            node,
            &format!("iClose($SYMBOL, {tf}, 1) < {p}Low - {margin}"),
            SignalMode::CandleClose,
        );
    }

    Emitted {
        fragment: frag,
        outcome: Outcome::Range(RangePlan {
            node_id: node.id.clone(),
            prefix,
            pending,
            buffer_input: buffer,
        }),
    }
}

fn pattern_helper(pattern: CandlePattern) -> &'static str {
    match pattern {
        CandlePattern::BullishEngulfing => {
            "bool IsBullishEngulfing(ENUM_TIMEFRAMES tf, int shift)
{
   double open1 = iOpen($SYMBOL, tf, shift);
   double close1 = iClose($SYMBOL, tf, shift);
   double open2 = iOpen($SYMBOL, tf, shift + 1);
   double close2 = iClose($SYMBOL, tf, shift + 1);
   return close2 < open2 && close1 > open1 && open1 <= close2 && close1 >= open2;
}"
        }
        CandlePattern::BearishEngulfing => {
            "bool IsBearishEngulfing(ENUM_TIMEFRAMES tf, int shift)
{
   double open1 = iOpen($SYMBOL, tf, shift);
   double close1 = iClose($SYMBOL, tf, shift);
   double open2 = iOpen($SYMBOL, tf, shift + 1);
   double close2 = iClose($SYMBOL, tf, shift + 1);
   return close2 > open2 && close1 < open1 && open1 >= close2 && close1 <= open2;
}"
        }
        CandlePattern::Hammer => {
            "bool IsHammer(ENUM_TIMEFRAMES tf, int shift)
{
   double open = iOpen($SYMBOL, tf, shift);
   double close = iClose($SYMBOL, tf, shift);
   double high = iHigh($SYMBOL, tf, shift);
   double low = iLow($SYMBOL, tf, shift);
   double body = MathAbs(close - open);
   double range = high - low;
   if(range <= 0.0) return false;
   double lowerWick = MathMin(open, close) - low;
   double upperWick = high - MathMax(open, close);
   return lowerWick >= 2.0 * body && upperWick <= body && body <= range * 0.35;
}"
        }
        CandlePattern::ShootingStar => {
            "bool IsShootingStar(ENUM_TIMEFRAMES tf, int shift)
{
   double open = iOpen($SYMBOL, tf, shift);
   double close = iClose($SYMBOL, tf, shift);
   double high = iHigh($SYMBOL, tf, shift);
   double low = iLow($SYMBOL, tf, shift);
   double body = MathAbs(close - open);
   double range = high - low;
   if(range <= 0.0) return false;
   double lowerWick = MathMin(open, close) - low;
   double upperWick = high - MathMax(open, close);
   return upperWick >= 2.0 * body && lowerWick <= body && body <= range * 0.35;
}"
        }
    }
}

/// Patterns are checked on the last closed bar and OR-ed per side.
pub fn candlestick(cx: &mut EmitCx<'_>, node: &Node, d: &CandlestickData) -> Fragment {
    let c = cx.graph.ordinal(&node.id);
    let mut frag = Fragment::new(format!("Candlestick Pattern #{}", c + 1));

    if d.patterns.is_empty() {
        cx.diag.warn(Some(&node.id), "no candlestick patterns selected; node has no effect");
        return frag;
    }

    let tf = frag.input(
        cx.names,
        node_input(
            node,
            "timeframe",
            &format!("InpCdl{}Timeframe", c),
            InputType::Timeframe,
            d.timeframe.mql(),
            "Pattern timeframe",
        ),
    );

    let mut bullish = Vec::new();
    let mut bearish = Vec::new();
    for &pattern in &d.patterns {
        frag.helper(pattern.helper_name(), pattern_helper(pattern));
        let call = format!("{}({}, 1)", pattern.helper_name(), tf);
        if pattern.is_bullish() {
            bullish.push(call);
        } else {
            bearish.push(call);
        }
    }
    if !bullish.is_empty() {
        frag.buy_when(node, &format!("({})", bullish.join(" || ")), SignalMode::CandleClose);
    }
    if !bearish.is_empty() {
        frag.sell_when(node, &format!("({})", bearish.join(" || ")), SignalMode::CandleClose);
    }
    frag.needs_bars(4);
    frag
}
