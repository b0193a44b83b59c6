//! Stop-loss and take-profit emitters.
//!
//! Distances are computed every tick into locals measured in points:
//! `slPips`/`tpPips`, or `slBuyPips`/`slSellPips` (and the take-profit
//! equivalents) when the distance depends on the side. Only the first
//! stop-loss and the first take-profit node are used.

use super::indicator::{IndicatorLevel, MIN_AVERAGE_PERIOD, stop_level};
use super::{
    EmitCx, Emitted, Fragment, Outcome, StopLossPlan, TakeProfitPlan, clamp_period, node_input,
};
use crate::domain::error::EaforgeError;
use crate::domain::graph::node::{StopLossData, TakeProfitData};
use crate::domain::graph::{Node, NodeCategory};
use crate::domain::program::{InputType, StopLossKind, TakeProfitKind, fmt_f64};

/// Stop distance used when an indicator stop has nothing usable to read.
pub const FALLBACK_STOP_PIPS: f64 = 50.0;

fn ignored(cx: &mut EmitCx<'_>, node: &Node, what: &str) -> Emitted {
    cx.diag.warn(
        Some(&node.id),
        format!("additional {} node ignored; only the first one is used", what),
    );
    Fragment::default().into()
}

fn pips_input(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, field: &str, base: &str, value: f64, comment: &str) -> String {
    frag.input(
        cx.names,
        node_input(node, field, base, InputType::Double, fmt_f64(value), comment),
    )
}

fn atr_distance(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, base: &str, period: i32, multiplier: f64, var: &str) {
    let period = clamp_period(cx.diag, node, "period", period, MIN_AVERAGE_PERIOD);
    let period_input = frag.input(
        cx.names,
        node_input(
            node,
            "period",
            &format!("Inp{}AtrPeriod", base),
            InputType::Int,
            period.to_string(),
            "ATR period",
        ),
    );
    let mult = pips_input(cx, frag, node, "multiplier", &format!("Inp{}AtrMultiplier", base), multiplier, "ATR multiplier");
    let prefix = format!("{}{}", base[..1].to_lowercase(), &base[1..]);
    let handle = cx.names.allocate(&format!("{}AtrHandle", prefix));
    let buffer = cx.names.allocate(&format!("{}AtrBuffer", prefix));
    frag.handle(
        &handle,
        &format!("@{} = iATR($SYMBOL, PERIOD_CURRENT, {});", handle, period_input),
        &format!("Failed to create ATR handle for {}", var),
    );
    frag.buffer(&buffer);
    frag.copy_buffer(&handle, 0, 2, &buffer);
    frag.tick_line(0, &format!("double {} = {}[1] * {} / $POINT;", var, buffer, mult));
    frag.needs_bars(period as usize + 2);
}

pub fn stop_loss(cx: &mut EmitCx<'_>, node: &Node, d: &StopLossData) -> Result<Emitted, EaforgeError> {
    if cx.plans.stop_loss.is_some() {
        return Ok(ignored(cx, node, "stop-loss"));
    }
    let mut frag = Fragment::new("Stop Loss");
    let mut plan = StopLossPlan {
        node_id: node.id.clone(),
        kind: StopLossKind::Fixed,
        directional: false,
        buffer_input: None,
    };

    match d {
        StopLossData::Fixed { pips } => {
            fixed_stop(cx, &mut frag, node, *pips);
        }
        StopLossData::Percent { percent } => {
            let input = pips_input(cx, &mut frag, node, "percent", "InpStopLossPercent", *percent, "Stop loss (% of price)");
            frag.tick_line(
                0,
                &format!("double slBuyPips = SymbolInfoDouble($SYMBOL, SYMBOL_ASK) * {} / 100.0 / $POINT;", input),
            );
            frag.tick_line(
                0,
                &format!("double slSellPips = SymbolInfoDouble($SYMBOL, SYMBOL_BID) * {} / 100.0 / $POINT;", input),
            );
            plan.kind = StopLossKind::Percent;
            plan.directional = true;
        }
        StopLossData::Atr { period, multiplier } => {
            atr_distance(cx, &mut frag, node, "StopLoss", *period, *multiplier, "slPips");
            plan.kind = StopLossKind::Atr;
        }
        StopLossData::RangeOpposite { buffer_pips } => {
            let range = cx.plans.ranges.first().cloned().ok_or_else(|| {
                EaforgeError::structural(
                    &node.id,
                    "range-opposite stop loss needs a range-breakout node in the graph",
                )
            })?;
            let buffer = pips_input(cx, &mut frag, node, "bufferPips", "InpStopLossBufferPips", *buffer_pips, "Distance beyond the range (pips)");
            let margin = format!("{} * $PIP * $POINT", buffer);
            frag.tick_line(
                0,
                &format!(
                    "double slBuyPips = MathMax((SymbolInfoDouble($SYMBOL, SYMBOL_ASK) - ({} - {})) / $POINT, 0.0);",
                    range.low(),
                    margin
                ),
            );
            frag.tick_line(
                0,
                &format!(
                    "double slSellPips = MathMax((({} + {}) - SymbolInfoDouble($SYMBOL, SYMBOL_BID)) / $POINT, 0.0);",
                    range.high(),
                    margin
                ),
            );
            plan.kind = StopLossKind::RangeOpposite;
            plan.directional = true;
            plan.buffer_input = Some(buffer);
        }
        StopLossData::Indicator { buffer_pips, .. } => {
            let level = cx
                .graph
                .connected_node(&node.id, |n| n.category() == NodeCategory::Indicator)
                .map(|ind| (ind.id.clone(), stop_level(cx.graph, ind)));
            match level {
                Some((_, Some(level))) => {
                    indicator_stop(cx, &mut frag, node, *buffer_pips, level, &mut plan);
                }
                Some((ind_id, None)) => {
                    fallback_stop(
                        cx,
                        &mut frag,
                        node,
                        &format!(
                            "indicator stop loss: {} has no price level; using fixed {} pips",
                            ind_id, FALLBACK_STOP_PIPS
                        ),
                    );
                }
                None => {
                    fallback_stop(
                        cx,
                        &mut frag,
                        node,
                        &format!(
                            "indicator stop loss has no indicator connected; using fixed {} pips",
                            FALLBACK_STOP_PIPS
                        ),
                    );
                }
            }
        }
    }

    Ok(Emitted {
        fragment: frag,
        outcome: Outcome::StopLoss(plan),
    })
}

fn fixed_stop(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, pips: f64) {
    let pips = if pips > 0.0 {
        pips
    } else {
        cx.diag.warn(
            Some(&node.id),
            format!("stop loss of {} pips is not positive; using {}", pips, FALLBACK_STOP_PIPS),
        );
        FALLBACK_STOP_PIPS
    };
    let input = pips_input(cx, frag, node, "pips", "InpStopLossPips", pips, "Stop loss (pips)");
    frag.tick_line(0, &format!("double slPips = {} * $PIP;", input));
}

fn fallback_stop(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, message: &str) {
    cx.diag.warn(Some(&node.id), message);
    frag.runtime_warnings.push(message.to_string());
    let input = pips_input(cx, frag, node, "pips", "InpStopLossPips", FALLBACK_STOP_PIPS, "Stop loss (pips)");
    frag.tick_line(0, &format!("double slPips = {} * $PIP;", input));
}

fn indicator_stop(
    cx: &mut EmitCx<'_>,
    frag: &mut Fragment,
    node: &Node,
    buffer_pips: f64,
    level: IndicatorLevel,
    plan: &mut StopLossPlan,
) {
    let buffer = pips_input(cx, frag, node, "bufferPips", "InpStopLossBufferPips", buffer_pips, "Distance beyond the indicator (pips)");
    plan.kind = StopLossKind::Indicator;
    match level {
        IndicatorLevel::Price { buy, sell } => {
            let min = pips_input(cx, frag, node, "minPips", "InpStopLossMinPips", 10.0, "Minimum stop distance (pips)");
            frag.tick_line(
                0,
                &format!(
                    "double slBuyPips = (SymbolInfoDouble($SYMBOL, SYMBOL_ASK) - {}) / $POINT + {} * $PIP;",
                    buy, buffer
                ),
            );
            frag.tick_line(
                0,
                &format!(
                    "double slSellPips = ({} - SymbolInfoDouble($SYMBOL, SYMBOL_BID)) / $POINT + {} * $PIP;",
                    sell, buffer
                ),
            );
            frag.tick_line(0, &format!("if(slBuyPips < {m} * $PIP) slBuyPips = {m} * $PIP;", m = min));
            frag.tick_line(0, &format!("if(slSellPips < {m} * $PIP) slSellPips = {m} * $PIP;", m = min));
            plan.directional = true;
        }
        IndicatorLevel::Distance(value) => {
            frag.tick_line(
                0,
                &format!("double slPips = {} / $POINT + {} * $PIP;", value, buffer),
            );
        }
    }
}

pub fn take_profit(cx: &mut EmitCx<'_>, node: &Node, d: &TakeProfitData) -> Emitted {
    if cx.plans.take_profit.is_some() {
        return ignored(cx, node, "take-profit");
    }
    let mut frag = Fragment::new("Take Profit");
    let mut plan = TakeProfitPlan {
        node_id: node.id.clone(),
        kind: TakeProfitKind::Fixed,
        directional: false,
        ratio_input: None,
        enabled: true,
    };

    match d {
        TakeProfitData::Fixed { pips } => {
            let input = pips_input(cx, &mut frag, node, "pips", "InpTakeProfitPips", *pips, "Take profit (pips)");
            frag.tick_line(0, &format!("double tpPips = {} * $PIP;", input));
            if *pips <= 0.0 {
                cx.diag.warn(Some(&node.id), "take profit is not positive; target disabled");
                plan.enabled = false;
            }
        }
        TakeProfitData::RiskReward { ratio } => {
            plan.kind = TakeProfitKind::RiskReward;
            let input = pips_input(cx, &mut frag, node, "ratio", "InpTakeProfitRR", *ratio, "Reward to risk ratio");
            plan.ratio_input = Some(input.clone());
            match cx.plans.stop_loss.clone() {
                Some(sl) if sl.directional => {
                    frag.tick_line(0, &format!("double tpBuyPips = slBuyPips * {};", input));
                    frag.tick_line(0, &format!("double tpSellPips = slSellPips * {};", input));
                    plan.directional = true;
                }
                Some(_) => {
                    frag.tick_line(0, &format!("double tpPips = slPips * {};", input));
                }
                None => {
                    cx.diag.warn(
                        Some(&node.id),
                        "risk-reward take profit needs a stop loss; take profit disabled",
                    );
                    frag.tick_line(0, "double tpPips = 0.0;");
                    plan.enabled = false;
                }
            }
        }
        TakeProfitData::Atr { period, multiplier } => {
            plan.kind = TakeProfitKind::Atr;
            atr_distance(cx, &mut frag, node, "TakeProfit", *period, *multiplier, "tpPips");
        }
    }

    Emitted {
        fragment: frag,
        outcome: Outcome::TakeProfit(plan),
    }
}
