//! Trade-management and exit emitters.
//!
//! Every rule runs inside one shared position loop built by the assembler.
//! Rules contribute per-position calls; the helpers they call select the
//! position by ticket and read prices for the position's own symbol.

use super::indicator::MIN_AVERAGE_PERIOD;
use super::{EmitCx, Fragment, ManagementRule, clamp_period, node_input};
use crate::domain::graph::Node;
use crate::domain::graph::node::{
    BreakevenData, LockProfitData, MultiLevelTpData, PartialCloseData, TimeExitData,
    TrailingStopData,
};
use crate::domain::program::{Decl, InputType, Stmt, fmt_f64};

pub const MODIFY_POSITION_SLTP: &str = "bool ModifyPositionSLTP(ulong ticket, double sl, double tp)
{
   if(!trade.PositionModify(ticket, sl, tp))
   {
      Print(\"Failed to modify position \", ticket, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
      return false;
   }
   return true;
}";

const APPLY_BREAKEVEN: &str = "void ApplyBreakeven(ulong ticket, double triggerPips, double lockPips)
{
   if(!PositionSelectByTicket(ticket)) return;
   double openPrice = PositionGetDouble(POSITION_PRICE_OPEN);
   double sl = PositionGetDouble(POSITION_SL);
   double tp = PositionGetDouble(POSITION_TP);
   double trigger = triggerPips * $PIP * $POINT;
   double lockDistance = lockPips * $PIP * $POINT;
   if(PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY)
   {
      double newSl = NormalizeDouble(openPrice + lockDistance, $DIGITS);
      if(SymbolInfoDouble($SYMBOL, SYMBOL_BID) - openPrice >= trigger && (sl == 0.0 || sl < newSl))
         ModifyPositionSLTP(ticket, newSl, tp);
   }
   else
   {
      double newSl = NormalizeDouble(openPrice - lockDistance, $DIGITS);
      if(openPrice - SymbolInfoDouble($SYMBOL, SYMBOL_ASK) >= trigger && (sl == 0.0 || sl > newSl))
         ModifyPositionSLTP(ticket, newSl, tp);
   }
}";

const TRAIL_POSITION: &str = "void TrailPosition(ulong ticket, double trailDistance, double startDistance, double stepDistance)
{
   if(trailDistance <= 0.0 || !PositionSelectByTicket(ticket)) return;
   double openPrice = PositionGetDouble(POSITION_PRICE_OPEN);
   double sl = PositionGetDouble(POSITION_SL);
   double tp = PositionGetDouble(POSITION_TP);
   if(PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY)
   {
      double bid = SymbolInfoDouble($SYMBOL, SYMBOL_BID);
      if(bid - openPrice < startDistance) return;
      double newSl = NormalizeDouble(bid - trailDistance, $DIGITS);
      if(sl == 0.0 || (newSl > sl && newSl - sl >= stepDistance))
         ModifyPositionSLTP(ticket, newSl, tp);
   }
   else
   {
      double ask = SymbolInfoDouble($SYMBOL, SYMBOL_ASK);
      if(openPrice - ask < startDistance) return;
      double newSl = NormalizeDouble(ask + trailDistance, $DIGITS);
      if(sl == 0.0 || (newSl < sl && sl - newSl >= stepDistance))
         ModifyPositionSLTP(ticket, newSl, tp);
   }
}";

const APPLY_LOCK_PROFIT: &str = "void ApplyLockProfit(ulong ticket, double triggerPips, double lockPercent)
{
   if(!PositionSelectByTicket(ticket)) return;
   double openPrice = PositionGetDouble(POSITION_PRICE_OPEN);
   double sl = PositionGetDouble(POSITION_SL);
   double tp = PositionGetDouble(POSITION_TP);
   double trigger = triggerPips * $PIP * $POINT;
   if(PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY)
   {
      double profit = SymbolInfoDouble($SYMBOL, SYMBOL_BID) - openPrice;
      if(profit < trigger) return;
      double newSl = NormalizeDouble(openPrice + profit * lockPercent / 100.0, $DIGITS);
      if(sl == 0.0 || newSl > sl) ModifyPositionSLTP(ticket, newSl, tp);
   }
   else
   {
      double profit = openPrice - SymbolInfoDouble($SYMBOL, SYMBOL_ASK);
      if(profit < trigger) return;
      double newSl = NormalizeDouble(openPrice - profit * lockPercent / 100.0, $DIGITS);
      if(sl == 0.0 || newSl < sl) ModifyPositionSLTP(ticket, newSl, tp);
   }
}";

const TICKET_IN_LIST: &str = "bool TicketInList(ulong ticket, const ulong &list[])
{
   for(int i = ArraySize(list) - 1; i >= 0; i--)
      if(list[i] == ticket) return true;
   return false;
}";

const REMEMBER_TICKET: &str = "void RememberTicket(ulong ticket, ulong &list[])
{
   int size = ArraySize(list);
   ArrayResize(list, size + 1);
   list[size] = ticket;
}";

/// Drops tickets whose position is gone, so done lists stay as small as the
/// open position set.
const PRUNE_TICKET_LIST: &str = "void PruneTicketList(ulong &list[])
{
   int size = ArraySize(list);
   for(int i = size - 1; i >= 0; i--)
   {
      if(PositionSelectByTicket(list[i])) continue;
      size--;
      list[i] = list[size];
   }
   ArrayResize(list, size);
}";

const APPLY_PARTIAL_CLOSE: &str = "void ApplyPartialClose(ulong ticket, double triggerPips, double closePercent, ulong &doneTickets[])
{
   if(TicketInList(ticket, doneTickets) || !PositionSelectByTicket(ticket)) return;
   double openPrice = PositionGetDouble(POSITION_PRICE_OPEN);
   double trigger = triggerPips * $PIP * $POINT;
   double profit = PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY
      ? SymbolInfoDouble($SYMBOL, SYMBOL_BID) - openPrice
      : openPrice - SymbolInfoDouble($SYMBOL, SYMBOL_ASK);
   if(profit < trigger) return;
   double volume = PositionGetDouble(POSITION_VOLUME);
   double step = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_STEP);
   double minLot = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_MIN);
   double closeVolume = volume * closePercent / 100.0;
   if(step > 0.0) closeVolume = MathFloor(closeVolume / step) * step;
   closeVolume = NormalizeDouble(closeVolume, 2);
   if(closeVolume < minLot || volume - closeVolume < minLot)
   {
      RememberTicket(ticket, doneTickets);
      return;
   }
   if(trade.PositionClosePartial(ticket, closeVolume))
      RememberTicket(ticket, doneTickets);
   else
      Print(\"Partial close failed for \", ticket, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
}";

const CLOSE_AFTER_BARS: &str = "void CloseAfterBars(ulong ticket, int maxBars)
{
   if(maxBars <= 0 || !PositionSelectByTicket(ticket)) return;
   datetime opened = (datetime)PositionGetInteger(POSITION_TIME);
   int held = iBarShift($SYMBOL, PERIOD_CURRENT, opened);
   if(held < maxBars) return;
   if(!trade.PositionClose(ticket))
      Print(\"Time exit failed for \", ticket, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
}";

fn pips(cx: &mut EmitCx<'_>, frag: &mut Fragment, node: &Node, field: &str, base: &str, value: f64, comment: &str) -> String {
    frag.input(
        cx.names,
        node_input(node, field, base, InputType::Double, fmt_f64(value), comment),
    )
}

fn prune(done: &str) -> Stmt {
    Stmt::plain(0, &format!("PruneTicketList({});", done))
}

fn per_position(frag: &mut Fragment, call: &str) {
    frag.management.push(ManagementRule {
        setup: Vec::new(),
        per_position: vec![Stmt::plain(0, call)],
    });
}

fn partial_close_helpers(frag: &mut Fragment) {
    frag.helper("TicketInList", TICKET_IN_LIST);
    frag.helper("RememberTicket", REMEMBER_TICKET);
    frag.helper("PruneTicketList", PRUNE_TICKET_LIST);
    frag.helper("ApplyPartialClose", APPLY_PARTIAL_CLOSE);
}

pub fn breakeven(cx: &mut EmitCx<'_>, node: &Node, d: &BreakevenData) -> Fragment {
    let mut frag = Fragment::new("Breakeven");
    if d.lock_pips >= d.trigger_pips {
        cx.diag.warn(
            Some(&node.id),
            format!(
                "breakeven lock of {} pips is not below its trigger of {} pips",
                d.lock_pips, d.trigger_pips
            ),
        );
    }
    let trigger = pips(cx, &mut frag, node, "triggerPips", "InpBreakevenTriggerPips", d.trigger_pips, "Profit that arms breakeven (pips)");
    let lock = pips(cx, &mut frag, node, "lockPips", "InpBreakevenLockPips", d.lock_pips, "Profit locked at breakeven (pips)");
    frag.helper("ModifyPositionSLTP", MODIFY_POSITION_SLTP);
    frag.helper("ApplyBreakeven", APPLY_BREAKEVEN);
    per_position(&mut frag, &format!("ApplyBreakeven(ticket, {}, {});", trigger, lock));
    frag
}

pub fn trailing_stop(cx: &mut EmitCx<'_>, node: &Node, d: &TrailingStopData) -> Fragment {
    let mut frag = Fragment::new("Trailing Stop");
    frag.helper("ModifyPositionSLTP", MODIFY_POSITION_SLTP);
    frag.helper("TrailPosition", TRAIL_POSITION);
    match d {
        TrailingStopData::Fixed {
            trail_pips,
            start_pips,
            step_pips,
        } => {
            let trail = pips(cx, &mut frag, node, "trailPips", "InpTrailPips", *trail_pips, "Trailing distance (pips)");
            let start = pips(cx, &mut frag, node, "startPips", "InpTrailStartPips", *start_pips, "Profit before trailing starts (pips)");
            let step = pips(cx, &mut frag, node, "stepPips", "InpTrailStepPips", *step_pips, "Minimum stop move (pips)");
            per_position(
                &mut frag,
                &format!(
                    "TrailPosition(ticket, {} * $PIP * $POINT, {} * $PIP * $POINT, {} * $PIP * $POINT);",
                    trail, start, step
                ),
            );
        }
        TrailingStopData::Atr { period, multiplier } => {
            let period = clamp_period(cx.diag, node, "period", *period, MIN_AVERAGE_PERIOD);
            let period_input = frag.input(
                cx.names,
                node_input(node, "period", "InpTrailAtrPeriod", InputType::Int, period.to_string(), "ATR period"),
            );
            let mult = pips(cx, &mut frag, node, "multiplier", "InpTrailAtrMultiplier", *multiplier, "ATR multiplier");
            let handle = cx.names.allocate("trailAtrHandle");
            let buffer = cx.names.allocate("trailAtrBuffer");
            let distance = cx.names.allocate("trailAtrDistance");
            frag.handle(
                &handle,
                &format!("@{} = iATR($SYMBOL, PERIOD_CURRENT, {});", handle, period_input),
                "Failed to create ATR handle for trailing stop",
            );
            frag.buffer(&buffer);
            frag.needs_bars(period as usize + 2);
            frag.management.push(ManagementRule {
                setup: vec![
                    Stmt::plain(0, &format!("double {} = 0.0;", distance)),
                    Stmt::plain(
                        0,
                        &format!(
                            "if(CopyBuffer(@{}, 0, 1, 1, {}) == 1) {} = {}[0] * {};",
                            handle, buffer, distance, buffer, mult
                        ),
                    ),
                ],
                per_position: vec![Stmt::plain(
                    0,
                    &format!("TrailPosition(ticket, {d}, 0.0, {d} * 0.1);", d = distance),
                )],
            });
        }
    }
    frag
}

pub fn partial_close(cx: &mut EmitCx<'_>, node: &Node, d: &PartialCloseData) -> Fragment {
    let mut frag = Fragment::new("Partial Close");
    let percent = if d.close_percent > 0.0 && d.close_percent < 100.0 {
        d.close_percent
    } else {
        cx.diag.warn(
            Some(&node.id),
            format!("close percent {} must be between 0 and 100; using 50", d.close_percent),
        );
        50.0
    };
    let trigger = pips(cx, &mut frag, node, "triggerPips", "InpPartialCloseTriggerPips", d.trigger_pips, "Profit that triggers the partial close (pips)");
    let percent = pips(cx, &mut frag, node, "closePercent", "InpPartialClosePercent", percent, "Volume to close (%)");
    let done = cx.names.allocate("partialCloseDone");
    frag.globals.push(Decl::plain(format!("ulong {}[];", done)));
    partial_close_helpers(&mut frag);
    frag.management.push(ManagementRule {
        setup: vec![prune(&done)],
        per_position: vec![Stmt::plain(
            0,
            &format!("ApplyPartialClose(ticket, {}, {}, {});", trigger, percent, done),
        )],
    });
    frag
}

pub fn lock_profit(cx: &mut EmitCx<'_>, node: &Node, d: &LockProfitData) -> Fragment {
    let mut frag = Fragment::new("Lock Profit");
    let trigger = pips(cx, &mut frag, node, "triggerPips", "InpLockProfitTriggerPips", d.trigger_pips, "Profit that arms the lock (pips)");
    let percent = pips(cx, &mut frag, node, "lockPercent", "InpLockProfitPercent", d.lock_percent.clamp(0.0, 100.0), "Share of open profit to lock (%)");
    frag.helper("ModifyPositionSLTP", MODIFY_POSITION_SLTP);
    frag.helper("ApplyLockProfit", APPLY_LOCK_PROFIT);
    per_position(&mut frag, &format!("ApplyLockProfit(ticket, {}, {});", trigger, percent));
    frag
}

/// Each level closes its share of the volume still open when it is reached.
pub fn multi_level_tp(cx: &mut EmitCx<'_>, node: &Node, d: &MultiLevelTpData) -> Fragment {
    let mut frag = Fragment::new("Multi-Level Take Profit");
    if d.levels.is_empty() {
        cx.diag.warn(Some(&node.id), "multi-level take profit has no levels");
        return frag;
    }
    if d.levels.windows(2).any(|w| w[1].pips <= w[0].pips) {
        cx.diag.warn(Some(&node.id), "take-profit levels are not in ascending order");
    }
    partial_close_helpers(&mut frag);
    let mut setup = Vec::new();
    let mut calls = Vec::new();
    for (k, level) in d.levels.iter().enumerate() {
        let n = k + 1;
        let at = pips(cx, &mut frag, node, "levels", &format!("InpTpLevel{}Pips", n), level.pips, &format!("Level {} distance (pips)", n));
        let share = pips(
            cx,
            &mut frag,
            node,
            "levels",
            &format!("InpTpLevel{}Percent", n),
            level.close_percent.clamp(0.0, 100.0),
            &format!("Level {} volume to close (%)", n),
        );
        let done = cx.names.allocate(&format!("tpLevel{}Done", n));
        frag.globals.push(Decl::plain(format!("ulong {}[];", done)));
        setup.push(prune(&done));
        calls.push(Stmt::plain(
            0,
            &format!("ApplyPartialClose(ticket, {}, {}, {});", at, share, done),
        ));
    }
    frag.management.push(ManagementRule {
        setup,
        per_position: calls,
    });
    frag
}

pub fn time_exit(cx: &mut EmitCx<'_>, node: &Node, d: &TimeExitData) -> Fragment {
    let mut frag = Fragment::new("Time Exit");
    let bars = clamp_period(cx.diag, node, "closeAfterBars", d.close_after_bars, 1);
    let input = frag.input(
        cx.names,
        node_input(node, "closeAfterBars", "InpTimeExitBars", InputType::Int, bars.to_string(), "Close positions after this many bars"),
    );
    frag.helper("CloseAfterBars", CLOSE_AFTER_BARS);
    per_position(&mut frag, &format!("CloseAfterBars(ticket, {});", input));
    frag
}

#[cfg(test)]
mod tests {
    use crate::domain::emit::test_support::*;
    use crate::domain::graph::Node;
    use crate::domain::graph::node::*;

    #[test]
    fn breakeven_rule_and_helpers() {
        let node = Node::new("be", NodeData::BreakevenStop(BreakevenData::default()));
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("be").unwrap().fragment;
        assert_eq!(frag.management.len(), 1);
        assert_eq!(
            rendered(&frag.management[0].per_position),
            vec!["ApplyBreakeven(ticket, InpBreakevenTriggerPips, InpBreakevenLockPips);"]
        );
        let names: Vec<_> = frag.helpers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["ModifyPositionSLTP", "ApplyBreakeven"]);
    }

    #[test]
    fn two_partial_closes_get_suffixed_names() {
        let nodes = vec![
            Node::new("p1", NodeData::PartialClose(PartialCloseData::default())),
            Node::new(
                "p2",
                NodeData::PartialClose(PartialCloseData {
                    trigger_pips: 60.0,
                    close_percent: 25.0,
                }),
            ),
        ];
        let mut h = Harness::new(nodes, vec![]);
        let first = h.emit("p1").unwrap().fragment;
        let second = h.emit("p2").unwrap().fragment;
        assert_eq!(first.inputs[1].name, "InpPartialClosePercent");
        assert_eq!(second.inputs[1].name, "InpPartialClosePercent_2");
        assert_eq!(
            rendered(&second.management[0].per_position),
            vec!["ApplyPartialClose(ticket, InpPartialCloseTriggerPips_2, InpPartialClosePercent_2, partialCloseDone_2);"]
        );
    }

    #[test]
    fn atr_trailing_reads_buffer_once_per_tick() {
        let node = Node::new(
            "tr",
            NodeData::TrailingStop(TrailingStopData::Atr { period: 14, multiplier: 2.0 }),
        );
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("tr").unwrap().fragment;
        let rule = &frag.management[0];
        assert_eq!(rule.setup.len(), 2);
        assert!(rendered(&rule.setup)[1].starts_with("if(CopyBuffer(trailAtrHandle, 0, 1, 1, trailAtrBuffer) == 1)"));
        assert_eq!(frag.teardown.len(), 1);
    }

    #[test]
    fn fixed_trailing_scales_inputs() {
        let node = Node::new(
            "tr",
            NodeData::TrailingStop(TrailingStopData::Fixed {
                trail_pips: 15.0,
                start_pips: 10.0,
                step_pips: 2.0,
            }),
        );
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("tr").unwrap().fragment;
        assert_eq!(
            rendered(&frag.management[0].per_position)[0],
            "TrailPosition(ticket, InpTrailPips * pipFactor * _Point, InpTrailStartPips * pipFactor * _Point, InpTrailStepPips * pipFactor * _Point);"
        );
    }

    #[test]
    fn multi_level_tp_one_call_per_level() {
        let node = Node::new("m", NodeData::MultiLevelTp(MultiLevelTpData::default()));
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("m").unwrap().fragment;
        assert_eq!(frag.management[0].per_position.len(), 2);
        assert_eq!(frag.globals.len(), 2);
        assert_eq!(frag.inputs.len(), 4);
        assert_eq!(
            rendered(&frag.management[0].setup),
            vec!["PruneTicketList(tpLevel1Done);", "PruneTicketList(tpLevel2Done);"]
        );
    }

    #[test]
    fn done_tickets_pruned_once_per_tick() {
        let node = Node::new("p", NodeData::PartialClose(PartialCloseData::default()));
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("p").unwrap().fragment;
        let rule = &frag.management[0];
        assert_eq!(rendered(&rule.setup), vec!["PruneTicketList(partialCloseDone);"]);
        let prune = frag.helpers.iter().find(|h| h.name == "PruneTicketList").unwrap();
        let body: Vec<String> = prune.lines.iter().map(|l| l.render()).collect();
        assert!(body.contains(&"      if(PositionSelectByTicket(list[i])) continue;".to_string()));
        assert!(body.contains(&"   ArrayResize(list, size);".to_string()));
    }

    #[test]
    fn multi_level_tp_warns_on_descending_levels() {
        let node = Node::new(
            "m",
            NodeData::MultiLevelTp(MultiLevelTpData {
                levels: vec![
                    TpLevel { pips: 40.0, close_percent: 50.0 },
                    TpLevel { pips: 20.0, close_percent: 50.0 },
                ],
            }),
        );
        let mut h = Harness::new(vec![node], vec![]);
        h.emit("m").unwrap();
        assert_eq!(h.diag.warnings().len(), 1);
    }

    #[test]
    fn invalid_partial_percent_is_replaced() {
        let node = Node::new(
            "p",
            NodeData::PartialClose(PartialCloseData {
                trigger_pips: 10.0,
                close_percent: 150.0,
            }),
        );
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("p").unwrap().fragment;
        assert_eq!(frag.inputs[1].default_value, "50.0");
    }

    #[test]
    fn time_exit_rule() {
        let node = Node::new("te", NodeData::TimeExit(TimeExitData { close_after_bars: 12 }));
        let mut h = Harness::new(vec![node], vec![]);
        let frag = h.emit("te").unwrap().fragment;
        assert_eq!(
            rendered(&frag.management[0].per_position),
            vec!["CloseAfterBars(ticket, InpTimeExitBars);"]
        );
    }
}
