//! Grid and pyramid position adding.
//!
//! A grid adds a position each time price moves `spacing` against the most
//! recent one; a pyramid adds when price moves `spacing` in its favour.
//! Levels are counted per side and capped at `maxLevels` positions. Adds obey
//! the same entry gate and open-position ceiling as fresh entries, and carry
//! the stop distances of the newest position on that side.

use super::{EmitCx, Fragment, clamp_period, node_input};
use crate::domain::graph::Node;
use crate::domain::graph::node::{GridDirection, GridMode, GridPyramidData};
use crate::domain::program::{InputType, fmt_f64};

const MANAGE_GRID: &str = "void ManageGrid(ENUM_POSITION_TYPE side, double spacingPips, int maxLevels, double lotMultiplier, bool pyramid)
{
   int count = 0;
   double lastPrice = 0.0;
   double lastLots = 0.0;
   double lastSl = 0.0;
   double lastTp = 0.0;
   datetime lastTime = 0;
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      if(PositionGetString(POSITION_SYMBOL) != $SYMBOL) continue;
      if(PositionGetInteger(POSITION_TYPE) != side) continue;
      count++;
      datetime opened = (datetime)PositionGetInteger(POSITION_TIME);
      if(opened >= lastTime)
      {
         lastTime = opened;
         lastPrice = PositionGetDouble(POSITION_PRICE_OPEN);
         lastLots = PositionGetDouble(POSITION_VOLUME);
         lastSl = PositionGetDouble(POSITION_SL);
         lastTp = PositionGetDouble(POSITION_TP);
      }
   }
   if(count == 0 || count >= maxLevels) return;
   double spacing = spacingPips * $PIP * $POINT;
   bool isBuy = (side == POSITION_TYPE_BUY);
   double price = isBuy ? SymbolInfoDouble($SYMBOL, SYMBOL_ASK) : SymbolInfoDouble($SYMBOL, SYMBOL_BID);
   double moved = isBuy ? price - lastPrice : lastPrice - price;
   bool addLevel = pyramid ? moved >= spacing : -moved >= spacing;
   if(!addLevel) return;
   double lots = NormalizeLots(lastLots * lotMultiplier);
   ENUM_ORDER_TYPE type = isBuy ? ORDER_TYPE_BUY : ORDER_TYPE_SELL;
   double sl = lastSl > 0.0 ? NormalizeDouble(price + (lastSl - lastPrice), $DIGITS) : 0.0;
   double tp = lastTp > 0.0 ? NormalizeDouble(price + (lastTp - lastPrice), $DIGITS) : 0.0;
   if(!trade.PositionOpen($SYMBOL, type, lots, price, sl, tp, InpTradeComment))
      Print(\"Grid order failed on \", $SYMBOL, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
}";

pub fn grid_pyramid(cx: &mut EmitCx<'_>, node: &Node, d: &GridPyramidData) -> Fragment {
    let (label, pyramid) = match d.mode {
        GridMode::Grid => ("Grid", false),
        GridMode::Pyramid => ("Pyramid", true),
    };
    let mut frag = Fragment::new(label);

    let spacing = if d.spacing_pips > 0.0 {
        d.spacing_pips
    } else {
        cx.diag.warn(
            Some(&node.id),
            format!("grid spacing {} must be positive; using 20", d.spacing_pips),
        );
        20.0
    };
    let multiplier = if d.lot_multiplier > 0.0 {
        d.lot_multiplier
    } else {
        cx.diag.warn(
            Some(&node.id),
            format!("lot multiplier {} must be positive; using 1.0", d.lot_multiplier),
        );
        1.0
    };
    let levels = clamp_period(cx.diag, node, "maxLevels", d.max_levels, 1);

    let spacing = frag.input(
        cx.names,
        node_input(node, "spacingPips", "InpGridSpacingPips", InputType::Double, fmt_f64(spacing), "Distance between levels (pips)"),
    );
    let levels = frag.input(
        cx.names,
        node_input(node, "maxLevels", "InpGridMaxLevels", InputType::Int, levels.to_string(), "Maximum positions per side"),
    );
    let multiplier = frag.input(
        cx.names,
        node_input(node, "lotMultiplier", "InpGridLotMultiplier", InputType::Double, fmt_f64(multiplier), "Lot multiplier per level"),
    );

    frag.helper("ManageGrid", MANAGE_GRID);
    let sides: &[&str] = match d.direction {
        GridDirection::Buy => &["POSITION_TYPE_BUY"],
        GridDirection::Sell => &["POSITION_TYPE_SELL"],
        GridDirection::Both => &["POSITION_TYPE_BUY", "POSITION_TYPE_SELL"],
    };
    frag.tick_line(0, "if(entryAllowed && CountPositions(-1) < InpMaxOpenTrades)");
    frag.tick_line(0, "{");
    for side in sides {
        frag.tick_line(
            1,
            &format!(
                "ManageGrid({}, {}, {}, {}, {});",
                side, spacing, levels, multiplier, pyramid
            ),
        );
    }
    frag.tick_line(0, "}");
    frag
}
