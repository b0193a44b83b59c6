//! Entry nodes: order sizing and order type per side.
//!
//! The orders themselves are placed by the entry-logic synthesizer; this
//! emitter declares the inputs and helpers and returns an [`EntryPlan`].

use super::{EmitCx, Emitted, EntryPlan, Fragment, Outcome, Side, node_input};
use crate::domain::graph::Node;
use crate::domain::graph::node::{EntryData, LotSizing, OrderType};
use crate::domain::program::{InputType, fmt_f64};

/// Smallest lot size an entry node may default to.
pub const MIN_LOTS: f64 = 0.01;

pub const OPEN_POSITION: &str = "bool OpenPosition(ENUM_ORDER_TYPE type, double lots, double slPoints, double tpPoints)
{
   double point = $POINT;
   int digits = $DIGITS;
   bool isBuy = (type == ORDER_TYPE_BUY);
   double price = isBuy ? SymbolInfoDouble($SYMBOL, SYMBOL_ASK) : SymbolInfoDouble($SYMBOL, SYMBOL_BID);
   double sl = 0.0;
   double tp = 0.0;
   if(slPoints > 0.0) sl = NormalizeDouble(isBuy ? price - slPoints * point : price + slPoints * point, digits);
   if(tpPoints > 0.0) tp = NormalizeDouble(isBuy ? price + tpPoints * point : price - tpPoints * point, digits);
   if(!trade.PositionOpen($SYMBOL, type, lots, price, sl, tp, InpTradeComment))
   {
      Print(\"Order failed on \", $SYMBOL, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
      return false;
   }
   return true;
}";

pub const PLACE_PENDING_AT: &str = "bool PlacePendingAt(ENUM_ORDER_TYPE type, double price, double lots, double sl, double tp, int expiryBars)
{
   ENUM_ORDER_TYPE_TIME timeType = expiryBars > 0 ? ORDER_TIME_SPECIFIED : ORDER_TIME_GTC;
   datetime expiry = expiryBars > 0 ? TimeCurrent() + expiryBars * PeriodSeconds(PERIOD_CURRENT) : (datetime)0;
   for(int i = OrdersTotal() - 1; i >= 0; i--)
   {
      ulong ticket = OrderGetTicket(i);
      if(ticket == 0) continue;
      if(OrderGetInteger(ORDER_MAGIC) != InpMagicNumber) continue;
      if(OrderGetString(ORDER_SYMBOL) != $SYMBOL) continue;
      if((ENUM_ORDER_TYPE)OrderGetInteger(ORDER_TYPE) != type) continue;
      if(MathAbs(OrderGetDouble(ORDER_PRICE_OPEN) - price) < $POINT / 2.0) return true;
      if(!trade.OrderModify(ticket, price, sl, tp, timeType, expiry))
      {
         Print(\"Pending order update failed on \", $SYMBOL, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
         return false;
      }
      return true;
   }
   if(!trade.OrderOpen($SYMBOL, type, lots, 0.0, price, sl, tp, timeType, expiry, InpTradeComment))
   {
      Print(\"Pending order failed on \", $SYMBOL, \": \", trade.ResultRetcode(), \" \", trade.ResultRetcodeDescription());
      return false;
   }
   return true;
}";

pub const PLACE_OR_REFRESH_PENDING: &str = "bool PlaceOrRefreshPending(ENUM_ORDER_TYPE type, double price, double lots, double slPoints, double tpPoints, int expiryBars)
{
   double point = $POINT;
   int digits = $DIGITS;
   bool isBuy = (type == ORDER_TYPE_BUY_STOP || type == ORDER_TYPE_BUY_LIMIT);
   price = NormalizeDouble(price, digits);
   double sl = 0.0;
   double tp = 0.0;
   if(slPoints > 0.0) sl = NormalizeDouble(isBuy ? price - slPoints * point : price + slPoints * point, digits);
   if(tpPoints > 0.0) tp = NormalizeDouble(isBuy ? price + tpPoints * point : price - tpPoints * point, digits);
   return PlacePendingAt(type, price, lots, sl, tp, expiryBars);
}";

pub const CALCULATE_RISK_LOTS: &str = "double CalculateRiskLots(double riskPercent, double slPoints)
{
   double minLot = SymbolInfoDouble($SYMBOL, SYMBOL_VOLUME_MIN);
   if(slPoints <= 0.0) return minLot;
   double tickValue = SymbolInfoDouble($SYMBOL, SYMBOL_TRADE_TICK_VALUE);
   double tickSize = SymbolInfoDouble($SYMBOL, SYMBOL_TRADE_TICK_SIZE);
   if(tickValue <= 0.0 || tickSize <= 0.0) return minLot;
   double riskMoney = AccountInfoDouble(ACCOUNT_BALANCE) * riskPercent / 100.0;
   double lossPerLot = slPoints * $POINT / tickSize * tickValue;
   if(lossPerLot <= 0.0) return minLot;
   return NormalizeLots(riskMoney / lossPerLot);
}";

pub fn place_order(cx: &mut EmitCx<'_>, node: &Node, d: &EntryData, side: Side) -> Emitted {
    let label = side.label();
    let mut frag = Fragment::new(format!("{} Entry", label));

    let lots = match &d.sizing {
        LotSizing::FixedLot { lots } => {
            let lots = if *lots >= MIN_LOTS {
                *lots
            } else {
                cx.diag.warn(
                    Some(&node.id),
                    format!("lot size {} is below {}; using {}", lots, MIN_LOTS, MIN_LOTS),
                );
                MIN_LOTS
            };
            let input = frag.input(
                cx.names,
                node_input(
                    node,
                    "lots",
                    &format!("Inp{}LotSize", label),
                    InputType::Double,
                    fmt_f64(lots),
                    "Lot size",
                ),
            );
            format!("NormalizeLots({})", input)
        }
        LotSizing::RiskPercent { percent } => {
            let input = frag.input(
                cx.names,
                node_input(
                    node,
                    "percent",
                    &format!("Inp{}RiskPercent", label),
                    InputType::Double,
                    fmt_f64(*percent),
                    "Risk per trade (% of balance)",
                ),
            );
            let distance = match &cx.plans.stop_loss {
                Some(plan) => plan.distance(side).to_string(),
                None => {
                    cx.diag.warn(
                        Some(&node.id),
                        "risk-percent sizing without a stop loss trades the minimum lot",
                    );
                    "0.0".to_string()
                }
            };
            frag.helper("CalculateRiskLots", CALCULATE_RISK_LOTS);
            format!("CalculateRiskLots({}, {})", input, distance)
        }
    };

    let (offset_input, expiry_input) = match d.order_type {
        OrderType::Market => {
            frag.helper("OpenPosition", OPEN_POSITION);
            (None, None)
        }
        OrderType::Stop | OrderType::Limit => {
            let offset = frag.input(
                cx.names,
                node_input(
                    node,
                    "pendingOffsetPips",
                    &format!("Inp{}PendingOffsetPips", label),
                    InputType::Double,
                    fmt_f64(d.pending_offset_pips.max(0.0)),
                    "Pending order distance from price (pips)",
                ),
            );
            let expiry = frag.input(
                cx.names,
                node_input(
                    node,
                    "expiryBars",
                    &format!("Inp{}ExpiryBars", label),
                    InputType::Int,
                    d.expiry_bars.max(0).to_string(),
                    "Pending order lifetime in bars (0 = until cancelled)",
                ),
            );
            frag.helper("PlacePendingAt", PLACE_PENDING_AT);
            frag.helper("PlaceOrRefreshPending", PLACE_OR_REFRESH_PENDING);
            (Some(offset), Some(expiry))
        }
    };

    Emitted {
        fragment: frag,
        outcome: Outcome::Entry(EntryPlan {
            node_id: node.id.clone(),
            side,
            lots,
            order_type: d.order_type,
            offset_input,
            expiry_input,
        }),
    }
}
