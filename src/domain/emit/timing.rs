//! Timing windows and market filters.
//!
//! These nodes contribute admission gates only. Gates are AND-ed in front of
//! the entry block whatever combinator the signal side uses.

use super::{EmitCx, Fragment, node_input};
use crate::domain::graph::Node;
use crate::domain::graph::node::{CustomTimesData, MaxSpreadData, TimeWindow, TradingSessionData};
use crate::domain::program::InputType;

const WINDOW_HELPER: &str = "bool IsWithinWindow(int startHour, int startMinute, int endHour, int endMinute)
{
   MqlDateTime now;
   TimeToStruct(TimeCurrent(), now);
   int current = now.hour * 60 + now.min;
   int start = startHour * 60 + startMinute;
   int end = endHour * 60 + endMinute;
   if(start == end) return true;
   if(start < end) return current >= start && current < end;
   return current >= start || current < end;
}";

const WEEKDAY_HELPER: &str = "bool IsAllowedWeekday(int dayMask)
{
   MqlDateTime now;
   TimeToStruct(TimeCurrent(), now);
   return (dayMask & (1 << now.day_of_week)) != 0;
}";

fn window_inputs(
    cx: &mut EmitCx<'_>,
    frag: &mut Fragment,
    node: &Node,
    base: &str,
    window: TimeWindow,
) -> [String; 4] {
    let fields = [
        ("startHour", "StartHour", window.start_hour, "Start hour (server time)"),
        ("startMinute", "StartMinute", window.start_minute, "Start minute"),
        ("endHour", "EndHour", window.end_hour, "End hour (server time)"),
        ("endMinute", "EndMinute", window.end_minute, "End minute"),
    ];
    fields.map(|(field, suffix, value, comment)| {
        frag.input(
            cx.names,
            node_input(
                node,
                field,
                &format!("{}{}", base, suffix),
                InputType::Int,
                value.to_string(),
                comment,
            ),
        )
    })
}

fn check_window(cx: &mut EmitCx<'_>, node: &Node, window: &TimeWindow) -> TimeWindow {
    let valid = (0..24).contains(&window.start_hour)
        && (0..24).contains(&window.end_hour)
        && (0..60).contains(&window.start_minute)
        && (0..60).contains(&window.end_minute);
    if valid {
        return *window;
    }
    cx.diag.warn(
        Some(&node.id),
        format!(
            "time window {:02}:{:02}-{:02}:{:02} is out of range; values were clamped",
            window.start_hour, window.start_minute, window.end_hour, window.end_minute
        ),
    );
    TimeWindow {
        start_hour: window.start_hour.clamp(0, 23),
        start_minute: window.start_minute.clamp(0, 59),
        end_hour: window.end_hour.clamp(0, 23),
        end_minute: window.end_minute.clamp(0, 59),
    }
}

pub fn trading_session(cx: &mut EmitCx<'_>, node: &Node, d: &TradingSessionData) -> Fragment {
    let t = cx.graph.ordinal(&node.id);
    let mut frag = Fragment::new(format!("{} Session", d.session.label()));
    let [sh, sm, eh, em] = window_inputs(cx, &mut frag, node, &format!("InpTime{}", t), d.session.window());
    frag.helper("IsWithinWindow", WINDOW_HELPER);
    frag.gate(&format!("IsWithinWindow({}, {}, {}, {})", sh, sm, eh, em));
    frag
}

pub fn custom_times(cx: &mut EmitCx<'_>, node: &Node, d: &CustomTimesData) -> Fragment {
    let t = cx.graph.ordinal(&node.id);
    let mut frag = Fragment::new(format!("Trading Hours #{}", t + 1));

    let mut windows = Vec::new();
    for (w, window) in d.windows.iter().enumerate() {
        let window = check_window(cx, node, window);
        let base = if d.windows.len() == 1 {
            format!("InpTime{}", t)
        } else {
            format!("InpTime{}W{}", t, w + 1)
        };
        let [sh, sm, eh, em] = window_inputs(cx, &mut frag, node, &base, window);
        windows.push(format!("IsWithinWindow({}, {}, {}, {})", sh, sm, eh, em));
    }
    if !windows.is_empty() {
        frag.helper("IsWithinWindow", WINDOW_HELPER);
        frag.gate(&format!("({})", windows.join(" || ")));
    }

    let mask = d.days.mask();
    if mask == 0 {
        cx.diag.warn(Some(&node.id), "no trading days selected; entries are blocked every day");
    }
    if mask != 0b1111111 {
        let days = frag.input(
            cx.names,
            node_input(
                node,
                "days",
                &format!("InpTime{}DayMask", t),
                InputType::Int,
                mask.to_string(),
                "Allowed weekdays bit mask (bit 0 = Sunday)",
            ),
        );
        frag.helper("IsAllowedWeekday", WEEKDAY_HELPER);
        frag.gate(&format!("IsAllowedWeekday({})", days));
    }
    frag
}

pub fn max_spread(cx: &mut EmitCx<'_>, node: &Node, d: &MaxSpreadData) -> Fragment {
    let f = cx.graph.ordinal(&node.id);
    let mut frag = Fragment::new(format!("Spread Filter #{}", f + 1));
    let limit = if d.max_spread_points < 1 {
        cx.diag.warn(
            Some(&node.id),
            format!("max spread {} must be at least 1 point; using 1", d.max_spread_points),
        );
        1
    } else {
        d.max_spread_points
    };
    let input = frag.input(
        cx.names,
        node_input(
            node,
            "maxSpreadPoints",
            "InpMaxSpreadPoints",
            InputType::Int,
            limit.to_string(),
            "Maximum spread (points)",
        ),
    );
    frag.gate(&format!("SymbolInfoInteger($SYMBOL, SYMBOL_SPREAD) <= {}", input));
    frag
}
