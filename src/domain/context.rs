//! Generation context: everything about the output that is not a node.
//!
//! A graph document carries these values under `settings`. An INI file given
//! on the command line overrides them key by key.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Every condition fragment on a side must hold.
    #[default]
    All,
    /// Any single condition fragment on a side is enough.
    Any,
}

impl Combinator {
    pub fn operator(self) -> &'static str {
        match self {
            Combinator::All => "&&",
            Combinator::Any => "||",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Some(Combinator::All),
            "any" | "or" => Some(Combinator::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionLimits {
    pub max_open_trades: i64,
    pub max_buy_positions: i64,
    pub max_sell_positions: i64,
}

impl Default for PositionLimits {
    fn default() -> Self {
        Self {
            max_open_trades: 1,
            max_buy_positions: 1,
            max_sell_positions: 1,
        }
    }
}

/// Account-level guards. A value of zero disables the guard.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskSettings {
    pub max_daily_loss_percent: f64,
    pub max_drawdown_percent: f64,
}

impl RiskSettings {
    pub fn daily_loss_enabled(&self) -> bool {
        self.max_daily_loss_percent > 0.0
    }

    pub fn drawdown_enabled(&self) -> bool {
        self.max_drawdown_percent > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntrySettings {
    pub combinator: Combinator,
    pub one_trade_per_bar: bool,
    pub one_trade_per_day: bool,
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            combinator: Combinator::All,
            one_trade_per_bar: true,
            one_trade_per_day: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiPairSettings {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    pub base_url: String,
    pub api_key: String,
    pub heartbeat_seconds: i64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            heartbeat_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackRecordSettings {
    pub base_url: String,
    pub api_key: String,
    pub instance_id: String,
    pub snapshot_minutes: i64,
}

impl Default for TrackRecordSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            instance_id: String::new(),
            snapshot_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationContext {
    pub ea_name: String,
    pub magic_number: i64,
    pub order_comment: String,
    pub slippage_points: i64,
    pub limits: PositionLimits,
    pub risk: RiskSettings,
    pub entry: EntrySettings,
    pub multi_pair: Option<MultiPairSettings>,
    pub telemetry: Option<TelemetrySettings>,
    pub track_record: Option<TrackRecordSettings>,
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self {
            ea_name: "GeneratedEA".to_string(),
            magic_number: 123456,
            order_comment: "eaforge".to_string(),
            slippage_points: 10,
            limits: PositionLimits::default(),
            risk: RiskSettings::default(),
            entry: EntrySettings::default(),
            multi_pair: None,
            telemetry: None,
            track_record: None,
        }
    }
}

impl GenerationContext {
    pub fn is_multi_pair(&self) -> bool {
        self.multi_pair.is_some()
    }
}
