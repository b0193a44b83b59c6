//! Typed node payloads.
//!
//! Every node `type` string in a graph document maps to exactly one
//! [`NodeData`] variant. Emitters match on `NodeData` without a wildcard arm,
//! so adding a variant fails the build until every emitter handles it.

use serde::Deserialize;
use std::fmt;

/// Whether a node evaluates on every tick or on the last confirmed bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalMode {
    EveryTick,
    #[default]
    CandleClose,
}

impl SignalMode {
    /// Buffer offset applied to every index a node reads.
    pub fn shift(self) -> usize {
        match self {
            SignalMode::EveryTick => 0,
            SignalMode::CandleClose => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Current,
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    Mn1,
}

impl Timeframe {
    pub fn mql(self) -> &'static str {
        match self {
            Timeframe::Current => "PERIOD_CURRENT",
            Timeframe::M1 => "PERIOD_M1",
            Timeframe::M5 => "PERIOD_M5",
            Timeframe::M15 => "PERIOD_M15",
            Timeframe::M30 => "PERIOD_M30",
            Timeframe::H1 => "PERIOD_H1",
            Timeframe::H4 => "PERIOD_H4",
            Timeframe::D1 => "PERIOD_D1",
            Timeframe::W1 => "PERIOD_W1",
            Timeframe::Mn1 => "PERIOD_MN1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaMethod {
    #[default]
    Sma,
    Ema,
    Smma,
    Lwma,
}

impl MaMethod {
    pub fn mql(self) -> &'static str {
        match self {
            MaMethod::Sma => "MODE_SMA",
            MaMethod::Ema => "MODE_EMA",
            MaMethod::Smma => "MODE_SMMA",
            MaMethod::Lwma => "MODE_LWMA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliedPrice {
    #[default]
    Close,
    Open,
    High,
    Low,
    Median,
    Typical,
    Weighted,
}

impl AppliedPrice {
    pub fn mql(self) -> &'static str {
        match self {
            AppliedPrice::Close => "PRICE_CLOSE",
            AppliedPrice::Open => "PRICE_OPEN",
            AppliedPrice::High => "PRICE_HIGH",
            AppliedPrice::Low => "PRICE_LOW",
            AppliedPrice::Median => "PRICE_MEDIAN",
            AppliedPrice::Typical => "PRICE_TYPICAL",
            AppliedPrice::Weighted => "PRICE_WEIGHTED",
        }
    }
}

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovingAverageData {
    pub period: i32,
    pub method: MaMethod,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for MovingAverageData {
    fn default() -> Self {
        Self {
            period: 20,
            method: MaMethod::Sma,
            applied_price: AppliedPrice::Close,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaCrossoverData {
    pub fast_period: i32,
    pub slow_period: i32,
    pub method: MaMethod,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for MaCrossoverData {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 50,
            method: MaMethod::Ema,
            applied_price: AppliedPrice::Close,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RsiData {
    pub period: i32,
    pub overbought: f64,
    pub oversold: f64,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for RsiData {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
            applied_price: AppliedPrice::Close,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MacdData {
    pub fast_period: i32,
    pub slow_period: i32,
    pub signal_period: i32,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for MacdData {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            applied_price: AppliedPrice::Close,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BollingerData {
    pub period: i32,
    pub deviation: f64,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for BollingerData {
    fn default() -> Self {
        Self {
            period: 20,
            deviation: 2.0,
            applied_price: AppliedPrice::Close,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtrData {
    pub period: i32,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for AtrData {
    fn default() -> Self {
        Self {
            period: 14,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdxData {
    pub period: i32,
    pub trend_level: f64,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for AdxData {
    fn default() -> Self {
        Self {
            period: 14,
            trend_level: 25.0,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StochasticData {
    pub k_period: i32,
    pub d_period: i32,
    pub slowing: i32,
    pub overbought: f64,
    pub oversold: f64,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for StochasticData {
    fn default() -> Self {
        Self {
            k_period: 5,
            d_period: 3,
            slowing: 3,
            overbought: 80.0,
            oversold: 20.0,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CciData {
    pub period: i32,
    pub overbought: f64,
    pub oversold: f64,
    pub applied_price: AppliedPrice,
    pub timeframe: Timeframe,
    pub signal_mode: SignalMode,
}

impl Default for CciData {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 100.0,
            oversold: -100.0,
            applied_price: AppliedPrice::Typical,
            timeframe: Timeframe::Current,
            signal_mode: SignalMode::CandleClose,
        }
    }
}

// ---------------------------------------------------------------------------
// Price action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakoutEntryMode {
    #[default]
    Market,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RangeBreakoutData {
    pub lookback_bars: i32,
    pub buffer_pips: f64,
    pub entry_mode: BreakoutEntryMode,
    pub timeframe: Timeframe,
}

impl Default for RangeBreakoutData {
    fn default() -> Self {
        Self {
            lookback_bars: 20,
            buffer_pips: 2.0,
            entry_mode: BreakoutEntryMode::Market,
            timeframe: Timeframe::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
}

impl CandlePattern {
    pub fn is_bullish(self) -> bool {
        matches!(self, CandlePattern::BullishEngulfing | CandlePattern::Hammer)
    }

    /// Name of the shared detection helper in the generated program.
    pub fn helper_name(self) -> &'static str {
        match self {
            CandlePattern::BullishEngulfing => "IsBullishEngulfing",
            CandlePattern::BearishEngulfing => "IsBearishEngulfing",
            CandlePattern::Hammer => "IsHammer",
            CandlePattern::ShootingStar => "IsShootingStar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandlestickData {
    pub patterns: Vec<CandlePattern>,
    pub timeframe: Timeframe,
}

impl Default for CandlestickData {
    fn default() -> Self {
        Self {
            patterns: vec![CandlePattern::BullishEngulfing, CandlePattern::BearishEngulfing],
            timeframe: Timeframe::Current,
        }
    }
}

// ---------------------------------------------------------------------------
// Timing and filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Session {
    #[default]
    London,
    NewYork,
    Tokyo,
    Sydney,
    LondonNyOverlap,
}

impl Session {
    /// Server-time window as `(start_hour, start_minute, end_hour, end_minute)`.
    pub fn window(self) -> TimeWindow {
        let (start_hour, end_hour) = match self {
            Session::London => (8, 17),
            Session::NewYork => (13, 22),
            Session::Tokyo => (0, 9),
            Session::Sydney => (22, 7),
            Session::LondonNyOverlap => (13, 17),
        };
        TimeWindow {
            start_hour,
            start_minute: 0,
            end_hour,
            end_minute: 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Session::London => "London",
            Session::NewYork => "New York",
            Session::Tokyo => "Tokyo",
            Session::Sydney => "Sydney",
            Session::LondonNyOverlap => "London/New York overlap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TradingSessionData {
    pub session: Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeWindow {
    pub start_hour: i32,
    pub start_minute: i32,
    pub end_hour: i32,
    pub end_minute: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weekdays {
    pub sunday: bool,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
}

impl Default for Weekdays {
    fn default() -> Self {
        Self {
            sunday: false,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
        }
    }
}

impl Weekdays {
    /// Bit mask with bit 0 = Sunday, matching `MqlDateTime::day_of_week`.
    pub fn mask(&self) -> u32 {
        [
            self.sunday,
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
        ]
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .fold(0, |mask, (bit, _)| mask | (1 << bit))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomTimesData {
    pub windows: Vec<TimeWindow>,
    pub days: Weekdays,
}

impl Default for CustomTimesData {
    fn default() -> Self {
        Self {
            windows: vec![TimeWindow {
                start_hour: 8,
                start_minute: 0,
                end_hour: 17,
                end_minute: 0,
            }],
            days: Weekdays::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaxSpreadData {
    pub max_spread_points: i32,
}

impl Default for MaxSpreadData {
    fn default() -> Self {
        Self {
            max_spread_points: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum LotSizing {
    FixedLot {
        #[serde(default = "default_lots")]
        lots: f64,
    },
    RiskPercent {
        #[serde(default = "default_risk_percent")]
        percent: f64,
    },
}

fn default_lots() -> f64 {
    0.1
}

fn default_risk_percent() -> f64 {
    1.0
}

impl Default for LotSizing {
    fn default() -> Self {
        LotSizing::FixedLot { lots: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    #[default]
    Market,
    Stop,
    Limit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryData {
    pub sizing: LotSizing,
    pub order_type: OrderType,
    pub pending_offset_pips: f64,
    pub expiry_bars: i32,
}

impl Default for EntryData {
    fn default() -> Self {
        Self {
            sizing: LotSizing::default(),
            order_type: OrderType::Market,
            pending_offset_pips: 10.0,
            expiry_bars: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StopLossData {
    Fixed {
        #[serde(default = "default_sl_pips")]
        pips: f64,
    },
    Percent {
        #[serde(default = "default_sl_percent")]
        percent: f64,
    },
    Atr {
        #[serde(default = "default_atr_period")]
        period: i32,
        #[serde(default = "default_atr_multiplier")]
        multiplier: f64,
    },
    RangeOpposite {
        #[serde(default)]
        buffer_pips: f64,
    },
    Indicator {
        #[serde(default)]
        indicator_node_id: Option<String>,
        #[serde(default)]
        buffer_pips: f64,
    },
}

fn default_sl_pips() -> f64 {
    50.0
}

fn default_sl_percent() -> f64 {
    1.0
}

fn default_atr_period() -> i32 {
    14
}

fn default_atr_multiplier() -> f64 {
    1.5
}

fn default_rr() -> f64 {
    2.0
}

fn default_tp_pips() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TakeProfitData {
    Fixed {
        #[serde(default = "default_tp_pips")]
        pips: f64,
    },
    RiskReward {
        #[serde(default = "default_rr")]
        ratio: f64,
    },
    Atr {
        #[serde(default = "default_atr_period")]
        period: i32,
        #[serde(default = "default_rr")]
        multiplier: f64,
    },
}

// ---------------------------------------------------------------------------
// Trade management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakevenData {
    pub trigger_pips: f64,
    pub lock_pips: f64,
}

impl Default for BreakevenData {
    fn default() -> Self {
        Self {
            trigger_pips: 20.0,
            lock_pips: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TrailingStopData {
    Fixed {
        #[serde(default = "default_trail_pips")]
        trail_pips: f64,
        #[serde(default = "default_trail_pips")]
        start_pips: f64,
        #[serde(default = "default_step_pips")]
        step_pips: f64,
    },
    Atr {
        #[serde(default = "default_atr_period")]
        period: i32,
        #[serde(default = "default_rr")]
        multiplier: f64,
    },
}

fn default_trail_pips() -> f64 {
    20.0
}

fn default_step_pips() -> f64 {
    5.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialCloseData {
    pub trigger_pips: f64,
    pub close_percent: f64,
}

impl Default for PartialCloseData {
    fn default() -> Self {
        Self {
            trigger_pips: 30.0,
            close_percent: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockProfitData {
    pub trigger_pips: f64,
    pub lock_percent: f64,
}

impl Default for LockProfitData {
    fn default() -> Self {
        Self {
            trigger_pips: 40.0,
            lock_percent: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpLevel {
    pub pips: f64,
    pub close_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiLevelTpData {
    pub levels: Vec<TpLevel>,
}

impl Default for MultiLevelTpData {
    fn default() -> Self {
        Self {
            levels: vec![
                TpLevel {
                    pips: 20.0,
                    close_percent: 33.0,
                },
                TpLevel {
                    pips: 40.0,
                    close_percent: 50.0,
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Grid / pyramid and exits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridMode {
    #[default]
    Grid,
    Pyramid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridDirection {
    Buy,
    Sell,
    #[default]
    Both,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridPyramidData {
    pub mode: GridMode,
    pub spacing_pips: f64,
    pub max_levels: i32,
    pub lot_multiplier: f64,
    pub direction: GridDirection,
}

impl Default for GridPyramidData {
    fn default() -> Self {
        Self {
            mode: GridMode::Grid,
            spacing_pips: 20.0,
            max_levels: 5,
            lot_multiplier: 1.0,
            direction: GridDirection::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeExitData {
    pub close_after_bars: i32,
}

impl Default for TimeExitData {
    fn default() -> Self {
        Self {
            close_after_bars: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// The closed union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Indicator,
    PriceAction,
    Timing,
    Filter,
    Entry,
    Risk,
    Management,
    Grid,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    MovingAverage(MovingAverageData),
    MaCrossover(MaCrossoverData),
    Rsi(RsiData),
    Macd(MacdData),
    BollingerBands(BollingerData),
    Atr(AtrData),
    Adx(AdxData),
    Stochastic(StochasticData),
    Cci(CciData),
    RangeBreakout(RangeBreakoutData),
    CandlestickPattern(CandlestickData),
    TradingSession(TradingSessionData),
    CustomTimes(CustomTimesData),
    MaxSpread(MaxSpreadData),
    PlaceBuy(EntryData),
    PlaceSell(EntryData),
    StopLoss(StopLossData),
    TakeProfit(TakeProfitData),
    BreakevenStop(BreakevenData),
    TrailingStop(TrailingStopData),
    PartialClose(PartialCloseData),
    LockProfit(LockProfitData),
    MultiLevelTp(MultiLevelTpData),
    GridPyramid(GridPyramidData),
    TimeExit(TimeExitData),
    OppositeSignalExit,
}

impl NodeData {
    /// Decode a node payload for the given document `type` string.
    ///
    /// Returns `Ok(None)` for a type outside the closed set.
    pub fn parse(
        node_type: &str,
        data: serde_json::Value,
    ) -> Result<Option<NodeData>, serde_json::Error> {
        // Absent payloads fall back to each type's defaults.
        let data = if data.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            data
        };
        let node = match node_type {
            "moving-average" => NodeData::MovingAverage(serde_json::from_value(data)?),
            "ma-crossover" => NodeData::MaCrossover(serde_json::from_value(data)?),
            "rsi" => NodeData::Rsi(serde_json::from_value(data)?),
            "macd" => NodeData::Macd(serde_json::from_value(data)?),
            "bollinger-bands" => NodeData::BollingerBands(serde_json::from_value(data)?),
            "atr" => NodeData::Atr(serde_json::from_value(data)?),
            "adx" => NodeData::Adx(serde_json::from_value(data)?),
            "stochastic" => NodeData::Stochastic(serde_json::from_value(data)?),
            "cci" => NodeData::Cci(serde_json::from_value(data)?),
            "range-breakout" => NodeData::RangeBreakout(serde_json::from_value(data)?),
            "candlestick-pattern" => NodeData::CandlestickPattern(serde_json::from_value(data)?),
            "trading-session" => NodeData::TradingSession(serde_json::from_value(data)?),
            "custom-times" => NodeData::CustomTimes(serde_json::from_value(data)?),
            "max-spread" => NodeData::MaxSpread(serde_json::from_value(data)?),
            "place-buy" => NodeData::PlaceBuy(serde_json::from_value(data)?),
            "place-sell" => NodeData::PlaceSell(serde_json::from_value(data)?),
            "stop-loss" => NodeData::StopLoss(serde_json::from_value(data)?),
            "take-profit" => NodeData::TakeProfit(serde_json::from_value(data)?),
            "breakeven-stop" => NodeData::BreakevenStop(serde_json::from_value(data)?),
            "trailing-stop" => NodeData::TrailingStop(serde_json::from_value(data)?),
            "partial-close" => NodeData::PartialClose(serde_json::from_value(data)?),
            "lock-profit" => NodeData::LockProfit(serde_json::from_value(data)?),
            "multi-level-tp" => NodeData::MultiLevelTp(serde_json::from_value(data)?),
            "grid-pyramid" => NodeData::GridPyramid(serde_json::from_value(data)?),
            "time-exit" => NodeData::TimeExit(serde_json::from_value(data)?),
            "opposite-signal-exit" => NodeData::OppositeSignalExit,
            _ => return Ok(None),
        };
        Ok(Some(node))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeData::MovingAverage(_) => "moving-average",
            NodeData::MaCrossover(_) => "ma-crossover",
            NodeData::Rsi(_) => "rsi",
            NodeData::Macd(_) => "macd",
            NodeData::BollingerBands(_) => "bollinger-bands",
            NodeData::Atr(_) => "atr",
            NodeData::Adx(_) => "adx",
            NodeData::Stochastic(_) => "stochastic",
            NodeData::Cci(_) => "cci",
            NodeData::RangeBreakout(_) => "range-breakout",
            NodeData::CandlestickPattern(_) => "candlestick-pattern",
            NodeData::TradingSession(_) => "trading-session",
            NodeData::CustomTimes(_) => "custom-times",
            NodeData::MaxSpread(_) => "max-spread",
            NodeData::PlaceBuy(_) => "place-buy",
            NodeData::PlaceSell(_) => "place-sell",
            NodeData::StopLoss(_) => "stop-loss",
            NodeData::TakeProfit(_) => "take-profit",
            NodeData::BreakevenStop(_) => "breakeven-stop",
            NodeData::TrailingStop(_) => "trailing-stop",
            NodeData::PartialClose(_) => "partial-close",
            NodeData::LockProfit(_) => "lock-profit",
            NodeData::MultiLevelTp(_) => "multi-level-tp",
            NodeData::GridPyramid(_) => "grid-pyramid",
            NodeData::TimeExit(_) => "time-exit",
            NodeData::OppositeSignalExit => "opposite-signal-exit",
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeData::MovingAverage(_)
            | NodeData::MaCrossover(_)
            | NodeData::Rsi(_)
            | NodeData::Macd(_)
            | NodeData::BollingerBands(_)
            | NodeData::Atr(_)
            | NodeData::Adx(_)
            | NodeData::Stochastic(_)
            | NodeData::Cci(_) => NodeCategory::Indicator,
            NodeData::RangeBreakout(_) | NodeData::CandlestickPattern(_) => {
                NodeCategory::PriceAction
            }
            NodeData::TradingSession(_) | NodeData::CustomTimes(_) => NodeCategory::Timing,
            NodeData::MaxSpread(_) => NodeCategory::Filter,
            NodeData::PlaceBuy(_) | NodeData::PlaceSell(_) => NodeCategory::Entry,
            NodeData::StopLoss(_) | NodeData::TakeProfit(_) => NodeCategory::Risk,
            NodeData::BreakevenStop(_)
            | NodeData::TrailingStop(_)
            | NodeData::PartialClose(_)
            | NodeData::LockProfit(_)
            | NodeData::MultiLevelTp(_) => NodeCategory::Management,
            NodeData::GridPyramid(_) => NodeCategory::Grid,
            NodeData::TimeExit(_) | NodeData::OppositeSignalExit => NodeCategory::Exit,
        }
    }

    /// Explicit node reference stored on the payload, if the type carries one.
    pub fn explicit_reference(&self) -> Option<&str> {
        match self {
            NodeData::StopLoss(StopLossData::Indicator {
                indicator_node_id, ..
            }) => indicator_node_id.as_deref().filter(|id| !id.is_empty()),
            _ => None,
        }
    }

    /// Signal mode for node types that read indicator buffers.
    pub fn signal_mode(&self) -> Option<SignalMode> {
        match self {
            NodeData::MovingAverage(d) => Some(d.signal_mode),
            NodeData::MaCrossover(d) => Some(d.signal_mode),
            NodeData::Rsi(d) => Some(d.signal_mode),
            NodeData::Macd(d) => Some(d.signal_mode),
            NodeData::BollingerBands(d) => Some(d.signal_mode),
            NodeData::Atr(d) => Some(d.signal_mode),
            NodeData::Adx(d) => Some(d.signal_mode),
            NodeData::Stochastic(d) => Some(d.signal_mode),
            NodeData::Cci(d) => Some(d.signal_mode),
            _ => None,
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeCategory::Indicator => "indicator",
            NodeCategory::PriceAction => "price action",
            NodeCategory::Timing => "timing",
            NodeCategory::Filter => "filter",
            NodeCategory::Entry => "entry",
            NodeCategory::Risk => "risk",
            NodeCategory::Management => "trade management",
            NodeCategory::Grid => "grid",
            NodeCategory::Exit => "exit",
        };
        write!(f, "{}", name)
    }
}
