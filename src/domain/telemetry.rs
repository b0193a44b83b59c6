//! Telemetry pass.
//!
//! Adds a heartbeat on a fixed interval and a trade report for every new
//! closing deal. Deal history is read from a trailing cursor, so each tick
//! only loads the deals since the previous scan. Everything is posted as flat JSON to the
//! configured base URL. Failed requests are printed and retried on the next
//! interval; nothing here can stop the trading logic.
//!
//! The pass only adds to a program. The tick hook goes in front of the
//! existing body so early exits in strategy code do not starve heartbeats.

use tracing::info;

use crate::domain::context::TelemetrySettings;
use crate::domain::error::EaforgeError;
use crate::domain::program::{Decl, DeclaredInput, Helper, InputType, Program, Stmt, quote};

pub const PASS: &str = "telemetry";

const GROUP: &str = "Telemetry";

const GLOBALS: [&str; 4] = [
    "telemetryEaName",
    "telemetryLastHeartbeat",
    "telemetryLastDealCheck",
    "telemetryLastDeal",
];

const TELEMETRY_ESCAPE: &str = r#"string TelemetryEscape(string value)
{
   string escaped = value;
   StringReplace(escaped, "\\", "\\\\");
   StringReplace(escaped, "\"", "\\\"");
   return(escaped);
}"#;

const TELEMETRY_POST: &str = r#"bool TelemetryPost(string path, string body)
{
   if(StringLen(InpTelemetryUrl) == 0) return(false);
   if(MQLInfoInteger(MQL_TESTER)) return(false);
   char data[];
   char result[];
   string resultHeaders;
   int len = StringToCharArray(body, data, 0, WHOLE_ARRAY, CP_UTF8);
   if(len > 0) ArrayResize(data, len - 1);
   string headers = "Content-Type: application/json\r\nX-API-Key: " + InpTelemetryKey + "\r\n";
   ResetLastError();
   int status = WebRequest("POST", InpTelemetryUrl + path, headers, 5000, data, result, resultHeaders);
   if(status == -1)
   {
      Print("Telemetry POST ", path, " failed, error ", GetLastError());
      return(false);
   }
   if(status < 200 || status >= 300)
   {
      Print("Telemetry POST ", path, " returned HTTP ", status);
      return(false);
   }
   return(true);
}"#;

const TELEMETRY_OPEN_TRADES: &str = r#"int TelemetryOpenTrades()
{
   int count = 0;
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) == InpMagicNumber) count++;
   }
   return(count);
}"#;

const TELEMETRY_IS_CLOSING_DEAL: &str = r#"bool TelemetryIsClosingDeal(ulong deal)
{
   if(HistoryDealGetInteger(deal, DEAL_MAGIC) != InpMagicNumber) return(false);
   long entry = HistoryDealGetInteger(deal, DEAL_ENTRY);
   return(entry == DEAL_ENTRY_OUT || entry == DEAL_ENTRY_INOUT || entry == DEAL_ENTRY_OUT_BY);
}"#;

const TELEMETRY_SCAN_DEALS: &str = r#"void TelemetryScanDeals(bool report)
{
   datetime now = TimeCurrent();
   if(!HistorySelect(telemetryLastDealCheck, now + 60)) return;
   int total = HistoryDealsTotal();
   for(int i = 0; i < total; i++)
   {
      ulong deal = HistoryDealGetTicket(i);
      if(deal == 0 || deal <= telemetryLastDeal) continue;
      if(!TelemetryIsClosingDeal(deal)) continue;
      telemetryLastDeal = deal;
      if(report) TelemetryReportDeal(deal);
   }
   telemetryLastDealCheck = now - 60;
}"#;

const TELEMETRY_HEARTBEAT_BODY: &str = r#"string TelemetryHeartbeatBody(string status)
{
   double balance = AccountInfoDouble(ACCOUNT_BALANCE);
   double equity = AccountInfoDouble(ACCOUNT_EQUITY);
   double drawdown = balance > 0.0 ? MathMax(0.0, (balance - equity) / balance * 100.0) : 0.0;
   return(StringFormat("{\"ea\":\"%s\",\"magic\":%I64d,\"status\":\"%s\",\"balance\":%.2f,\"equity\":%.2f,\"drawdownPercent\":%.2f,\"openTrades\":%d,\"time\":%I64d}",
      TelemetryEscape(telemetryEaName), InpMagicNumber, status, balance, equity, drawdown, TelemetryOpenTrades(), (long)TimeCurrent()));
}"#;

const TELEMETRY_REPORT_DEAL: &str = r#"void TelemetryReportDeal(ulong deal)
{
   double profit = HistoryDealGetDouble(deal, DEAL_PROFIT) + HistoryDealGetDouble(deal, DEAL_SWAP) + HistoryDealGetDouble(deal, DEAL_COMMISSION);
   string body = StringFormat("{\"ea\":\"%s\",\"magic\":%I64d,\"deal\":%I64u,\"position\":%I64d,\"symbol\":\"%s\",\"volume\":%.2f,\"price\":%.5f,\"profit\":%.2f,\"time\":%I64d}",
      TelemetryEscape(telemetryEaName), InpMagicNumber, deal, HistoryDealGetInteger(deal, DEAL_POSITION_ID),
      HistoryDealGetString(deal, DEAL_SYMBOL), HistoryDealGetDouble(deal, DEAL_VOLUME),
      HistoryDealGetDouble(deal, DEAL_PRICE), profit, HistoryDealGetInteger(deal, DEAL_TIME));
   TelemetryPost("/trade", body);
}"#;

const TELEMETRY_REPORT_ERROR: &str = r#"void TelemetryReportError(string message)
{
   string body = StringFormat("{\"ea\":\"%s\",\"magic\":%I64d,\"error\":\"%s\",\"time\":%I64d}",
      TelemetryEscape(telemetryEaName), InpMagicNumber, TelemetryEscape(message), (long)TimeCurrent());
   TelemetryPost("/error", body);
}"#;

const TELEMETRY_TICK: &str = r#"void TelemetryTick()
{
   datetime now = TimeCurrent();
   if(now - telemetryLastHeartbeat >= InpHeartbeatSeconds)
   {
      telemetryLastHeartbeat = now;
      TelemetryPost("/heartbeat", TelemetryHeartbeatBody("running"));
   }
   TelemetryScanDeals(true);
}"#;

/// Inject telemetry into `program`.
pub fn apply(mut program: Program, settings: &TelemetrySettings) -> Result<Program, EaforgeError> {
    if program.passes().telemetry {
        return Err(EaforgeError::TransformReapplied { pass: PASS });
    }
    let url = settings.base_url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(EaforgeError::InvalidSettings {
            reason: "telemetry needs a base url".to_string(),
        });
    }

    program.push_input(
        DeclaredInput::new("InpTelemetryUrl", InputType::String, quote(url), "Telemetry base URL")
            .in_group(GROUP),
    );
    program.push_input(
        DeclaredInput::new(
            "InpTelemetryKey",
            InputType::String,
            quote(&settings.api_key),
            "Telemetry API key",
        )
        .in_group(GROUP),
    );
    program.push_input(
        DeclaredInput::new(
            "InpHeartbeatSeconds",
            InputType::Int,
            settings.heartbeat_seconds.to_string(),
            "Seconds between heartbeats",
        )
        .in_group(GROUP),
    );

    let ea_name = quote(program.name());
    let names = program.names_mut();
    for name in ["InpTelemetryUrl", "InpTelemetryKey", "InpHeartbeatSeconds"]
        .into_iter()
        .chain(GLOBALS)
    {
        names.reserve(name);
    }
    program.push_global(Decl::plain(format!("string telemetryEaName = {};", ea_name)));
    program.push_global(Decl::plain("datetime telemetryLastHeartbeat = 0;"));
    program.push_global(Decl::plain("datetime telemetryLastDealCheck = 0;"));
    program.push_global(Decl::plain("ulong telemetryLastDeal = 0;"));

    program.push_init(Stmt::plain(0, "TelemetryScanDeals(false);"));
    program.push_init(Stmt::plain(0, "telemetryLastHeartbeat = TimeCurrent();"));
    program.push_init(Stmt::plain(
        0,
        "TelemetryPost(\"/heartbeat\", TelemetryHeartbeatBody(\"started\"));",
    ));

    program.prepend_tick(Stmt::plain(0, "TelemetryTick();"));

    program.push_teardown(Stmt::plain(
        0,
        "if(reason == REASON_INITFAILED) TelemetryReportError(\"initialization failed\");",
    ));
    program.push_teardown(Stmt::plain(
        0,
        "TelemetryPost(\"/heartbeat\", TelemetryHeartbeatBody(\"stopped\"));",
    ));

    for (name, body) in [
        ("TelemetryEscape", TELEMETRY_ESCAPE),
        ("TelemetryPost", TELEMETRY_POST),
        ("TelemetryOpenTrades", TELEMETRY_OPEN_TRADES),
        ("TelemetryIsClosingDeal", TELEMETRY_IS_CLOSING_DEAL),
        ("TelemetryHeartbeatBody", TELEMETRY_HEARTBEAT_BODY),
        ("TelemetryReportDeal", TELEMETRY_REPORT_DEAL),
        ("TelemetryScanDeals", TELEMETRY_SCAN_DEALS),
        ("TelemetryReportError", TELEMETRY_REPORT_ERROR),
        ("TelemetryTick", TELEMETRY_TICK),
    ] {
        program.push_helper(Helper::new(name, body));
    }

    program.passes_mut().telemetry = true;
    info!(url, heartbeat = settings.heartbeat_seconds, "telemetry injected");
    Ok(program)
}
