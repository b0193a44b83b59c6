//! Track-record pass and ledger.
//!
//! [`apply`] injects an event-sourced, hash-chained ledger into a program.
//! The generated code diffs the open position set every tick, reports
//! opens, closes, partial closes and stop changes, takes periodic equity
//! snapshots, and brackets each run with session events. An event advances
//! the local chain state only once `/ingest` acknowledges it.
//!
//! [`chain`] is the same ledger on the Rust side, used to verify event logs.

pub mod chain;

use tracing::info;

use crate::domain::context::TrackRecordSettings;
use crate::domain::error::EaforgeError;
use crate::domain::program::{Decl, DeclaredInput, Helper, InputType, Program, Stmt, quote};
use chain::GENESIS_HASH;

pub const PASS: &str = "track-record";

const GROUP: &str = "Track Record";

/// Ticks a vanished position is looked up in history before it is dropped.
const MAX_CLOSE_MISSES: u32 = 10;

const INPUTS: [&str; 4] = [
    "InpTrackRecordUrl",
    "InpTrackRecordKey",
    "InpTrackRecordInstanceId",
    "InpSnapshotMinutes",
];

const GLOBALS: [&str; 14] = [
    "trEaName",
    "trGenesisHash",
    "trReady",
    "trInstanceId",
    "trSeqNo",
    "trLastHash",
    "trKnownTickets",
    "trKnownVolumes",
    "trKnownSl",
    "trKnownTp",
    "trKnownMisses",
    "trLastSnapshot",
    "trRetryAt",
    "TR_MAX_CLOSE_MISSES",
];

const TR_ESCAPE: &str = r#"string TrEscape(string value)
{
   string escaped = "";
   int size = StringLen(value);
   for(int i = 0; i < size; i++)
   {
      ushort c = StringGetCharacter(value, i);
      if(c == '"') escaped += "\\\"";
      else if(c == '\\') escaped += "\\\\";
      else if(c == '\n') escaped += "\\n";
      else if(c == '\r') escaped += "\\r";
      else if(c == '\t') escaped += "\\t";
      else if(c == 8) escaped += "\\b";
      else if(c == 12) escaped += "\\f";
      else if(c < 32) escaped += StringFormat("\\u%04x", c);
      else escaped += ShortToString(c);
   }
   return(escaped);
}"#;

const TR_PUT: &str = r#"void TrPut(string &keys[], string &values[], string key, string value)
{
   int n = ArraySize(keys);
   ArrayResize(keys, n + 1);
   ArrayResize(values, n + 1);
   keys[n] = key;
   values[n] = value;
}"#;

const TR_KEY_LESS: &str = r#"bool TrKeyLess(string a, string b)
{
   int la = StringLen(a);
   int lb = StringLen(b);
   int n = MathMin(la, lb);
   for(int i = 0; i < n; i++)
   {
      ushort ca = StringGetCharacter(a, i);
      ushort cb = StringGetCharacter(b, i);
      if(ca != cb) return(ca < cb);
   }
   return(la < lb);
}"#;

const TR_CANONICAL: &str = r#"string TrCanonical(string eventType, long seqNo, string prevHash, long timestamp, string &keys[], string &values[])
{
   int extra = ArraySize(keys);
   int total = extra + 5;
   string names[];
   string parts[];
   ArrayResize(names, total);
   ArrayResize(parts, total);
   names[0] = "eaInstanceId";
   parts[0] = "\"" + TrEscape(trInstanceId) + "\"";
   names[1] = "eventType";
   parts[1] = "\"" + eventType + "\"";
   names[2] = "prevHash";
   parts[2] = "\"" + prevHash + "\"";
   names[3] = "seqNo";
   parts[3] = IntegerToString(seqNo);
   names[4] = "timestamp";
   parts[4] = IntegerToString(timestamp);
   for(int i = 0; i < extra; i++)
   {
      names[5 + i] = keys[i];
      parts[5 + i] = "\"" + TrEscape(values[i]) + "\"";
   }
   for(int i = 1; i < total; i++)
   {
      string key = names[i];
      string part = parts[i];
      int j = i - 1;
      while(j >= 0 && TrKeyLess(key, names[j]))
      {
         names[j + 1] = names[j];
         parts[j + 1] = parts[j];
         j--;
      }
      names[j + 1] = key;
      parts[j + 1] = part;
   }
   string json = "{";
   for(int i = 0; i < total; i++)
   {
      if(i > 0) json += ",";
      json += "\"" + TrEscape(names[i]) + "\":" + parts[i];
   }
   return(json + "}");
}"#;

const TR_SHA256: &str = r#"string TrSha256(string text)
{
   uchar data[];
   uchar key[];
   uchar digest[];
   int len = StringToCharArray(text, data, 0, WHOLE_ARRAY, CP_UTF8);
   if(len > 0) ArrayResize(data, len - 1);
   if(CryptEncode(CRYPT_HASH_SHA256, data, key, digest) <= 0) return("");
   string hex = "";
   for(int i = 0; i < ArraySize(digest); i++)
      hex += StringFormat("%02x", digest[i]);
   return(hex);
}"#;

const TR_REQUEST: &str = r#"int TrRequest(string method, string path, string body, string &response)
{
   char data[];
   char result[];
   string resultHeaders;
   if(StringLen(body) > 0)
   {
      int len = StringToCharArray(body, data, 0, WHOLE_ARRAY, CP_UTF8);
      if(len > 0) ArrayResize(data, len - 1);
   }
   string headers = "Content-Type: application/json\r\nX-API-Key: " + InpTrackRecordKey + "\r\n";
   ResetLastError();
   int status = WebRequest(method, InpTrackRecordUrl + path, headers, 5000, data, result, resultHeaders);
   if(status == -1)
      Print("Track record ", method, " ", path, " failed, error ", GetLastError());
   response = CharArrayToString(result, 0, WHOLE_ARRAY, CP_UTF8);
   return(status);
}"#;

const TR_JSON_VALUE: &str = r#"string TrJsonValue(string json, string key)
{
   string marker = "\"" + key + "\":";
   int start = StringFind(json, marker);
   if(start < 0) return("");
   start += StringLen(marker);
   int size = StringLen(json);
   while(start < size && StringGetCharacter(json, start) == ' ') start++;
   if(start >= size) return("");
   if(StringGetCharacter(json, start) == '"')
   {
      int close = StringFind(json, "\"", start + 1);
      if(close < 0) return("");
      return(StringSubstr(json, start + 1, close - start - 1));
   }
   int end = start;
   while(end < size)
   {
      ushort c = StringGetCharacter(json, end);
      if(c == ',' || c == '}') break;
      end++;
   }
   return(StringSubstr(json, start, end - start));
}"#;

const TR_STATE_FILE: &str = r#"string TrStateFile()
{
   return("eaforge_tr_" + trInstanceId + ".dat");
}"#;

const TR_STATE_KEY: &str = r#"string TrStateKey()
{
   return("eaforge_tr_" + trInstanceId);
}"#;

const TR_HEX_VALUE: &str = r#"long TrHexValue(string hex)
{
   long value = 0;
   for(int i = 0; i < StringLen(hex); i++)
   {
      ushort c = StringGetCharacter(hex, i);
      int digit = -1;
      if(c >= '0' && c <= '9') digit = c - '0';
      else if(c >= 'a' && c <= 'f') digit = c - 'a' + 10;
      if(digit < 0) return(-1);
      value = value * 16 + digit;
   }
   return(value);
}"#;

const TR_SAVE_STATE: &str = r#"void TrSaveState()
{
   string key = TrStateKey();
   for(int i = 0; i < 8; i++)
      GlobalVariableSet(key + "_h" + IntegerToString(i), (double)TrHexValue(StringSubstr(trLastHash, i * 8, 8)));
   GlobalVariableSet(key + "_seq", (double)trSeqNo);
   GlobalVariablesFlush();
   int file = FileOpen(TrStateFile(), FILE_WRITE | FILE_TXT | FILE_ANSI | FILE_COMMON);
   if(file == INVALID_HANDLE)
   {
      Print("Track record: cannot write state file, error ", GetLastError());
      return;
   }
   FileWriteString(file, IntegerToString(trSeqNo) + "|" + trLastHash + "|" + trInstanceId);
   FileClose(file);
}"#;

const TR_READ_STATE_FILE: &str = r#"bool TrReadStateFile(long &seq, string &hash)
{
   if(!FileIsExist(TrStateFile(), FILE_COMMON)) return(false);
   int file = FileOpen(TrStateFile(), FILE_READ | FILE_TXT | FILE_ANSI | FILE_COMMON);
   if(file == INVALID_HANDLE) return(false);
   string line = FileReadString(file);
   FileClose(file);
   string fields[];
   if(StringSplit(line, '|', fields) != 3) return(false);
   if(fields[2] != trInstanceId || StringLen(fields[1]) != 64) return(false);
   seq = StringToInteger(fields[0]);
   hash = fields[1];
   return(true);
}"#;

const TR_READ_STATE_SLOTS: &str = r#"bool TrReadStateSlots(long &seq, string &hash)
{
   string key = TrStateKey();
   if(!GlobalVariableCheck(key + "_seq")) return(false);
   string rebuilt = "";
   for(int i = 0; i < 8; i++)
   {
      string name = key + "_h" + IntegerToString(i);
      if(!GlobalVariableCheck(name)) return(false);
      long chunk = (long)GlobalVariableGet(name);
      if(chunk < 0) return(false);
      rebuilt += StringFormat("%08x", (uint)chunk);
   }
   seq = (long)GlobalVariableGet(key + "_seq");
   hash = rebuilt;
   return(true);
}"#;

const TR_LOAD_LOCAL_STATE: &str = r#"bool TrLoadLocalState()
{
   long fileSeq = -1;
   string fileHash = "";
   long slotSeq = -1;
   string slotHash = "";
   bool file = TrReadStateFile(fileSeq, fileHash);
   bool slots = TrReadStateSlots(slotSeq, slotHash);
   if(file && slots && (fileSeq != slotSeq || fileHash != slotHash))
   {
      Print("Track record: local state slots disagree, asking the server");
      return(false);
   }
   if(file)
   {
      trSeqNo = fileSeq;
      trLastHash = fileHash;
      return(true);
   }
   if(!slots) return(false);
   Print("Track record: state file missing, restoring from terminal variables");
   trSeqNo = slotSeq;
   trLastHash = slotHash;
   TrSaveState();
   return(true);
}"#;

const TR_RECOVER_REMOTE_STATE: &str = r#"int TrRecoverRemoteState()
{
   string response;
   int status = TrRequest("GET", "/state/" + trInstanceId, "", response);
   if(status == 404) return(0);
   if(status != 200) return(-1);
   string hash = TrJsonValue(response, "lastHash");
   if(StringLen(hash) != 64) return(-1);
   trSeqNo = StringToInteger(TrJsonValue(response, "seqNo"));
   trLastHash = hash;
   TrSaveState();
   return(1);
}"#;

const TR_EMIT: &str = r#"bool TrEmit(string eventType, string &keys[], string &values[])
{
   if(!trReady) return(false);
   if(TimeCurrent() < trRetryAt) return(false);
   long seq = trSeqNo + 1;
   long timestamp = (long)TimeCurrent();
   string hash = TrSha256(TrCanonical(eventType, seq, trLastHash, timestamp, keys, values));
   if(StringLen(hash) != 64)
   {
      Print("Track record: hashing failed for ", eventType);
      return(false);
   }
   string payload = "{";
   for(int i = 0; i < ArraySize(keys); i++)
   {
      if(i > 0) payload += ",";
      payload += "\"" + TrEscape(keys[i]) + "\":\"" + TrEscape(values[i]) + "\"";
   }
   payload += "}";
   string body = StringFormat("{\"eaInstanceId\":\"%s\",\"eventType\":\"%s\",\"seqNo\":%I64d,\"prevHash\":\"%s\",\"eventHash\":\"%s\",\"timestamp\":%I64d,\"payload\":%s}",
      TrEscape(trInstanceId), eventType, seq, trLastHash, hash, timestamp, payload);
   string response;
   int status = TrRequest("POST", "/ingest", body, response);
   if(status < 200 || status >= 300)
   {
      if(status != -1) Print("Track record ", eventType, " #", seq, " not acknowledged, HTTP ", status);
      trRetryAt = TimeCurrent() + 60;
      return(false);
   }
   trSeqNo = seq;
   trLastHash = hash;
   TrSaveState();
   return(true);
}"#;

const TR_KNOWN_INDEX: &str = r#"int TrKnownIndex(ulong ticket)
{
   for(int k = 0; k < ArraySize(trKnownTickets); k++)
      if(trKnownTickets[k] == ticket) return(k);
   return(-1);
}"#;

const TR_REMEMBER: &str = r#"void TrRemember(ulong ticket)
{
   if(!PositionSelectByTicket(ticket)) return;
   int n = ArraySize(trKnownTickets);
   ArrayResize(trKnownTickets, n + 1);
   ArrayResize(trKnownVolumes, n + 1);
   ArrayResize(trKnownSl, n + 1);
   ArrayResize(trKnownTp, n + 1);
   ArrayResize(trKnownMisses, n + 1);
   trKnownTickets[n] = ticket;
   trKnownVolumes[n] = PositionGetDouble(POSITION_VOLUME);
   trKnownSl[n] = PositionGetDouble(POSITION_SL);
   trKnownTp[n] = PositionGetDouble(POSITION_TP);
   trKnownMisses[n] = 0;
}"#;

const TR_FORGET: &str = r#"void TrForget(int k)
{
   int last = ArraySize(trKnownTickets) - 1;
   if(k < 0 || k > last) return;
   trKnownTickets[k] = trKnownTickets[last];
   trKnownVolumes[k] = trKnownVolumes[last];
   trKnownSl[k] = trKnownSl[last];
   trKnownTp[k] = trKnownTp[last];
   trKnownMisses[k] = trKnownMisses[last];
   ArrayResize(trKnownTickets, last);
   ArrayResize(trKnownVolumes, last);
   ArrayResize(trKnownSl, last);
   ArrayResize(trKnownTp, last);
   ArrayResize(trKnownMisses, last);
}"#;

const TR_SEED_POSITIONS: &str = r#"void TrSeedPositions()
{
   ArrayResize(trKnownTickets, 0);
   ArrayResize(trKnownVolumes, 0);
   ArrayResize(trKnownSl, 0);
   ArrayResize(trKnownTp, 0);
   ArrayResize(trKnownMisses, 0);
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      TrRemember(ticket);
   }
}"#;

const TR_REPORT_POSITION: &str = r#"bool TrReportPosition(string eventType, ulong ticket, double closedVolume)
{
   if(!PositionSelectByTicket(ticket)) return(false);
   string symbol = PositionGetString(POSITION_SYMBOL);
   int digits = (int)SymbolInfoInteger(symbol, SYMBOL_DIGITS);
   string keys[];
   string values[];
   TrPut(keys, values, "positionId", IntegerToString(PositionGetInteger(POSITION_IDENTIFIER)));
   TrPut(keys, values, "ticket", IntegerToString((long)ticket));
   TrPut(keys, values, "symbol", symbol);
   TrPut(keys, values, "side", PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY ? "BUY" : "SELL");
   TrPut(keys, values, "volume", DoubleToString(PositionGetDouble(POSITION_VOLUME), 2));
   TrPut(keys, values, "openPrice", DoubleToString(PositionGetDouble(POSITION_PRICE_OPEN), digits));
   TrPut(keys, values, "sl", DoubleToString(PositionGetDouble(POSITION_SL), digits));
   TrPut(keys, values, "tp", DoubleToString(PositionGetDouble(POSITION_TP), digits));
   if(closedVolume > 0.0) TrPut(keys, values, "closedVolume", DoubleToString(closedVolume, 2));
   return(TrEmit(eventType, keys, values));
}"#;

const TR_REPORT_CLOSE: &str = r#"int TrReportClose(ulong ticket)
{
   if(!HistorySelectByPosition((long)ticket)) return(0);
   for(int i = HistoryDealsTotal() - 1; i >= 0; i--)
   {
      ulong deal = HistoryDealGetTicket(i);
      if(deal == 0) continue;
      if((ulong)HistoryDealGetInteger(deal, DEAL_POSITION_ID) != ticket) continue;
      long entry = HistoryDealGetInteger(deal, DEAL_ENTRY);
      if(entry != DEAL_ENTRY_OUT && entry != DEAL_ENTRY_INOUT && entry != DEAL_ENTRY_OUT_BY) continue;
      string symbol = HistoryDealGetString(deal, DEAL_SYMBOL);
      int digits = (int)SymbolInfoInteger(symbol, SYMBOL_DIGITS);
      double profit = HistoryDealGetDouble(deal, DEAL_PROFIT) + HistoryDealGetDouble(deal, DEAL_SWAP) + HistoryDealGetDouble(deal, DEAL_COMMISSION);
      string keys[];
      string values[];
      TrPut(keys, values, "positionId", IntegerToString((long)ticket));
      TrPut(keys, values, "deal", IntegerToString((long)deal));
      TrPut(keys, values, "symbol", symbol);
      TrPut(keys, values, "volume", DoubleToString(HistoryDealGetDouble(deal, DEAL_VOLUME), 2));
      TrPut(keys, values, "closePrice", DoubleToString(HistoryDealGetDouble(deal, DEAL_PRICE), digits));
      TrPut(keys, values, "profit", DoubleToString(profit, 2));
      TrPut(keys, values, "reason", IntegerToString(HistoryDealGetInteger(deal, DEAL_REASON)));
      return(TrEmit("TRADE_CLOSE", keys, values) ? 1 : -1);
   }
   return(0);
}"#;

const TR_SYNC_POSITIONS: &str = r#"void TrSyncPositions()
{
   for(int k = ArraySize(trKnownTickets) - 1; k >= 0; k--)
   {
      if(TimeCurrent() < trRetryAt) return;
      ulong ticket = trKnownTickets[k];
      if(!PositionSelectByTicket(ticket))
      {
         int closed = TrReportClose(ticket);
         if(closed > 0) TrForget(k);
         else if(closed == 0)
         {
            trKnownMisses[k]++;
            if(trKnownMisses[k] >= TR_MAX_CLOSE_MISSES)
            {
               Print("Track record: no closing deal found for position ", ticket, ", no longer tracking it");
               TrForget(k);
            }
         }
         continue;
      }
      double volume = PositionGetDouble(POSITION_VOLUME);
      double sl = PositionGetDouble(POSITION_SL);
      double tp = PositionGetDouble(POSITION_TP);
      if(volume < trKnownVolumes[k] - 1e-8)
      {
         if(TrReportPosition("PARTIAL_CLOSE", ticket, trKnownVolumes[k] - volume))
            trKnownVolumes[k] = volume;
      }
      if(MathAbs(sl - trKnownSl[k]) > 1e-10 || MathAbs(tp - trKnownTp[k]) > 1e-10)
      {
         if(TrReportPosition("TRADE_MODIFY", ticket, 0.0))
         {
            trKnownSl[k] = sl;
            trKnownTp[k] = tp;
         }
      }
   }
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      if(TrKnownIndex(ticket) >= 0) continue;
      if(TimeCurrent() < trRetryAt) return;
      if(TrReportPosition("TRADE_OPEN", ticket, 0.0)) TrRemember(ticket);
   }
}"#;

const TR_ACCOUNT_PAYLOAD: &str = r#"void TrAccountPayload(string &keys[], string &values[])
{
   TrPut(keys, values, "balance", DoubleToString(AccountInfoDouble(ACCOUNT_BALANCE), 2));
   TrPut(keys, values, "equity", DoubleToString(AccountInfoDouble(ACCOUNT_EQUITY), 2));
   TrPut(keys, values, "openPositions", IntegerToString(ArraySize(trKnownTickets)));
}"#;

const TR_ENSURE_READY: &str = r#"bool TrEnsureReady()
{
   if(trReady) return(true);
   if(MQLInfoInteger(MQL_TESTER)) return(false);
   if(TimeCurrent() < trRetryAt) return(false);
   if(!TrLoadLocalState())
   {
      int recovered = TrRecoverRemoteState();
      if(recovered < 0)
      {
         trRetryAt = TimeCurrent() + 60;
         return(false);
      }
      if(recovered == 0)
      {
         trSeqNo = -1;
         trLastHash = trGenesisHash;
         Print("Track record: starting a new chain for ", trInstanceId);
      }
   }
   trReady = true;
   TrSeedPositions();
   trLastSnapshot = TimeCurrent();
   string keys[];
   string values[];
   TrPut(keys, values, "eaName", trEaName);
   TrAccountPayload(keys, values);
   TrEmit("SESSION_START", keys, values);
   return(true);
}"#;

const TR_START: &str = r#"void TrStart()
{
   trInstanceId = InpTrackRecordInstanceId;
   if(StringLen(trInstanceId) == 0)
      trInstanceId = IntegerToString(AccountInfoInteger(ACCOUNT_LOGIN)) + "-" + IntegerToString(InpMagicNumber);
   trLastHash = trGenesisHash;
   if(!TrEnsureReady())
      Print("Track record: chain state unavailable, retrying on later ticks");
}"#;

const TR_TICK: &str = r#"void TrTick()
{
   if(StringLen(trInstanceId) == 0) return;
   if(TimeCurrent() < trRetryAt) return;
   if(!TrEnsureReady()) return;
   TrSyncPositions();
   datetime now = TimeCurrent();
   if(now - trLastSnapshot >= InpSnapshotMinutes * 60)
   {
      trLastSnapshot = now;
      string keys[];
      string values[];
      TrAccountPayload(keys, values);
      TrEmit("SNAPSHOT", keys, values);
   }
}"#;

const TR_STOP: &str = r#"void TrStop(int reason)
{
   if(!trReady) return;
   TrSyncPositions();
   string keys[];
   string values[];
   TrPut(keys, values, "reason", IntegerToString(reason));
   TrAccountPayload(keys, values);
   TrEmit("SESSION_END", keys, values);
}"#;

const HELPERS: [(&str, &str); 28] = [
    ("TrEscape", TR_ESCAPE),
    ("TrPut", TR_PUT),
    ("TrKeyLess", TR_KEY_LESS),
    ("TrCanonical", TR_CANONICAL),
    ("TrSha256", TR_SHA256),
    ("TrRequest", TR_REQUEST),
    ("TrJsonValue", TR_JSON_VALUE),
    ("TrStateFile", TR_STATE_FILE),
    ("TrStateKey", TR_STATE_KEY),
    ("TrHexValue", TR_HEX_VALUE),
    ("TrSaveState", TR_SAVE_STATE),
    ("TrReadStateFile", TR_READ_STATE_FILE),
    ("TrReadStateSlots", TR_READ_STATE_SLOTS),
    ("TrLoadLocalState", TR_LOAD_LOCAL_STATE),
    ("TrRecoverRemoteState", TR_RECOVER_REMOTE_STATE),
    ("TrEmit", TR_EMIT),
    ("TrKnownIndex", TR_KNOWN_INDEX),
    ("TrRemember", TR_REMEMBER),
    ("TrForget", TR_FORGET),
    ("TrSeedPositions", TR_SEED_POSITIONS),
    ("TrReportPosition", TR_REPORT_POSITION),
    ("TrReportClose", TR_REPORT_CLOSE),
    ("TrSyncPositions", TR_SYNC_POSITIONS),
    ("TrAccountPayload", TR_ACCOUNT_PAYLOAD),
    ("TrEnsureReady", TR_ENSURE_READY),
    ("TrStart", TR_START),
    ("TrTick", TR_TICK),
    ("TrStop", TR_STOP),
];

/// Inject the track-record ledger into `program`.
pub fn apply(mut program: Program, settings: &TrackRecordSettings) -> Result<Program, EaforgeError> {
    if program.passes().track_record {
        return Err(EaforgeError::TransformReapplied { pass: PASS });
    }
    let url = settings.base_url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(EaforgeError::InvalidSettings {
            reason: "track record needs a base url".to_string(),
        });
    }

    let defaults = [
        (InputType::String, quote(url), "Track record base URL"),
        (InputType::String, quote(&settings.api_key), "Track record API key"),
        (
            InputType::String,
            quote(settings.instance_id.trim()),
            "Instance id (empty: account-magic)",
        ),
        (
            InputType::Int,
            settings.snapshot_minutes.max(1).to_string(),
            "Minutes between equity snapshots",
        ),
    ];
    for (name, (ty, default_value, comment)) in INPUTS.into_iter().zip(defaults) {
        program.push_input(DeclaredInput::new(name, ty, default_value, comment).in_group(GROUP));
    }

    let ea_name = quote(program.name());
    let names = program.names_mut();
    for name in INPUTS.into_iter().chain(GLOBALS) {
        names.reserve(name);
    }

    for decl in [
        format!("string trEaName = {};", ea_name),
        format!("string trGenesisHash = \"{}\";", GENESIS_HASH),
        "bool trReady = false;".to_string(),
        "string trInstanceId = \"\";".to_string(),
        "long trSeqNo = -1;".to_string(),
        "string trLastHash = \"\";".to_string(),
        "ulong trKnownTickets[];".to_string(),
        "double trKnownVolumes[];".to_string(),
        "double trKnownSl[];".to_string(),
        "double trKnownTp[];".to_string(),
        "int trKnownMisses[];".to_string(),
        "datetime trLastSnapshot = 0;".to_string(),
        "datetime trRetryAt = 0;".to_string(),
        format!("const int TR_MAX_CLOSE_MISSES = {};", MAX_CLOSE_MISSES),
    ] {
        program.push_global(Decl::plain(decl));
    }

    program.push_init(Stmt::plain(0, "TrStart();"));
    program.prepend_tick(Stmt::plain(0, "TrTick();"));
    program.push_teardown(Stmt::plain(0, "TrStop(reason);"));

    for (name, body) in HELPERS {
        program.push_helper(Helper::new(name, body));
    }

    program.passes_mut().track_record = true;
    info!(url, snapshot_minutes = settings.snapshot_minutes, "track record injected");
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::NameRegistry;

    fn base() -> Program {
        let mut p = Program::new("Ledger EA", NameRegistry::new());
        p.push_init(Stmt::plain(0, "pipFactor = 10.0;"));
        p.push_tick(Stmt::plain(0, "if(Bars($SYMBOL, PERIOD_CURRENT) < 20) $EXIT;"));
        p.push_teardown(Stmt::release_handle("ind0Handle"));
        p
    }

    fn settings() -> TrackRecordSettings {
        TrackRecordSettings {
            base_url: "https://ledger.example.com".into(),
            api_key: "secret".into(),
            instance_id: "acct-7".into(),
            snapshot_minutes: 30,
        }
    }

    #[test]
    fn hooks_added_without_touching_existing_statements() {
        let before = base();
        let after = apply(before.clone(), &settings()).unwrap();
        assert_eq!(after.tick()[0].line.render(), "TrTick();");
        assert_eq!(&after.tick()[1..], before.tick());
        assert_eq!(&after.init()[..1], before.init());
        assert_eq!(after.init().last().unwrap().line.render(), "TrStart();");
        assert_eq!(&after.teardown()[..1], before.teardown());
        assert_eq!(after.teardown().last().unwrap().line.render(), "TrStop(reason);");
    }

    #[test]
    fn inputs_carry_settings() {
        let p = apply(base(), &settings()).unwrap();
        let defaults: Vec<(&str, &str)> = p
            .inputs()
            .iter()
            .map(|i| (i.name.as_str(), i.default_value.as_str()))
            .collect();
        assert_eq!(
            defaults,
            vec![
                ("InpTrackRecordUrl", "\"https://ledger.example.com\""),
                ("InpTrackRecordKey", "\"secret\""),
                ("InpTrackRecordInstanceId", "\"acct-7\""),
                ("InpSnapshotMinutes", "30"),
            ]
        );
    }

    #[test]
    fn ledger_speaks_the_same_protocol() {
        let src = apply(base(), &settings()).unwrap().render();
        assert!(src.contains(&format!("string trGenesisHash = \"{}\";", GENESIS_HASH)));
        assert!(src.contains("TrRequest(\"POST\", \"/ingest\", body, response)"));
        assert!(src.contains("TrRequest(\"GET\", \"/state/\" + trInstanceId"));
        assert!(src.contains("CryptEncode(CRYPT_HASH_SHA256"));
        for event in ["TRADE_OPEN", "TRADE_CLOSE", "TRADE_MODIFY", "PARTIAL_CLOSE", "SNAPSHOT", "SESSION_START", "SESSION_END"] {
            assert!(src.contains(&format!("\"{}\"", event)), "{}", event);
        }
        for key in chain::RESERVED_KEYS {
            assert!(src.contains(&format!("= \"{}\";", key)), "{}", key);
        }
    }

    #[test]
    fn state_saved_only_after_acknowledgment() {
        let p = apply(base(), &settings()).unwrap();
        let emit: Vec<String> = p.helper("TrEmit").unwrap().lines.iter().map(|l| l.render()).collect();
        let ack = emit.iter().position(|l| l.contains("status < 200 || status >= 300")).unwrap();
        let save = emit.iter().position(|l| l.contains("TrSaveState();")).unwrap();
        assert!(save > ack);
    }

    fn helper_text(p: &Program, name: &str) -> String {
        p.helper(name)
            .unwrap()
            .lines
            .iter()
            .map(|l| l.render())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn fresh_chain_emits_seq_zero_first() {
        let p = apply(base(), &settings()).unwrap();
        let src = p.render();
        assert!(src.contains("long trSeqNo = -1;"));
        let ready = helper_text(&p, "TrEnsureReady");
        assert!(ready.contains("trSeqNo = -1;"));
        assert!(helper_text(&p, "TrEmit").contains("long seq = trSeqNo + 1;"));
    }

    #[test]
    fn failed_ingest_backs_off_every_caller() {
        let p = apply(base(), &settings()).unwrap();
        let emit = helper_text(&p, "TrEmit");
        let failure = emit.find("status < 200 || status >= 300").unwrap();
        let backoff = emit.find("trRetryAt = TimeCurrent() + 60;").unwrap();
        let save = emit.find("TrSaveState();").unwrap();
        assert!(failure < backoff && backoff < save);
        assert!(emit.find("if(TimeCurrent() < trRetryAt) return(false);").unwrap() < failure);
        for name in ["TrTick", "TrSyncPositions"] {
            assert!(helper_text(&p, name).contains("if(TimeCurrent() < trRetryAt) return;"), "{name}");
        }
    }

    #[test]
    fn state_slots_hold_the_whole_chain_head() {
        let p = apply(base(), &settings()).unwrap();
        let save = helper_text(&p, "TrSaveState");
        assert!(save.contains("GlobalVariableSet(key + \"_h\" + IntegerToString(i)"));
        assert!(save.contains("GlobalVariableSet(key + \"_seq\", (double)trSeqNo);"));
        assert!(save.contains("IntegerToString(trSeqNo) + \"|\" + trLastHash + \"|\" + trInstanceId"));
        assert!(helper_text(&p, "TrStateKey").contains("trInstanceId"));

        let load = helper_text(&p, "TrLoadLocalState");
        let from_file = load.find("trSeqNo = fileSeq;").unwrap();
        let from_slots = load.find("trSeqNo = slotSeq;").unwrap();
        assert!(from_file < from_slots);
        assert!(load.contains("if(!slots) return(false);"));
        assert!(helper_text(&p, "TrReadStateSlots").contains("StringFormat(\"%08x\", (uint)chunk)"));
    }

    #[test]
    fn escape_matches_verifier_for_control_characters() {
        let p = apply(base(), &settings()).unwrap();
        let escape = helper_text(&p, "TrEscape");
        for branch in [
            "if(c == 8) escaped += \"\\\\b\";",
            "if(c == 12) escaped += \"\\\\f\";",
            "if(c < 32) escaped += StringFormat(\"\\\\u%04x\", c);",
        ] {
            assert!(escape.contains(branch), "{branch}\n{escape}");
        }
    }

    #[test]
    fn vanished_position_dropped_after_bounded_misses() {
        let p = apply(base(), &settings()).unwrap();
        assert!(p.render().contains(&format!("const int TR_MAX_CLOSE_MISSES = {};", MAX_CLOSE_MISSES)));
        let close = helper_text(&p, "TrReportClose");
        assert!(close.contains("HistorySelectByPosition((long)ticket)"));
        assert!(!close.contains("86400"));
        let sync = helper_text(&p, "TrSyncPositions");
        assert!(sync.contains("trKnownMisses[k]++;"));
        let bound = sync.find("trKnownMisses[k] >= TR_MAX_CLOSE_MISSES").unwrap();
        assert!(sync[bound..].contains("TrForget(k);"));
        assert!(helper_text(&p, "TrForget").contains("trKnownMisses[k] = trKnownMisses[last];"));
    }

    #[test]
    fn second_application_is_rejected() {
        let once = apply(base(), &settings()).unwrap();
        assert!(matches!(
            apply(once, &settings()),
            Err(EaforgeError::TransformReapplied { pass: "track-record" })
        ));
    }

    #[test]
    fn passes_commute_on_disjoint_regions() {
        use crate::domain::context::TelemetrySettings;
        use crate::domain::telemetry;

        let t = TelemetrySettings {
            base_url: "https://t.example.com".into(),
            ..Default::default()
        };
        let a = telemetry::apply(apply(base(), &settings()).unwrap(), &t).unwrap();
        let b = apply(telemetry::apply(base(), &t).unwrap(), &settings()).unwrap();
        let mut names_a: Vec<&str> = a.helpers().iter().map(|h| h.name.as_str()).collect();
        let mut names_b: Vec<&str> = b.helpers().iter().map(|h| h.name.as_str()).collect();
        names_a.sort();
        names_b.sort();
        assert_eq!(names_a, names_b);
        assert_eq!(a.tick().len(), b.tick().len());
        assert!(a.passes().telemetry && a.passes().track_record);
    }

    #[test]
    fn helpers_have_no_symbol_references() {
        let p = apply(base(), &settings()).unwrap();
        for helper in p.helpers() {
            assert!(!helper.lines.iter().any(|l| l.has_symbol_scope()), "{}", helper.name);
        }
    }
}
