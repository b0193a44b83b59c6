//! Generation settings validation.
//!
//! Runs on the merged context (document settings plus INI overrides) before
//! any node is emitted. Errors name the INI section and key that would fix
//! the problem.

use crate::domain::context::GenerationContext;
use crate::domain::error::EaforgeError;

pub fn validate_generation_context(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    validate_ea_name(ctx)?;
    validate_magic_number(ctx)?;
    validate_slippage(ctx)?;
    validate_limits(ctx)?;
    validate_risk(ctx)?;
    validate_multi_pair(ctx)?;
    validate_telemetry(ctx)?;
    validate_track_record(ctx)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EaforgeError {
    EaforgeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_ea_name(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let name = ctx.ea_name.trim();
    if name.is_empty() {
        return Err(EaforgeError::ConfigMissing {
            section: "generator".to_string(),
            key: "ea_name".to_string(),
        });
    }
    if name.contains(['"', '\\', '\n', '\r']) {
        return Err(invalid(
            "generator",
            "ea_name",
            "ea_name must not contain quotes, backslashes or line breaks",
        ));
    }
    Ok(())
}

fn validate_magic_number(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    if ctx.magic_number <= 0 {
        return Err(invalid(
            "generator",
            "magic_number",
            "magic_number must be positive",
        ));
    }
    Ok(())
}

fn validate_slippage(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    if ctx.slippage_points < 0 {
        return Err(invalid(
            "generator",
            "slippage_points",
            "slippage_points must be non-negative",
        ));
    }
    Ok(())
}

fn validate_limits(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let limits = [
        ("max_open_trades", ctx.limits.max_open_trades),
        ("max_buy_positions", ctx.limits.max_buy_positions),
        ("max_sell_positions", ctx.limits.max_sell_positions),
    ];
    for (key, value) in limits {
        if value < 1 {
            return Err(invalid("limits", key, format!("{} must be at least 1", key)));
        }
    }
    Ok(())
}

fn validate_risk(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let values = [
        ("max_daily_loss_percent", ctx.risk.max_daily_loss_percent),
        ("max_drawdown_percent", ctx.risk.max_drawdown_percent),
    ];
    for (key, value) in values {
        if !(0.0..=100.0).contains(&value) {
            return Err(invalid(
                "risk",
                key,
                format!("{} must be between 0 and 100", key),
            ));
        }
    }
    Ok(())
}

fn validate_multi_pair(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let Some(multi) = &ctx.multi_pair else {
        return Ok(());
    };
    if multi.symbols.is_empty() {
        return Err(EaforgeError::InvalidSettings {
            reason: "multi-pair mode needs at least one symbol".to_string(),
        });
    }
    if let Some(bad) = multi
        .symbols
        .iter()
        .find(|s| s.trim().is_empty() || s.contains([',', '"', ' ']))
    {
        return Err(EaforgeError::InvalidSettings {
            reason: format!("invalid symbol name '{}' in multi-pair list", bad),
        });
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = multi.symbols.iter().find(|s| !seen.insert(s.trim().to_ascii_uppercase())) {
        return Err(EaforgeError::InvalidSettings {
            reason: format!("symbol '{}' listed twice in multi-pair list", dup),
        });
    }
    Ok(())
}

fn validate_url(section: &str, url: &str) -> Result<(), EaforgeError> {
    if url.trim().is_empty() {
        return Err(EaforgeError::ConfigMissing {
            section: section.to_string(),
            key: "base_url".to_string(),
        });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(
            section,
            "base_url",
            "base_url must start with http:// or https://",
        ));
    }
    if url.contains('"') {
        return Err(invalid(section, "base_url", "base_url must not contain quotes"));
    }
    Ok(())
}

fn validate_telemetry(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let Some(telemetry) = &ctx.telemetry else {
        return Ok(());
    };
    validate_url("telemetry", &telemetry.base_url)?;
    if telemetry.heartbeat_seconds < 10 {
        return Err(invalid(
            "telemetry",
            "heartbeat_seconds",
            "heartbeat_seconds must be at least 10",
        ));
    }
    Ok(())
}

fn validate_track_record(ctx: &GenerationContext) -> Result<(), EaforgeError> {
    let Some(track) = &ctx.track_record else {
        return Ok(());
    };
    validate_url("track_record", &track.base_url)?;
    let id = track.instance_id.trim();
    if id.is_empty() {
        return Err(EaforgeError::ConfigMissing {
            section: "track_record".to_string(),
            key: "instance_id".to_string(),
        });
    }
    if id.contains(['|', '"', '/', '\\']) {
        return Err(invalid(
            "track_record",
            "instance_id",
            "instance_id must not contain | \" / or \\",
        ));
    }
    if track.snapshot_minutes < 1 {
        return Err(invalid(
            "track_record",
            "snapshot_minutes",
            "snapshot_minutes must be at least 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{MultiPairSettings, TelemetrySettings, TrackRecordSettings};

    #[test]
    fn default_context_is_valid() {
        assert!(validate_generation_context(&GenerationContext::default()).is_ok());
    }

    #[test]
    fn empty_name_is_missing() {
        let ctx = GenerationContext {
            ea_name: "  ".into(),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(matches!(err, EaforgeError::ConfigMissing { key, .. } if key == "ea_name"));
    }

    #[test]
    fn zero_limit_rejected() {
        let mut ctx = GenerationContext::default();
        ctx.limits.max_sell_positions = 0;
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(err.to_string().contains("max_sell_positions"));
    }

    #[test]
    fn risk_percent_range() {
        let mut ctx = GenerationContext::default();
        ctx.risk.max_drawdown_percent = 150.0;
        assert!(validate_generation_context(&ctx).is_err());
    }

    #[test]
    fn empty_symbol_list_is_invalid_settings() {
        let ctx = GenerationContext {
            multi_pair: Some(MultiPairSettings { symbols: vec![] }),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(matches!(err, EaforgeError::InvalidSettings { .. }));
    }

    #[test]
    fn symbol_with_comma_rejected() {
        let ctx = GenerationContext {
            multi_pair: Some(MultiPairSettings {
                symbols: vec!["EURUSD,GBPUSD".into()],
            }),
            ..Default::default()
        };
        assert!(validate_generation_context(&ctx).is_err());
    }

    #[test]
    fn duplicate_symbols_rejected_case_insensitively() {
        let ctx = GenerationContext {
            multi_pair: Some(MultiPairSettings {
                symbols: vec!["EURUSD".into(), "eurusd".into()],
            }),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn heartbeat_floor() {
        let ctx = GenerationContext {
            telemetry: Some(TelemetrySettings {
                base_url: "https://t.example.com".into(),
                heartbeat_seconds: 5,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(matches!(err, EaforgeError::ConfigInvalid { key, .. } if key == "heartbeat_seconds"));
    }

    #[test]
    fn telemetry_requires_http_url() {
        let ctx = GenerationContext {
            telemetry: Some(TelemetrySettings {
                base_url: "ftp://example.com".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn track_record_requires_instance_id() {
        let ctx = GenerationContext {
            track_record: Some(TrackRecordSettings {
                base_url: "https://ledger.example.com".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate_generation_context(&ctx).unwrap_err();
        assert!(matches!(err, EaforgeError::ConfigMissing { key, .. } if key == "instance_id"));
    }
}
