mod common;

use common::*;
use eaforge::domain::context::{
    GenerationContext, MultiPairSettings, TelemetrySettings, TrackRecordSettings,
};
use eaforge::domain::error::EaforgeError;
use eaforge::domain::graph::document::GraphDocument;
use eaforge::domain::pipeline::compile;
use serde_json::json;

fn full_context() -> GenerationContext {
    GenerationContext {
        ea_name: "Full Stack".into(),
        multi_pair: Some(MultiPairSettings {
            symbols: vec!["eurusd".into(), " GBPUSD ".into()],
        }),
        telemetry: Some(TelemetrySettings {
            base_url: "https://telemetry.example.com/".into(),
            api_key: "k-123".into(),
            ..Default::default()
        }),
        track_record: Some(TrackRecordSettings {
            base_url: "https://ledger.example.com".into(),
            instance_id: "acct-42".into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

mod single_symbol {
    use super::*;

    #[test]
    fn sections_render_in_order() {
        let (nodes, edges) = rsi_strategy();
        let out = compile_nodes(nodes, edges);
        let at = positions(
            &out.source,
            &[
                "#property copyright",
                "//--- Inputs",
                "//--- Globals",
                "int OnInit()",
                "void OnTick()",
                "void OnDeinit(const int reason)",
            ],
        );
        assert!(at.windows(2).all(|w| w[0] < w[1]), "sections out of order: {at:?}");
        assert!(out.source.ends_with('\n'));
    }

    #[test]
    fn rsi_uses_chart_symbol() {
        let (nodes, edges) = rsi_strategy();
        let out = compile_nodes(nodes, edges);
        assert!(out.source.contains("iRSI(_Symbol"));
        assert!(!out.source.contains("symbolCount"));
        assert!(!out.source.contains('$'));
        assert!(out.source.contains("bool entryAllowed = true;"));
    }

    #[test]
    fn optimizable_period_is_an_input() {
        let (nodes, edges) = rsi_strategy();
        let out = compile_nodes(nodes, edges);
        let period = out
            .inputs
            .iter()
            .find(|i| i.name == "InpInd0Period")
            .expect("rsi period input");
        assert!(period.optimizable);
        assert_eq!(period.default_value, "14");
        assert!(out.source.contains("input int InpInd0Period = 14;"));
    }

    #[test]
    fn groups_are_declared() {
        let (nodes, edges) = rsi_strategy();
        let out = compile_nodes(nodes, edges);
        let groups: Vec<&str> = out.inputs.iter().map(|i| i.group.as_str()).collect();
        assert!(groups.contains(&"Stop Loss"));
        assert!(groups.contains(&"Take Profit"));
        assert!(out.source.contains("input group \"Stop Loss\""));
    }

    #[test]
    fn moving_average_compares_close_to_buffer() {
        let nodes = vec![
            node("ma", "moving-average", json!({ "period": 50 })),
            node("buy", "place-buy", json!({})),
        ];
        let out = compile_nodes(nodes, vec![edge("ma", "buy")]);
        assert!(out.source.contains("iClose(_Symbol, InpInd0Timeframe, 1) > ind0Buffer[1]"));
    }

    #[test]
    fn input_names_are_unique() {
        let (nodes, edges) = rsi_strategy();
        let out = compile(&document(nodes, edges), &full_context()).unwrap();
        let mut names: Vec<&str> = out.inputs.iter().map(|i| i.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}

mod diagnostics {
    use super::*;

    #[test]
    fn inverted_crossover_warns() {
        let (nodes, edges) = ma_crossover_strategy(50, 20);
        let out = compile_nodes(nodes, edges);
        assert!(
            out.warnings
                .iter()
                .any(|w| w.node_id.as_deref() == Some("cross")
                    && w.message.contains("fast period 50"))
        );
    }

    #[test]
    fn ordered_crossover_is_quiet() {
        let (nodes, edges) = ma_crossover_strategy(10, 50);
        let out = compile_nodes(nodes, edges);
        assert!(!out.warnings.iter().any(|w| w.node_id.as_deref() == Some("cross")));
        assert!(out.source.contains("ind0FastHandle"));
        assert!(out.source.contains("ind0SlowHandle"));
    }

    #[test]
    fn dangling_edge_is_dropped_with_warning() {
        let (nodes, mut edges) = rsi_strategy();
        edges.push(edge("rsi", "ghost"));
        let out = compile_nodes(nodes, edges);
        assert!(out.warnings.iter().any(|w| w.message.contains("ghost")));
    }

    #[test]
    fn unknown_node_type_rejected() {
        let text = document_json(vec![node("x", "neural-net", json!({}))], vec![]);
        let err = GraphDocument::from_json(&text).unwrap_err();
        assert!(matches!(
            err,
            EaforgeError::UnknownNodeType { node_id, node_type }
                if node_id == "x" && node_type == "neural-net"
        ));
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let nodes = vec![
            node("a", "rsi", json!({})),
            node("a", "place-buy", json!({})),
        ];
        let err = compile(&document(nodes, vec![]), &GenerationContext::default()).unwrap_err();
        assert!(matches!(err, EaforgeError::DuplicateNodeId(id) if id == "a"));
    }

    #[test]
    fn range_opposite_stop_needs_range_node() {
        let nodes = vec![
            node("rsi", "rsi", json!({})),
            node("buy", "place-buy", json!({})),
            node("sl", "stop-loss", json!({ "method": "range-opposite" })),
        ];
        let err = compile(&document(nodes, vec![edge("rsi", "buy")]), &GenerationContext::default())
            .unwrap_err();
        assert!(matches!(err, EaforgeError::Structural { node_id, .. } if node_id == "sl"));
    }

    #[test]
    fn document_settings_are_used() {
        let (nodes, edges) = rsi_strategy();
        let text = document_with_settings(
            nodes,
            edges,
            json!({ "eaName": "From Document", "magicNumber": 777 }),
        );
        let doc = GraphDocument::from_json(&text).unwrap();
        let out = compile(&doc, &doc.settings).unwrap();
        assert!(out.source.contains("From Document.mq5"));
        assert!(out.source.contains("InpMagicNumber = 777;"));
    }
}

mod passes {
    use super::*;

    #[test]
    fn multi_pair_loops_over_symbols() {
        let (nodes, edges) = rsi_strategy();
        let ctx = GenerationContext {
            multi_pair: full_context().multi_pair,
            ..Default::default()
        };
        let out = compile(&document(nodes, edges), &ctx).unwrap();
        assert!(out.source.contains("\"EURUSD,GBPUSD\""));
        assert!(out.source.contains("for(int s = 0; s < symbolCount; s++)"));
        assert!(out.source.contains("ind0Handle[s] = iRSI(symbols[s], "));
        assert!(out.source.contains("datetime lastSignalBarTime[];"));
        assert!(!out.source.contains("iRSI(_Symbol"));
    }

    #[test]
    fn all_passes_hook_every_region() {
        let (nodes, edges) = rsi_strategy();
        let out = compile(&document(nodes, edges), &full_context()).unwrap();
        let passes = out.program.passes();
        assert!(passes.multi_pair && passes.telemetry && passes.track_record);

        let source = &out.source;
        let tick = source.find("void OnTick()").unwrap();
        let deinit = source.find("void OnDeinit(const int reason)").unwrap();
        let on_tick = &source[tick..deinit];
        let tr = on_tick.find("TrTick();").unwrap();
        let telemetry = on_tick.find("TelemetryTick();").unwrap();
        let symbol_loop = on_tick.find("for(int s = 0; s < symbolCount; s++)").unwrap();
        assert!(tr < telemetry && telemetry < symbol_loop);

        assert!(source.contains("TrStart();"));
        assert!(source.contains("TrStop(reason);"));
        assert!(source.contains("\"https://telemetry.example.com\""));
        assert!(source.contains("\"acct-42\""));
    }

    #[test]
    fn blank_urls_skip_passes() {
        let (nodes, edges) = rsi_strategy();
        let ctx = GenerationContext {
            telemetry: Some(TelemetrySettings {
                base_url: "  ".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = compile(&document(nodes, edges), &ctx).unwrap();
        assert!(!out.program.passes().telemetry);
        assert!(!out.source.contains("TelemetryTick"));
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let (nodes, edges) = rsi_strategy();
        let ctx = GenerationContext {
            multi_pair: Some(MultiPairSettings {
                symbols: vec!["EURUSD".into(), "eurusd".into()],
            }),
            ..Default::default()
        };
        let err = compile(&document(nodes, edges), &ctx).unwrap_err();
        assert!(matches!(err, EaforgeError::ConfigInvalid { .. }));
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let (nodes, edges) = rsi_strategy();
        let doc = document(nodes, edges);
        let ctx = full_context();
        let first = compile(&doc, &ctx).unwrap();
        let second = compile(&doc, &ctx).unwrap();
        assert_eq!(first.source, second.source);
        assert_eq!(first.inputs, second.inputs);
    }
}
