mod common;

use common::*;
use eaforge::domain::context::{GenerationContext, MultiPairSettings};
use eaforge::domain::pipeline::compile;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::HashSet;

/// Every node type, each with a payload that cannot fail structurally.
fn catalog(kind: usize, period: i32) -> (&'static str, Value) {
    match kind % 24 {
        0 => ("moving-average", json!({ "period": period })),
        1 => ("ma-crossover", json!({ "fastPeriod": period, "slowPeriod": period + 20 })),
        2 => ("rsi", json!({ "period": period })),
        3 => ("macd", json!({})),
        4 => ("bollinger-bands", json!({ "period": period })),
        5 => ("atr", json!({ "period": period })),
        6 => ("adx", json!({ "period": period })),
        7 => ("stochastic", json!({})),
        8 => ("cci", json!({ "period": period })),
        9 => ("range-breakout", json!({})),
        10 => ("candlestick-pattern", json!({})),
        11 => ("trading-session", json!({})),
        12 => ("max-spread", json!({})),
        13 => ("place-buy", json!({})),
        14 => ("place-sell", json!({})),
        15 => ("stop-loss", json!({ "method": "atr", "period": period })),
        16 => ("take-profit", json!({ "method": "fixed", "pips": period * 2 })),
        17 => ("breakeven-stop", json!({})),
        18 => ("trailing-stop", json!({ "method": "fixed" })),
        19 => ("partial-close", json!({})),
        20 => ("lock-profit", json!({})),
        21 => ("grid-pyramid", json!({})),
        22 => ("time-exit", json!({ "closeAfterBars": period })),
        _ => ("opposite-signal-exit", json!({})),
    }
}

fn graph_strategy() -> impl Strategy<Value = (Vec<Value>, Vec<Value>)> {
    (
        prop::collection::vec((0usize..24, 2i32..120), 1..10),
        prop::collection::vec((0usize..16, 0usize..16), 0..12),
    )
        .prop_map(|(kinds, wiring)| {
            let nodes: Vec<Value> = kinds
                .iter()
                .enumerate()
                .map(|(i, &(kind, period))| {
                    let (node_type, data) = catalog(kind, period);
                    optimizable_node(&format!("n{i}"), node_type, data, &["period"])
                })
                .collect();
            let edges: Vec<Value> = wiring
                .iter()
                .map(|&(a, b)| edge(&format!("n{}", a % nodes.len()), &format!("n{}", b % nodes.len())))
                .collect();
            (nodes, edges)
        })
}

fn multi_pair() -> GenerationContext {
    GenerationContext {
        multi_pair: Some(MultiPairSettings {
            symbols: vec!["EURUSD".into(), "USDJPY".into(), "XAUUSD".into()],
        }),
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn compile_is_deterministic((nodes, edges) in graph_strategy()) {
        let doc = document(nodes, edges);
        let ctx = GenerationContext::default();
        let first = compile(&doc, &ctx).unwrap();
        let second = compile(&doc, &ctx).unwrap();
        prop_assert_eq!(first.source, second.source);
    }

    #[test]
    fn input_names_never_collide((nodes, edges) in graph_strategy()) {
        let out = compile(&document(nodes, edges), &multi_pair()).unwrap();
        let mut seen = HashSet::new();
        for input in &out.inputs {
            prop_assert!(seen.insert(input.name.clone()), "duplicate input {}", input.name);
        }
    }

    #[test]
    fn multi_pair_rewrite_is_total((nodes, edges) in graph_strategy()) {
        let out = compile(&document(nodes, edges), &multi_pair()).unwrap();
        prop_assert!(out.program.passes().multi_pair);
        prop_assert!(out.source.contains("\"EURUSD,USDJPY,XAUUSD\""));
    }
}
