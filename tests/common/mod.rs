#![allow(dead_code)]

use eaforge::domain::context::GenerationContext;
use eaforge::domain::graph::document::GraphDocument;
use eaforge::domain::pipeline::{CompileOutput, compile};
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

pub fn node(id: &str, node_type: &str, data: Value) -> Value {
    json!({ "id": id, "type": node_type, "data": data })
}

pub fn optimizable_node(id: &str, node_type: &str, data: Value, fields: &[&str]) -> Value {
    json!({ "id": id, "type": node_type, "data": data, "optimizableFields": fields })
}

pub fn edge(source: &str, target: &str) -> Value {
    json!({ "source": source, "target": target })
}

pub fn document_json(nodes: Vec<Value>, edges: Vec<Value>) -> String {
    json!({ "version": 1, "nodes": nodes, "edges": edges }).to_string()
}

pub fn document_with_settings(nodes: Vec<Value>, edges: Vec<Value>, settings: Value) -> String {
    json!({ "version": 1, "nodes": nodes, "edges": edges, "settings": settings }).to_string()
}

pub fn document(nodes: Vec<Value>, edges: Vec<Value>) -> GraphDocument {
    GraphDocument::from_json(&document_json(nodes, edges)).unwrap()
}

/// RSI feeding both entries with a fixed stop and a risk-reward target.
pub fn rsi_strategy() -> (Vec<Value>, Vec<Value>) {
    let nodes = vec![
        optimizable_node("rsi", "rsi", json!({ "period": 14 }), &["period"]),
        node("buy", "place-buy", json!({})),
        node("sell", "place-sell", json!({})),
        node("sl", "stop-loss", json!({ "method": "fixed", "pips": 30 })),
        node("tp", "take-profit", json!({ "method": "risk-reward", "ratio": 2.0 })),
    ];
    let edges = vec![edge("rsi", "buy"), edge("rsi", "sell")];
    (nodes, edges)
}

pub fn ma_crossover_strategy(fast: i32, slow: i32) -> (Vec<Value>, Vec<Value>) {
    let nodes = vec![
        node(
            "cross",
            "ma-crossover",
            json!({ "fastPeriod": fast, "slowPeriod": slow }),
        ),
        node("buy", "place-buy", json!({})),
        node("sl", "stop-loss", json!({ "method": "fixed", "pips": 25 })),
    ];
    let edges = vec![edge("cross", "buy")];
    (nodes, edges)
}

pub fn compile_nodes(nodes: Vec<Value>, edges: Vec<Value>) -> CompileOutput {
    compile(&document(nodes, edges), &GenerationContext::default()).unwrap()
}

/// Byte offset of each needle, panicking with the needle when absent.
pub fn positions(source: &str, needles: &[&str]) -> Vec<usize> {
    needles
        .iter()
        .map(|n| {
            source
                .find(n)
                .unwrap_or_else(|| panic!("{n:?} missing from generated source"))
        })
        .collect()
}

pub fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn temp_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
