mod common;

use clap::Parser;
use common::*;
use eaforge::adapters::file_config_adapter::FileConfigAdapter;
use eaforge::adapters::ledger_file_adapter::{FileChainStore, JsonlEventLog};
use eaforge::cli::{Cli, build_generation_context, load_inputs, run};
use eaforge::domain::context::GenerationContext;
use eaforge::domain::error::EaforgeError;
use eaforge::domain::track_record::chain::{ChainWriter, EventType};
use std::collections::BTreeMap;
use std::fs;
use std::process::ExitCode;
use tempfile::TempDir;

fn rsi_graph_file() -> tempfile::NamedTempFile {
    let (nodes, edges) = rsi_strategy();
    write_temp(&document_json(nodes, edges), ".json")
}

fn run_args(args: &[&str]) -> ExitCode {
    let mut argv = vec!["eaforge"];
    argv.extend_from_slice(args);
    run(Cli::try_parse_from(argv).unwrap())
}

mod compile_command {
    use super::*;

    #[test]
    fn writes_source_and_input_sheet() {
        let graph = rsi_graph_file();
        let dir = TempDir::new().unwrap();
        let out = temp_path(&dir, "build/RsiEa.mq5");
        let sheet = temp_path(&dir, "build/inputs.csv");

        let code = run_args(&[
            "compile",
            "--graph",
            &path_arg(graph.path()),
            "--output",
            &path_arg(&out),
            "--inputs-csv",
            &path_arg(&sheet),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let source = fs::read_to_string(&out).unwrap();
        assert!(source.contains("int OnInit()"));
        assert!(source.contains("iRSI(_Symbol"));

        let csv = fs::read_to_string(&sheet).unwrap();
        assert!(csv.lines().count() > 1);
        assert!(csv.contains("InpInd0Period"));
    }

    #[test]
    fn config_file_overrides_document() {
        let graph = rsi_graph_file();
        let config = write_temp(
            "[generator]\nea_name = Ini Name\nmagic_number = 9090\n\n[multi_pair]\nenabled = true\nsymbols = usdjpy, audusd\n",
            ".ini",
        );
        let dir = TempDir::new().unwrap();
        let out = temp_path(&dir, "ea.mq5");

        let code = run_args(&[
            "compile",
            "-g",
            &path_arg(graph.path()),
            "-c",
            &path_arg(config.path()),
            "-o",
            &path_arg(&out),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);

        let source = fs::read_to_string(&out).unwrap();
        assert!(source.contains("Ini Name.mq5"));
        assert!(source.contains("InpMagicNumber = 9090;"));
        assert!(source.contains("\"USDJPY,AUDUSD\""));
    }

    #[test]
    fn missing_graph_exits_with_io_code() {
        let code = run_args(&["compile", "--graph", "/nonexistent/graph.json"]);
        assert_eq!(code, ExitCode::from(1));
    }

    #[test]
    fn unknown_node_exits_with_document_code() {
        let graph = write_temp(
            &document_json(vec![node("x", "mystery", serde_json::json!({}))], vec![]),
            ".json",
        );
        let code = run_args(&["validate", "--graph", &path_arg(graph.path())]);
        assert_eq!(code, ExitCode::from(3));
    }

    #[test]
    fn invalid_settings_exit_with_config_code() {
        let graph = rsi_graph_file();
        let config = write_temp("[generator]\nmagic_number = -5\n", ".ini");
        let code = run_args(&[
            "validate",
            "--graph",
            &path_arg(graph.path()),
            "--config",
            &path_arg(config.path()),
        ]);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn inputs_command_succeeds() {
        let graph = rsi_graph_file();
        assert_eq!(
            run_args(&["inputs", "--graph", &path_arg(graph.path())]),
            ExitCode::SUCCESS
        );
    }
}

mod settings {
    use super::*;

    #[test]
    fn load_inputs_without_config_keeps_document() {
        let (nodes, edges) = rsi_strategy();
        let graph = write_temp(
            &document_with_settings(nodes, edges, serde_json::json!({ "eaName": "Doc EA" })),
            ".json",
        );
        let (document, ctx) = load_inputs(graph.path(), None).unwrap();
        assert_eq!(document.nodes.len(), 5);
        assert_eq!(ctx.ea_name, "Doc EA");
    }

    #[test]
    fn track_record_requires_instance_id() {
        let graph = rsi_graph_file();
        let config = write_temp("[track_record]\nurl = https://ledger.example.com\n", ".ini");
        let code = run_args(&[
            "validate",
            "--graph",
            &path_arg(graph.path()),
            "--config",
            &path_arg(config.path()),
        ]);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn empty_url_switches_pass_off() {
        let base = GenerationContext {
            telemetry: Some(Default::default()),
            ..Default::default()
        };
        let ini = FileConfigAdapter::from_string("[telemetry]\nurl =\n").unwrap();
        let ctx = build_generation_context(&base, &ini).unwrap();
        assert!(ctx.telemetry.is_none());
    }

    #[test]
    fn unreadable_config_is_parse_error() {
        let graph = rsi_graph_file();
        let err = load_inputs(graph.path(), Some(std::path::Path::new("/nonexistent/eaforge.ini")))
            .unwrap_err();
        assert!(matches!(err, EaforgeError::ConfigParse { .. }));
    }
}

mod verify_chain_command {
    use super::*;

    fn write_chain(dir: &TempDir, events: usize) -> std::path::PathBuf {
        let log = temp_path(dir, "events.jsonl");
        let mut writer = ChainWriter::open(
            "acct-7",
            JsonlEventLog::new(log.clone()),
            FileChainStore::new(temp_path(dir, "state.dat")),
            None,
        )
        .unwrap();
        for i in 0..events {
            let mut payload = BTreeMap::new();
            payload.insert("ticket".to_string(), (1000 + i).to_string());
            writer
                .emit(EventType::TradeOpen, 1_700_000_000 + i as i64, payload)
                .unwrap();
        }
        log
    }

    #[test]
    fn intact_chain_verifies() {
        let dir = TempDir::new().unwrap();
        let log = write_chain(&dir, 3);
        assert_eq!(
            run_args(&["verify-chain", "--events", &path_arg(&log)]),
            ExitCode::SUCCESS
        );
    }

    #[test]
    fn tampered_chain_exits_with_chain_code() {
        let dir = TempDir::new().unwrap();
        let log = write_chain(&dir, 3);
        let text = fs::read_to_string(&log).unwrap();
        fs::write(&log, text.replace("\"1001\"", "\"9999\"")).unwrap();
        assert_eq!(
            run_args(&["verify-chain", "--events", &path_arg(&log)]),
            ExitCode::from(5)
        );
    }

    #[test]
    fn empty_log_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = temp_path(&dir, "events.jsonl");
        fs::write(&log, "").unwrap();
        assert_eq!(
            run_args(&["verify-chain", "--events", &path_arg(&log)]),
            ExitCode::SUCCESS
        );
    }
}
