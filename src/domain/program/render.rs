//! MQL5 source rendering.
//!
//! Output is a pure function of the program: no timestamps, no host data.

use std::fmt::Write;

use super::{Program, Stmt};

const INDENT: &str = "   ";
const RULE: &str = "//+------------------------------------------------------------------+";

fn write_stmts(out: &mut String, stmts: &[Stmt]) {
    for stmt in stmts {
        let text = stmt.line.render();
        if text.is_empty() {
            out.push('\n');
            continue;
        }
        for _ in 0..=stmt.depth {
            out.push_str(INDENT);
        }
        out.push_str(&text);
        out.push('\n');
    }
}

pub fn render(program: &Program) -> String {
    let mut out = String::new();
    let name = program.name();

    writeln!(out, "{}", RULE).ok();
    writeln!(out, "//| {:<64} |", format!("{}.mq5", name)).ok();
    writeln!(out, "//| {:<64} |", "Generated by eaforge").ok();
    writeln!(out, "{}", RULE).ok();
    writeln!(out, "#property copyright \"Generated by eaforge\"").ok();
    writeln!(out, "#property version   \"1.00\"").ok();
    writeln!(out, "#property description \"{}\"", name).ok();
    writeln!(out).ok();
    writeln!(out, "#include <Trade/Trade.mqh>").ok();
    writeln!(out).ok();

    writeln!(out, "//--- Inputs").ok();
    let mut current_group: Option<&str> = None;
    for input in program.inputs() {
        if current_group != Some(input.group.as_str()) {
            if current_group.is_some() {
                writeln!(out).ok();
            }
            if !input.group.is_empty() {
                writeln!(out, "input group \"{}\"", input.group).ok();
            }
            current_group = Some(input.group.as_str());
        }
        writeln!(out, "{}", input.render()).ok();
    }
    writeln!(out).ok();

    writeln!(out, "//--- Globals").ok();
    for decl in program.globals() {
        writeln!(out, "{}", decl.render()).ok();
    }
    writeln!(out).ok();

    writeln!(out, "{}", RULE).ok();
    writeln!(out, "int OnInit()").ok();
    writeln!(out, "{{").ok();
    write_stmts(&mut out, program.init());
    writeln!(out, "{}return(INIT_SUCCEEDED);", INDENT).ok();
    writeln!(out, "}}").ok();
    writeln!(out).ok();

    writeln!(out, "{}", RULE).ok();
    writeln!(out, "void OnTick()").ok();
    writeln!(out, "{{").ok();
    write_stmts(&mut out, program.tick());
    writeln!(out, "}}").ok();
    writeln!(out).ok();

    writeln!(out, "{}", RULE).ok();
    writeln!(out, "void OnDeinit(const int reason)").ok();
    writeln!(out, "{{").ok();
    write_stmts(&mut out, program.teardown());
    writeln!(out, "}}").ok();

    for helper in program.helpers() {
        writeln!(out).ok();
        writeln!(out, "{}", RULE).ok();
        for line in &helper.lines {
            writeln!(out, "{}", line.render()).ok();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::{
        Decl, DeclaredInput, Helper, InputType, NameRegistry, Program, Stmt,
    };

    fn sample() -> Program {
        let mut p = Program::new("Sample", NameRegistry::new());
        p.push_input(
            DeclaredInput::new("InpMagicNumber", InputType::Long, "7", "Magic number")
                .in_group("General"),
        );
        p.push_input(
            DeclaredInput::new("InpInd0Period", InputType::Int, "14", "Period")
                .in_group("RSI #1")
                .optimizable(true),
        );
        p.push_global(Decl::Handle("ind0Handle".into()));
        p.push_init(Stmt::create_handle(
            "ind0Handle",
            "@ind0Handle = iRSI($SYMBOL, PERIOD_CURRENT, InpInd0Period, PRICE_CLOSE);",
        ));
        p.push_tick(Stmt::plain(0, "if(x)"));
        p.push_tick(Stmt::plain(1, "$EXIT;"));
        p.push_teardown(Stmt::release_handle("ind0Handle"));
        p.push_helper(Helper::new("Noop", "void Noop()\n{\n}"));
        p
    }

    #[test]
    fn renders_groups_and_regions() {
        let src = sample().render();
        assert!(src.contains("input group \"General\"\nsinput long InpMagicNumber = 7;"));
        assert!(src.contains("input group \"RSI #1\"\ninput int InpInd0Period = 14;"));
        assert!(src.contains("int ind0Handle = INVALID_HANDLE;"));
        assert!(src.contains("   ind0Handle = iRSI(_Symbol, PERIOD_CURRENT"));
        assert!(src.contains("   if(x)\n      return;\n"));
        assert!(src.contains("void OnDeinit(const int reason)\n{\n   if(ind0Handle != INVALID_HANDLE)"));
        assert!(src.ends_with("void Noop()\n{\n}\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(sample().render(), sample().render());
    }
}
