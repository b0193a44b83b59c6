//! Program representation.
//!
//! A program is a set of append-only regions (inputs, globals, init, tick,
//! teardown, helpers) plus a few scalars. Statements carry a [`Role`] so
//! later passes can tell handle creation, validation, series setup and
//! release apart without inspecting text.

pub mod line;
pub mod names;
pub mod render;

pub use line::{Line, Piece};
pub use names::NameRegistry;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Plain,
    /// Creates the indicator handle with the given global name.
    CreateHandle(String),
    /// Aborts init when the handle is invalid.
    ValidateHandle { handle: String, message: String },
    /// `ArraySetAsSeries` and similar buffer setup that is symbol independent.
    SeriesSetup,
    ReleaseHandle(String),
    /// Header of the consolidated position-management loop.
    ManagementLoop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub depth: usize,
    pub line: Line,
    pub role: Role,
}

impl Stmt {
    pub fn plain(depth: usize, template: &str) -> Self {
        Self {
            depth,
            line: Line::parse(template),
            role: Role::Plain,
        }
    }

    pub fn with_role(depth: usize, template: &str, role: Role) -> Self {
        Self {
            depth,
            line: Line::parse(template),
            role,
        }
    }

    /// `@handle = <template>;` style handle creation.
    pub fn create_handle(handle: &str, template: &str) -> Self {
        Self::with_role(0, template, Role::CreateHandle(handle.to_string()))
    }

    pub fn validate_handle(handle: &str, message: &str) -> Self {
        Self {
            depth: 0,
            line: validation_line(handle, message, false),
            role: Role::ValidateHandle {
                handle: handle.to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn series_setup(template: &str) -> Self {
        Self::with_role(0, template, Role::SeriesSetup)
    }

    pub fn release_handle(handle: &str) -> Self {
        Self::with_role(
            0,
            &format!("if(@{h} != INVALID_HANDLE) IndicatorRelease(@{h});", h = handle),
            Role::ReleaseHandle(handle.to_string()),
        )
    }

    pub fn indented(mut self, by: usize) -> Self {
        self.depth += by;
        self
    }
}

/// Handle check that fails init. With `per_symbol` the failing symbol is
/// appended to the log line.
pub fn validation_line(handle: &str, message: &str, per_symbol: bool) -> Line {
    let suffix = if per_symbol { ", \" for \", $SYMBOL" } else { "" };
    Line::parse(&format!(
        "if(@{} == INVALID_HANDLE) {{ Print(\"{}\"{}); return(INIT_FAILED); }}",
        handle, message, suffix
    ))
}

/// Global declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// `int name = INVALID_HANDLE;`
    Handle(String),
    /// `int name[];` after the multi-pair rewrite.
    HandleArray(String),
    /// Per-symbol mutable state such as the last processed bar time.
    SymbolState { ty: String, name: String, init: String },
    SymbolStateArray { ty: String, name: String, init: String },
    /// Anything else, rendered verbatim.
    Plain(String),
}

impl Decl {
    pub fn state(ty: &str, name: &str, init: &str) -> Self {
        Decl::SymbolState {
            ty: ty.to_string(),
            name: name.to_string(),
            init: init.to_string(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Decl::Plain(text.into())
    }

    pub fn render(&self) -> String {
        match self {
            Decl::Handle(name) => format!("int {} = INVALID_HANDLE;", name),
            Decl::HandleArray(name) => format!("int {}[];", name),
            Decl::SymbolState { ty, name, init } => format!("{} {} = {};", ty, name, init),
            Decl::SymbolStateArray { ty, name, .. } => format!("{} {}[];", ty, name),
            Decl::Plain(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helper {
    pub name: String,
    pub lines: Vec<Line>,
}

impl Helper {
    /// Build a helper from a function body; every line is parsed for sigils.
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            lines: body.lines().map(Line::parse).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputType {
    Int,
    Long,
    Double,
    Bool,
    String,
    Timeframe,
    MaMethod,
    AppliedPrice,
}

impl InputType {
    pub fn mql(self) -> &'static str {
        match self {
            InputType::Int => "int",
            InputType::Long => "long",
            InputType::Double => "double",
            InputType::Bool => "bool",
            InputType::String => "string",
            InputType::Timeframe => "ENUM_TIMEFRAMES",
            InputType::MaMethod => "ENUM_MA_METHOD",
            InputType::AppliedPrice => "ENUM_APPLIED_PRICE",
        }
    }
}

/// One user-facing parameter of the generated program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredInput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: InputType,
    pub default_value: String,
    pub comment: String,
    pub group: String,
    pub optimizable: bool,
}

impl DeclaredInput {
    pub fn new(name: &str, ty: InputType, default_value: impl Into<String>, comment: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            default_value: default_value.into(),
            comment: comment.to_string(),
            group: String::new(),
            optimizable: false,
        }
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn optimizable(mut self, optimizable: bool) -> Self {
        self.optimizable = optimizable;
        self
    }

    pub fn render(&self) -> String {
        let keyword = if self.optimizable { "input" } else { "sinput" };
        format!(
            "{} {} {} = {}; // {}",
            keyword,
            self.ty.mql(),
            self.name,
            self.default_value,
            self.comment
        )
    }
}

/// Format a float the way it should appear in MQL5 source.
pub fn fmt_f64(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Quote a string literal for MQL5 source.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLossKind {
    Fixed,
    Percent,
    Atr,
    RangeOpposite,
    Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeProfitKind {
    Fixed,
    RiskReward,
    Atr,
}

/// Transform passes that have already run over a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedPasses {
    pub multi_pair: bool,
    pub telemetry: bool,
    pub track_record: bool,
}

/// Regions and scalars of a program, by value.
#[derive(Debug, Clone, Default)]
pub struct ProgramParts {
    pub name: String,
    pub inputs: Vec<DeclaredInput>,
    pub globals: Vec<Decl>,
    pub init: Vec<Stmt>,
    pub tick: Vec<Stmt>,
    pub teardown: Vec<Stmt>,
    pub helpers: Vec<Helper>,
    pub max_lookback: usize,
    pub stop_loss: Option<StopLossKind>,
    pub take_profit: Option<TakeProfitKind>,
    pub names: NameRegistry,
    pub passes: AppliedPasses,
}

#[derive(Debug, Clone)]
pub struct Program {
    parts: ProgramParts,
}

impl Program {
    pub fn new(name: &str, names: NameRegistry) -> Self {
        Self {
            parts: ProgramParts {
                name: name.to_string(),
                names,
                ..Default::default()
            },
        }
    }

    pub fn from_parts(parts: ProgramParts) -> Self {
        Self { parts }
    }

    pub fn into_parts(self) -> ProgramParts {
        self.parts
    }

    pub fn name(&self) -> &str {
        &self.parts.name
    }

    pub fn inputs(&self) -> &[DeclaredInput] {
        &self.parts.inputs
    }

    pub fn globals(&self) -> &[Decl] {
        &self.parts.globals
    }

    pub fn init(&self) -> &[Stmt] {
        &self.parts.init
    }

    pub fn tick(&self) -> &[Stmt] {
        &self.parts.tick
    }

    pub fn teardown(&self) -> &[Stmt] {
        &self.parts.teardown
    }

    pub fn helpers(&self) -> &[Helper] {
        &self.parts.helpers
    }

    pub fn helper(&self, name: &str) -> Option<&Helper> {
        self.parts.helpers.iter().find(|h| h.name == name)
    }

    pub fn max_lookback(&self) -> usize {
        self.parts.max_lookback
    }

    pub fn set_max_lookback(&mut self, bars: usize) {
        self.parts.max_lookback = self.parts.max_lookback.max(bars);
    }

    pub fn stop_loss(&self) -> Option<StopLossKind> {
        self.parts.stop_loss
    }

    pub fn take_profit(&self) -> Option<TakeProfitKind> {
        self.parts.take_profit
    }

    pub fn set_risk_methods(&mut self, sl: Option<StopLossKind>, tp: Option<TakeProfitKind>) {
        self.parts.stop_loss = sl;
        self.parts.take_profit = tp;
    }

    pub fn passes(&self) -> AppliedPasses {
        self.parts.passes
    }

    pub fn passes_mut(&mut self) -> &mut AppliedPasses {
        &mut self.parts.passes
    }

    pub fn names_mut(&mut self) -> &mut NameRegistry {
        &mut self.parts.names
    }

    pub fn push_input(&mut self, input: DeclaredInput) {
        debug_assert!(
            !self.parts.inputs.iter().any(|i| i.name == input.name),
            "duplicate input {}",
            input.name
        );
        self.parts.inputs.push(input);
    }

    pub fn push_global(&mut self, decl: Decl) {
        self.parts.globals.push(decl);
    }

    pub fn push_init(&mut self, stmt: Stmt) {
        self.parts.init.push(stmt);
    }

    pub fn push_tick(&mut self, stmt: Stmt) {
        self.parts.tick.push(stmt);
    }

    /// Add a statement ahead of the existing tick body. Existing statements
    /// keep their relative order, so early exits in the body cannot skip it.
    pub fn prepend_tick(&mut self, stmt: Stmt) {
        self.parts.tick.insert(0, stmt);
    }

    pub fn push_teardown(&mut self, stmt: Stmt) {
        self.parts.teardown.push(stmt);
    }

    /// Add a helper unless one with the same name already exists.
    /// Returns whether it was added.
    pub fn push_helper(&mut self, helper: Helper) -> bool {
        if self.helper(&helper.name).is_some() {
            return false;
        }
        self.parts.helpers.push(helper);
        true
    }

    pub fn render(&self) -> String {
        render::render(self)
    }
}
