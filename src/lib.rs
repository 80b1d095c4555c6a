//! Core library for the Calla scripting language: lexing, parsing,
//! tree-walking evaluation, diagnostics, and REPL utilities.

pub mod ast;
pub mod builtins;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stack;
pub mod value;

pub use diagnostics::{CallaError, Diagnostic, DiagnosticKind};
pub use repl::Repl;
pub use runtime::{Interpreter, RuntimeEvent, RuntimeOptions};
pub use value::Value;
