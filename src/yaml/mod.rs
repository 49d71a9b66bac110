//! YAML handling utilities

pub mod diagnostics;

pub use diagnostics::YamlSyntaxError;
