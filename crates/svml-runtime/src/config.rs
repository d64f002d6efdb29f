//! Compiler and interpreter configuration
//!
//! Plain serde structs, loadable from TOML (the CLI's `--limits`
//! file) or constructed in code. Every field has a default so partial
//! files work.

use serde::{Deserialize, Serialize};

/// Knobs consumed by the compiler's instrumentation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Run call-graph cycle detection (Tarjan) after compilation.
    pub enable_recursion_detection: bool,
    /// Derive per-function memoization flags. Requires recursion
    /// detection; without it no function is ever flagged.
    pub enable_memoization: bool,
    /// A recursive function with more parameters than this is never
    /// memoized.
    pub memo_param_threshold: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            enable_recursion_detection: true,
            enable_memoization: true,
            memo_param_threshold: 10,
        }
    }
}

impl CompileOptions {
    /// Options with memoization and recursion detection off.
    pub fn without_memoization() -> Self {
        Self {
            enable_recursion_detection: false,
            enable_memoization: false,
            ..Self::default()
        }
    }
}

/// Hard execution caps. Exceeding any cap is a fatal runtime error
/// naming the cap; there is no other cancellation mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunLimits {
    /// Maximum non-tail call depth.
    pub max_call_depth: usize,
    /// Maximum operand-stack size of a single frame.
    pub max_operand_stack: usize,
    /// Deterministic fuel bound on executed instructions.
    pub max_instructions: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 10_000,
            max_operand_stack: 65_536,
            max_instructions: 100_000_000,
        }
    }
}

/// Combined configuration file shape (`svml.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compile: CompileOptions,
    pub limits: RunLimits,
}

impl Config {
    /// Parse a TOML configuration string.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let limits = RunLimits::default();
        assert!(limits.max_call_depth >= 1_000);
        assert!(limits.max_operand_stack >= 1_024);
        let options = CompileOptions::default();
        assert!(options.enable_memoization);
        assert_eq!(options.memo_param_threshold, 10);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [limits]
            max_call_depth = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_call_depth, 64);
        assert_eq!(
            config.limits.max_instructions,
            RunLimits::default().max_instructions
        );
        assert!(config.compile.enable_memoization);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("[limits]\nmax_fuel = 3\n").is_err());
    }
}
