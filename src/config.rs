//! Translator policy configuration.

use serde::Deserialize;

/// Policy flags for one translation. Defaults match the production policy:
/// instrumentation off, lazy resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorOptions {
    /// Insert counter templates at backward-branch targets.
    pub hotpath_counters: bool,
    /// Build a method profile and emit entry-counter instrumentation.
    pub method_profiling: bool,
    /// Emit a trace template at method entry.
    pub trace_methods: bool,
    /// Force symbolic resolution during translation instead of relying on
    /// lazy resolution-guard templates. Resolution failures still fall back
    /// to the guard path.
    pub eager_resolution: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            hotpath_counters: false,
            method_profiling: false,
            trace_methods: false,
            eager_resolution: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_production_policy() {
        let options = TranslatorOptions::default();
        assert!(!options.hotpath_counters);
        assert!(!options.method_profiling);
        assert!(!options.trace_methods);
        assert!(!options.eager_resolution);
    }

    #[test]
    fn test_toml_roundtrip() {
        let options: TranslatorOptions =
            toml::from_str("hotpath_counters = true\neager_resolution = true\n").unwrap();
        assert!(options.hotpath_counters);
        assert!(options.eager_resolution);
        assert!(!options.method_profiling);
    }
}
