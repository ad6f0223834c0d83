//! Kernel build configuration.

use serde::{Deserialize, Serialize};

/// Environment variable holding extra compiler options, whitespace separated.
pub const ENV_COMPILER_OPTIONS: &str = "KERNELWEAVE_COMPILER_OPTIONS";

/// Environment variable enabling full-source trace logging (`1`/`true`/`yes`/`on`).
pub const ENV_TRACE_SOURCE: &str = "KERNELWEAVE_TRACE_SOURCE";

/// How kernels are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Options passed to the device compiler.
    pub compiler_options: Vec<String>,
    /// Reuse compiled programs through a shared program cache.
    pub cache_programs: bool,
    /// Log the full composed source at `trace` level.
    pub trace_source: bool,
    /// Fail calls on unbuilt kernels instead of building on first call.
    pub require_explicit_build: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler_options: Vec::new(),
            cache_programs: true,
            trace_source: false,
            require_explicit_build: false,
        }
    }
}

impl BuildConfig {
    /// Creates a debugging configuration: no caching, full source traced,
    /// and `-g` passed to the compiler.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            compiler_options: vec!["-g".to_string()],
            cache_programs: false,
            trace_source: true,
            require_explicit_build: false,
        }
    }

    /// Creates a configuration for latency-sensitive hosts: kernels must be
    /// built up front and math is relaxed.
    #[must_use]
    pub fn performance() -> Self {
        Self {
            compiler_options: vec![
                "-cl-fast-relaxed-math".to_string(),
                "-cl-mad-enable".to_string(),
            ],
            cache_programs: true,
            trace_source: false,
            require_explicit_build: true,
        }
    }

    /// Default configuration with environment overrides applied.
    ///
    /// `KERNELWEAVE_COMPILER_OPTIONS` is appended to the compiler options;
    /// `KERNELWEAVE_TRACE_SOURCE` sets [`BuildConfig::trace_source`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(options) = lookup(ENV_COMPILER_OPTIONS) {
            self.compiler_options
                .extend(options.split_whitespace().map(str::to_string));
        }
        if let Some(flag) = lookup(ENV_TRACE_SOURCE) {
            self.trace_source = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }

    /// Sets the compiler options.
    #[must_use]
    pub fn with_compiler_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compiler_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one compiler option.
    #[must_use]
    pub fn with_compiler_option(mut self, option: impl Into<String>) -> Self {
        self.compiler_options.push(option.into());
        self
    }

    /// Enables or disables program caching.
    #[must_use]
    pub fn with_cache_programs(mut self, enabled: bool) -> Self {
        self.cache_programs = enabled;
        self
    }

    /// Enables or disables source tracing.
    #[must_use]
    pub fn with_trace_source(mut self, enabled: bool) -> Self {
        self.trace_source = enabled;
        self
    }

    /// Requires `build()` before the first call.
    #[must_use]
    pub fn with_require_explicit_build(mut self, required: bool) -> Self {
        self.require_explicit_build = required;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert!(config.compiler_options.is_empty());
        assert!(config.cache_programs);
        assert!(!config.trace_source);
        assert!(!config.require_explicit_build);
    }

    #[test]
    fn test_overrides() {
        let config = BuildConfig::default()
            .with_compiler_option("-Werror")
            .with_overrides(lookup(&[
                (ENV_COMPILER_OPTIONS, " -cl-std=CL1.2   -cl-mad-enable "),
                (ENV_TRACE_SOURCE, "Yes"),
            ]));
        assert_eq!(
            config.compiler_options,
            vec!["-Werror", "-cl-std=CL1.2", "-cl-mad-enable"]
        );
        assert!(config.trace_source);

        let off = BuildConfig::debug().with_overrides(lookup(&[(ENV_TRACE_SOURCE, "0")]));
        assert!(!off.trace_source);
    }

    #[test]
    fn test_missing_overrides_keep_values() {
        let config = BuildConfig::performance().with_overrides(lookup(&[]));
        assert_eq!(config, BuildConfig::performance());
    }

    #[test]
    fn test_builders() {
        let config = BuildConfig::default()
            .with_compiler_options(["-cl-std=CL2.0"])
            .with_cache_programs(false)
            .with_trace_source(true)
            .with_require_explicit_build(true);
        assert_eq!(config.compiler_options, vec!["-cl-std=CL2.0"]);
        assert!(!config.cache_programs);
        assert!(config.trace_source);
        assert!(config.require_explicit_build);
    }
}
