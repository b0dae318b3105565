//! Runtime settings.

use core::time::Duration;
use log::warn;
use std::env;
use trellis_program::PAGE_SIZE;

/// Knobs shared by every render driven through one [`crate::Runtime`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Ignore cache-group guards when revalidating.
    pub always_revalidate: bool,
    /// How long the render loop waits to coalesce writes.
    pub debounce: Duration,
    /// Growth step of the program heap, in words.
    pub heap_page_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            always_revalidate: false,
            debounce: Duration::from_millis(16),
            heap_page_size: PAGE_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Read `TRELLIS_ALWAYS_REVALIDATE`, `TRELLIS_DEBOUNCE_MS` and
    /// `TRELLIS_HEAP_PAGE_SIZE`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`RuntimeConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("TRELLIS_ALWAYS_REVALIDATE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.always_revalidate = true,
                "0" | "false" | "no" | "off" | "" => config.always_revalidate = false,
                other => warn!(target: "trellis::config", "ignoring TRELLIS_ALWAYS_REVALIDATE={other}"),
            }
        }
        if let Some(raw) = lookup("TRELLIS_DEBOUNCE_MS") {
            match raw.trim().parse::<u64>() {
                Ok(millis) => config.debounce = Duration::from_millis(millis),
                Err(error) => warn!(target: "trellis::config", "ignoring TRELLIS_DEBOUNCE_MS={raw}: {error}"),
            }
        }
        if let Some(raw) = lookup("TRELLIS_HEAP_PAGE_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.heap_page_size = size,
                Ok(_) => warn!(target: "trellis::config", "ignoring zero TRELLIS_HEAP_PAGE_SIZE"),
                Err(error) => warn!(target: "trellis::config", "ignoring TRELLIS_HEAP_PAGE_SIZE={raw}: {error}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// Test reading every variable.
    ///
    /// # Panics
    /// Panics if a variable is ignored.
    #[test]
    fn reads_variables() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("TRELLIS_ALWAYS_REVALIDATE", "true"),
            ("TRELLIS_DEBOUNCE_MS", "5"),
            ("TRELLIS_HEAP_PAGE_SIZE", "64"),
        ]));
        assert!(config.always_revalidate);
        assert_eq!(config.debounce, Duration::from_millis(5));
        assert_eq!(config.heap_page_size, 64);
    }

    /// Test that bad values keep the defaults.
    ///
    /// # Panics
    /// Panics if a malformed value is applied.
    #[test]
    fn bad_values_keep_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("TRELLIS_ALWAYS_REVALIDATE", "maybe"),
            ("TRELLIS_DEBOUNCE_MS", "soon"),
            ("TRELLIS_HEAP_PAGE_SIZE", "0"),
        ]));
        assert_eq!(config, RuntimeConfig::default());
    }
}
