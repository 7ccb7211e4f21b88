use serde::Deserialize;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_KIND: &str = "job";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Buffer of the lifecycle event channel. Slow subscribers lag, they never
    /// block the registry.
    pub event_capacity: usize,
    /// Kind label for jobs submitted without one.
    pub default_kind: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            default_kind: DEFAULT_KIND.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Reads `JOBREG_EVENT_CAPACITY` and `JOBREG_DEFAULT_KIND`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = RegistryConfig::default();

        if let Some(raw) = lookup("JOBREG_EVENT_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.event_capacity = capacity,
                _ => tracing::warn!(
                    value = %raw,
                    fallback = DEFAULT_EVENT_CAPACITY,
                    "Invalid JOBREG_EVENT_CAPACITY"
                ),
            }
        }

        if let Some(kind) = lookup("JOBREG_DEFAULT_KIND") {
            let kind = kind.trim();
            if kind.is_empty() {
                tracing::warn!(fallback = DEFAULT_KIND, "Empty JOBREG_DEFAULT_KIND");
            } else {
                config.default_kind = kind.to_string();
            }
        }

        config
    }
}
