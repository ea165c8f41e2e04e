use std::str::FromStr;

fn env_override<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| T::from_str(&s).ok())
}

fn default_unbounded_trip_count() -> u64 {
    i64::MAX as u64 - 1
}

/// Settings of a [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, serde::Deserialize, derive_new::new)]
pub struct RuntimeConfig {
    /// Trip count used by loops started without an explicit bound.
    #[serde(default = "default_unbounded_trip_count")]
    pub unbounded_trip_count: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unbounded_trip_count: default_unbounded_trip_count(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by `SLUICE_UNBOUNDED_TRIP_COUNT` when set.
    pub fn from_env() -> Self {
        match env_override::<u64>("SLUICE_UNBOUNDED_TRIP_COUNT") {
            Some(x) if x > 0 => Self::new(x),
            Some(_) | None => Self::default(),
        }
    }
}

/// Settings of the reference CPU backend.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, derive_new::new)]
pub struct CpuBackendConfig {
    /// Upper bound on bytes held by live bases; unlimited when absent.
    #[serde(default)]
    pub memory_limit: Option<usize>,
}

impl CpuBackendConfig {
    /// Defaults, overridden by `SLUICE_MEMORY_LIMIT` (bytes) when set.
    pub fn from_env() -> Self {
        Self::new(env_override("SLUICE_MEMORY_LIMIT"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let rt: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(rt, RuntimeConfig::default());
        assert_eq!(rt.unbounded_trip_count, i64::MAX as u64 - 1);

        let cpu: CpuBackendConfig = serde_json::from_str(r#"{"memory_limit": 1024}"#).unwrap();
        assert_eq!(cpu.memory_limit, Some(1024));
    }
}
