use std::time::Duration;

use crate::error::Result;

use super::env::EnvConfig;

pub const BEHAVIOUR_INTERVAL_VAR: &str = "AUTOGENTS_BEHAVIOUR_INTERVAL_MS";
pub const RUNTIME_VAR: &str = "AUTOGENTS_RUNTIME_MS";

/// Timing knobs for scenarios that drive agents for a bounded time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Pause a periodic behaviour takes between emissions.
    pub behaviour_interval: Duration,
    /// How long the scenario lets agents run before cancelling them.
    pub runtime: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            behaviour_interval: Duration::from_secs(2),
            runtime: Duration::from_secs(20),
        }
    }
}

impl RuntimeSettings {
    /// Defaults overridden by `AUTOGENTS_BEHAVIOUR_INTERVAL_MS` and
    /// `AUTOGENTS_RUNTIME_MS`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            behaviour_interval: EnvConfig::get_duration_ms(BEHAVIOUR_INTERVAL_VAR)?
                .unwrap_or(defaults.behaviour_interval),
            runtime: EnvConfig::get_duration_ms(RUNTIME_VAR)?.unwrap_or(defaults.runtime),
        })
    }

    pub fn with_behaviour_interval(mut self, interval: Duration) -> Self {
        self.behaviour_interval = interval;
        self
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    /// Emissions a single periodic behaviour completes within `runtime`.
    pub fn expected_emissions(&self) -> u64 {
        if self.behaviour_interval.is_zero() {
            return 0;
        }
        (self.runtime.as_millis() / self.behaviour_interval.as_millis().max(1)) as u64
    }
}
