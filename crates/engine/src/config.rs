use serde::Deserialize;

use crate::broadcast::SignalChannel;
use crate::error::EngineError;

pub const DEFAULT_NAMESPACE: &str = "tabsync";
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_LOCK_ACTION: &str = "edit";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every slot name in the shared store.
    pub namespace: String,
    /// Quiet period after the last foreign signal before a bootstrap runs.
    pub debounce_ms: u64,
    /// Action tag in lock resource keys.
    pub lock_action: String,
    /// Signals buffered per tab before its receiver lags.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            lock_action: DEFAULT_LOCK_ACTION.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// A channel for the tabs sharing one store. Hand a clone to each engine.
    pub fn signal_channel(&self) -> SignalChannel {
        SignalChannel::new(self.channel_capacity)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.namespace.is_empty() {
            return Err(EngineError::Config("namespace must not be empty".into()));
        }
        if self.lock_action.is_empty() {
            return Err(EngineError::Config("lock_action must not be empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(EngineError::Config("channel_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
