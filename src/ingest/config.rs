use crate::core::{IngestError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default cap on intents collected before failing an evaluation
pub const DEFAULT_MAX_INTENTS: usize = 5000;

pub const ENV_MAX_INTENTS: &str = "KVINGEST_MAX_INTENTS";
pub const ENV_VERIFY: &str = "KVINGEST_VERIFY";

/// Evaluation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Maximum number of intents collected before failing (0 means no limit)
    pub max_intents: usize,

    /// Run expensive self-checks: file timestamp assertions and recomputation
    /// of precomputed stats on the checked path
    pub verify: bool,
}

impl IngestSettings {
    pub fn new() -> Self {
        Self {
            max_intents: DEFAULT_MAX_INTENTS,
            verify: cfg!(debug_assertions),
        }
    }

    /// Set the intent limit
    pub fn max_intents(mut self, max: usize) -> Self {
        self.max_intents = max;
        self
    }

    /// Enable or disable verification
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Defaults overridden by `KVINGEST_MAX_INTENTS` and `KVINGEST_VERIFY`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::new();
        if let Some(raw) = lookup(ENV_MAX_INTENTS) {
            settings.max_intents = raw.trim().parse().map_err(|_| {
                IngestError::InvalidRequest(format!("{} must be an integer, got '{}'", ENV_MAX_INTENTS, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_VERIFY) {
            settings.verify = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(IngestError::InvalidRequest(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_VERIFY, raw
                    )));
                }
            };
        }
        Ok(settings)
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared flag a surrounding context flips to abort in-flight evaluations
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-invocation evaluation context
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    settings: IngestSettings,
    cancel: CancellationFlag,
}

impl EvalContext {
    pub fn new(settings: IngestSettings) -> Self {
        Self {
            settings,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(settings: IngestSettings, cancel: CancellationFlag) -> Self {
        Self { settings, cancel }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }
}
