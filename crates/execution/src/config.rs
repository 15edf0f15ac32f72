//! Per-execution settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::ConfigError;

/// Where the engine future runs once [`execute`](crate::ExecutionContext::execute)
/// is called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduling {
    /// Spawned onto the current tokio runtime.
    #[default]
    Io,
    /// Polled by the returned [`ExecutionHandle`](crate::ExecutionHandle) itself.
    Inline,
}

/// Settings that apply to one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Where the engine runs.
    #[serde(default)]
    pub scheduling: Scheduling,
    /// Events buffered per subscriber on every event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Maximum wall-clock time for the whole execution.
    #[serde(default, with = "crate::serde_duration_opt")]
    pub timeout: Option<Duration>,
    /// Maximum number of operations running at the same time.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_operations: usize,
}

/// Largest buffer a tokio broadcast channel accepts.
const MAX_EVENT_CAPACITY: usize = usize::MAX >> 1;

fn default_event_capacity() -> usize {
    256
}

fn default_max_parallel() -> usize {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            scheduling: Scheduling::default(),
            event_capacity: default_event_capacity(),
            timeout: None,
            max_parallel_operations: default_max_parallel(),
        }
    }
}

impl ExecutionConfig {
    /// Set the scheduling mode.
    #[must_use]
    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    /// Set the per-subscriber event buffer.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the operation parallelism.
    #[must_use]
    pub fn with_max_parallel_operations(mut self, max: usize) -> Self {
        self.max_parallel_operations = max;
        self
    }

    /// Reject settings no execution can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(ConfigError::EventCapacityTooLarge {
                max: MAX_EVENT_CAPACITY,
            });
        }
        if self.max_parallel_operations == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.max_parallel_operations > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooManyParallelOperations {
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(())
    }
}
