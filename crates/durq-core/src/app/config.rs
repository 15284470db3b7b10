//! QueueConfig - recognised options, loadable from `DURQ_*` environment
//! variables.
//!
//! | variable                  | field                | default          |
//! |---------------------------|----------------------|------------------|
//! | `DURQ_MAX_SIZE`           | `max_size`           | 200              |
//! | `DURQ_MAX_ATTEMPTS`       | `max_attempts`       | 3                |
//! | `DURQ_TABLE`              | `table`              | `durq_messages`  |
//! | `DURQ_MESSAGE_TYPE`       | `message_type`       | message's `TYPE` |
//! | `DURQ_DATABASE_URL`       | `database_url`       | in-memory        |
//! | `DURQ_RELOAD_INTERVAL_MS` | `reload_interval_ms` | disabled         |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DurqError;
use crate::impls::is_valid_table_name;
use crate::queue::RetryPolicy;

pub const DEFAULT_MAX_SIZE: usize = 200;
pub const DEFAULT_TABLE: &str = "durq_messages";
pub const ENV_PREFIX: &str = "DURQ_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the in-memory queue.
    pub max_size: usize,
    /// Failed attempts before a message is dead.
    pub max_attempts: u32,
    /// Table holding the durable records.
    pub table: String,
    /// Codec to decode stored payloads with.
    pub message_type: Option<String>,
    /// SQLite database file.
    pub database_url: Option<String>,
    /// Period of the background reload pass.
    pub reload_interval_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            table: DEFAULT_TABLE.to_string(),
            message_type: None,
            database_url: None,
            reload_interval_ms: None,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, DurqError> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .map_err(|e| DurqError::InvalidConfig(e.to_string()))
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Result<Self, DurqError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, Self>(vars)
            .map_err(|e| DurqError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), DurqError> {
        if self.max_size == 0 {
            return Err(DurqError::InvalidConfig("max_size must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(DurqError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !is_valid_table_name(&self.table) {
            return Err(DurqError::InvalidConfig(format!(
                "table {:?} is not a plain identifier",
                self.table
            )));
        }
        if self.reload_interval_ms == Some(0) {
            return Err(DurqError::InvalidConfig(
                "reload_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        self.reload_interval_ms.map(Duration::from_millis)
    }
}
