//! Settings shared with the host migration framework.
//!
//! [`SharedSettings`] carries the bookkeeping collection names and the dry-run flag.
//! [`CommandLogger`] receives every call descriptor before it is dispatched.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::command::CallDescriptor;

fn default_migration_table() -> String {
    "migrations".to_string()
}

fn default_seed_table() -> String {
    "seeds".to_string()
}

/// Settings owned by the host framework and shared with the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSettings {
    /// Collection logging applied migrations.
    #[serde(default = "default_migration_table")]
    pub migration_table: String,
    /// Collection logging applied seeds.
    #[serde(default = "default_seed_table")]
    pub seed_table: String,
    /// When set, every command except handle retention succeeds without touching the engine.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            migration_table: default_migration_table(),
            seed_table: default_seed_table(),
            dry_run: false,
        }
    }
}

impl SharedSettings {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Structured sink for dispatched calls.
///
/// Called with the raw call descriptor before every dispatch, dry run included.
pub trait CommandLogger: Send + Sync + Debug {
    fn log_command(&self, call: &CallDescriptor);
}

/// Emits each call as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl CommandLogger for TracingLogger {
    fn log_command(&self, call: &CallDescriptor) {
        tracing::info!(
            command = %call.command,
            target = call.target.as_deref().unwrap_or(""),
            options = %call.options.as_ref().map(ToString::to_string).unwrap_or_default(),
            "dispatching command"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl CommandLogger for NoopLogger {
    fn log_command(&self, _call: &CallDescriptor) {}
}
