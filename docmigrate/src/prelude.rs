//! Convenient re-exports of commonly used types from docmigrate.
//!
//! ```ignore
//! use docmigrate::prelude::*;
//! ```

pub use docmigrate_core::{
    backend::{Connection, Connector},
    command::{CallDescriptor, Command, FindQuery, IndexColumns, IndexInfo, IndexSpec, Outcome, Records, UpdateFlags, UpdateSpec, UpdateSummary},
    config::{Configuration, HostEntry, HostSpec},
    dispatcher::Dispatcher,
    driver::{MigrationDriver, RunRecord, connect, connect_with_logger},
    error::{DriverError, DriverResult},
    settings::{CommandLogger, NoopLogger, SharedSettings, TracingLogger},
    uri::ConnectionUri,
};
