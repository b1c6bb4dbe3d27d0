//! Core types for the event store
//!
//! This crate defines the foundational types used throughout the system:
//! - LogLevel: ordered severity levels
//! - SessionContext: explicit per-event session identity
//! - ThrowableInfo: structured, depth-capped error chains
//! - LogRecord: immutable committed event and its persisted encoding
//! - PendingMessage: pre-commit event with a lazily evaluated body
//! - RecordFormat: plain-text and JSON-lines rendering
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod format;
pub mod level;
pub mod limits;
pub mod pending;
pub mod record;
pub mod throwable;

pub use context::SessionContext;
pub use error::{Error, Result};
pub use format::RecordFormat;
pub use level::{LogLevel, ParseLevelError};
pub use pending::{PendingMessage, UNAVAILABLE_MESSAGE};
pub use record::{LogRecord, LogRecordBuilder, RECORD_FORMAT_VERSION};
pub use throwable::ThrowableInfo;
