//! Tracing integration
//!
//! [`StoreLayer`] forwards application `tracing` events into an
//! [`EventLogStore`]. Session identity travels with each event as explicit
//! fields rather than through ambient thread state:
//!
//! ```ignore
//! tracing::info!(username = "alice", source_address = "10.0.0.7", "password changed");
//! ```
//!
//! Recognised fields are `session_id`, `request_id`, `username`, `domain`
//! and `source_address`; `message` becomes the body and any other field is
//! appended to it as `key=value`. Events from the store's own targets are
//! ignored so the store never records its diagnostics about itself.

use eventstore_core::{LogLevel, PendingMessage, SessionContext};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::store::EventLogStore;

/// Target prefix of the store's own diagnostics
const INTERNAL_TARGET_PREFIX: &str = "eventstore";

/// Layer that records tracing events in an event store
pub struct StoreLayer {
    store: Arc<EventLogStore>,
}

impl StoreLayer {
    /// Forward events into `store`
    pub fn new(store: Arc<EventLogStore>) -> Self {
        Self { store }
    }
}

fn map_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    extra: String,
    context: SessionContext,
}

impl EventVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "session_id" => self.context.session_id = value,
            "request_id" => self.context.request_id = value,
            "username" => self.context.username = value,
            "domain" => self.context.domain = value,
            "source_address" => self.context.source_address = value,
            name => {
                let _ = write!(self.extra, " {}={}", name, value);
            }
        }
    }

    fn into_body(self) -> (String, SessionContext) {
        let mut body = self.message;
        body.push_str(&self.extra);
        (body, self.context)
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

impl<S> Layer<S> for StoreLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }
        let level = map_level(metadata.level());
        if !level.is_at_least(self.store.minimum_level()) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let (body, context) = visitor.into_body();
        self.store.write(
            PendingMessage::new(level, metadata.target())
                .with_context(context)
                .with_message(body),
        );
    }
}
