//! Forwards log events to a [`TelemetrySink`] as trace records.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};
use uuid::Uuid;

use super::{TelemetrySink, TraceRecord};

/// Least severe level that is forwarded.
const MIN_FORWARDED_LEVEL: Level = Level::INFO;

/// A `Layer` that turns every INFO, WARN and ERROR event into a
/// [`TraceRecord`].
///
/// Sink failures are dropped without logging; a warning here would feed
/// straight back into this layer.
pub struct TraceForwardLayer {
    sink: Arc<dyn TelemetrySink>,
}

impl TraceForwardLayer {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for TraceForwardLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // More verbose levels compare greater
        if *metadata.level() > MIN_FORWARDED_LEVEL {
            return;
        }

        let mut visitor = TraceVisitor::default();
        event.record(&mut visitor);

        let _ = self.sink.track_trace(TraceRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct TraceVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for TraceVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryHub;
    use tracing::{debug, info, warn};
    use tracing_subscriber::prelude::*;

    fn with_forwarding(hub: &Arc<TelemetryHub>, f: impl FnOnce()) {
        let subscriber =
            tracing_subscriber::registry().with(TraceForwardLayer::new(hub.clone()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn info_events_become_traces() {
        let hub = Arc::new(TelemetryHub::new());
        with_forwarding(&hub, || {
            info!(cart_id = 42, path = "/cart", "cart read");
        });

        let snap = hub.snapshot();
        assert_eq!(snap.total_traces, 1);
        let trace = &snap.recent_traces[0];
        assert_eq!(trace.level, "INFO");
        assert_eq!(trace.message, "cart read");
        assert_eq!(trace.fields["cart_id"], "42");
        assert_eq!(trace.fields["path"], "/cart");
        assert!(trace.target.starts_with("apm_demo"));
    }

    #[test]
    fn debug_events_are_not_forwarded() {
        let hub = Arc::new(TelemetryHub::new());
        with_forwarding(&hub, || {
            debug!("noisy detail");
            warn!("store slow");
        });

        let snap = hub.snapshot();
        assert_eq!(snap.total_traces, 1);
        assert_eq!(snap.recent_traces[0].level, "WARN");
        assert_eq!(snap.recent_traces[0].message, "store slow");
    }
}
