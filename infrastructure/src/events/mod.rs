//! Event sink implementations.

mod jsonl;
mod tracing_sink;

pub use jsonl::JsonlEventSink;
pub use tracing_sink::TracingEventSink;

use chorus_application::{EventSink, MonitorEvent};
use std::sync::Arc;

/// Forwards each event to every wrapped sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: MonitorEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
