//! Event sinks for pipeline observability.
//!
//! The orchestrator reports `pipeline.started`, `stage.started`,
//! `stage.completed`, `stage.failed`, `pipeline.halted` and
//! `pipeline.completed` events to the configured sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};
