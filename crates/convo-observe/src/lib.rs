//! Observability setup for Convo: structured logging plus optional
//! OpenTelemetry span export.

pub mod tracing_setup;
