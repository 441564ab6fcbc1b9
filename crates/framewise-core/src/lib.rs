//! Core types: event kinds, aliases, timestamps, tracing

pub mod kind;
pub mod time;
pub mod tracing;

pub use kind::{
    CONNECTION_REJECTED_EVENT, CUSTOM_UI_RESPONSE_EVENT, EXIT_EVENT, EventKind, INVOKE_EVENT,
    JOIN_EVENT, TRANSCRIPT_EVENT, resolve_alias,
};
pub use time::{now_timestamp, wire_timestamp};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
