pub mod event_stream;
pub mod sse;
