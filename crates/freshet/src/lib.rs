//! `freshet`
//!
//! Demand-driven reactive publishers over batched async cursors.
//!
//! ## Design goals
//! - `CursorPublisher`: a batched async cursor becomes a per-item stream
//!   under strict demand — never more items than requested, partial
//!   batches buffered, one fetch in flight at a time
//! - `OperationPublisher`: one async operation becomes at most one item
//!   plus a terminal signal, started only once demand arrives
//! - actor per subscription: all state is owned by one spawned task fed
//!   typed commands, so signals are strictly serialized and exactly one
//!   terminal signal is ever delivered
//!
//! Cancellation stops future fetches without racing in-flight ones: the
//! cursor is released only after an outstanding fetch settles, and its
//! discarded result never reaches the subscriber.

#![forbid(unsafe_code)]

mod cursor;
mod demand;
mod error;
mod operation;
mod source;
mod stream;
mod subscriber;
mod subscription;

pub use cursor::CursorPublisher;
pub use error::{FlowError, FlowResult};
pub use operation::OperationPublisher;
pub use source::{Batch, CursorSource, Operation};
pub use stream::{ItemStream, StreamOptions};
pub use subscriber::Subscriber;
pub use subscription::Subscription;
