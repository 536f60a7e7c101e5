#![forbid(unsafe_code)]
#![expect(
    clippy::unwrap_used,
    reason = "test utility crate — unwraps are acceptable"
)]

//! Shared test fixtures for the freshet workspace.

use std::time::Duration;

use thiserror::Error;

mod cursor;
mod gate;
mod operation;
mod subscriber;

pub use cursor::{CursorStats, ScriptedCursor};
pub use gate::{Gate, GateHandle, gate};
pub use operation::{OperationStats, ScriptedOperation};
pub use subscriber::{RecordingSubscriber, Signal, SubscriberProbe};

/// Error used by scripted sources and operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TestError(pub &'static str);

/// Poll `condition` until it holds; panics after five seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within timeout"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
