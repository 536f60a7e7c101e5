//! Scripted one-shot operations.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use freshet::Operation;

use crate::{Gate, TestError};

/// Execution counter shared with the test.
#[derive(Debug, Default)]
pub struct OperationStats {
    executions: AtomicUsize,
}

impl OperationStats {
    #[must_use]
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

/// Operation that resolves to a pre-scripted outcome.
pub struct ScriptedOperation<T> {
    result: Result<Option<T>, TestError>,
    stats: Arc<OperationStats>,
    gate: Option<Gate>,
}

impl<T: Send + 'static> ScriptedOperation<T> {
    /// Succeeds with a payload.
    #[must_use]
    pub fn ok(value: T) -> Self {
        Self::scripted(Ok(Some(value)))
    }

    /// Succeeds without a payload ("no-value success").
    #[must_use]
    pub fn empty() -> Self {
        Self::scripted(Ok(None))
    }

    /// Fails.
    #[must_use]
    pub fn err(error: TestError) -> Self {
        Self::scripted(Err(error))
    }

    fn scripted(result: Result<Option<T>, TestError>) -> Self {
        Self {
            result,
            stats: Arc::new(OperationStats::default()),
            gate: None,
        }
    }

    /// Park the execution at `gate` until the test releases it.
    #[must_use]
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<OperationStats> {
        self.stats.clone()
    }
}

impl<T: Send + 'static> Operation for ScriptedOperation<T> {
    type Output = T;
    type Error = TestError;

    fn execute(self) -> impl Future<Output = Result<Option<T>, TestError>> + Send {
        async move {
            self.stats.executions.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.pass().await;
            }
            self.result
        }
    }
}
