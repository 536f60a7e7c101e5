//! Parking point for async calls under test.
//!
//! A [`Gate`] is threaded into a scripted source; every guarded call marks
//! entry and waits for a permit. The test side holds the [`GateHandle`] to
//! observe entries and release calls one by one — the harness for
//! cancel-versus-in-flight races.

use std::{sync::Arc, time::Duration};

use tokio::sync::{Semaphore, watch};

/// Create a connected gate/handle pair.
#[must_use]
pub fn gate() -> (Gate, GateHandle) {
    let (entered_tx, entered_rx) = watch::channel(0usize);
    let permits = Arc::new(Semaphore::new(0));
    (
        Gate {
            entered: entered_tx,
            permits: permits.clone(),
        },
        GateHandle {
            entered: entered_rx,
            permits,
        },
    )
}

/// Producer side: parks the calling future until released.
pub struct Gate {
    entered: watch::Sender<usize>,
    permits: Arc<Semaphore>,
}

impl Gate {
    /// Mark entry and wait until the test releases one permit.
    pub async fn pass(&self) {
        self.entered.send_modify(|count| *count += 1);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// Test side: observes entries and releases parked calls.
pub struct GateHandle {
    entered: watch::Receiver<usize>,
    permits: Arc<Semaphore>,
}

impl GateHandle {
    /// Wait until at least `n` calls have entered the gate.
    pub async fn wait_entered(&mut self, n: usize) {
        tokio::time::timeout(
            Duration::from_secs(5),
            self.entered.wait_for(|&count| count >= n),
        )
        .await
        .expect("timed out waiting for gate entry")
        .expect("gate dropped");
    }

    /// Calls that have entered the gate so far.
    #[must_use]
    pub fn entered(&self) -> usize {
        *self.entered.borrow()
    }

    /// Allow one parked call through.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }
}
