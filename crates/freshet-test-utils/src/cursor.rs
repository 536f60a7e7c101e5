//! Scripted cursor sources.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use freshet::{Batch, CursorSource};

use crate::{Gate, TestError};

/// Fetch/close counters shared with the test.
#[derive(Debug, Default)]
pub struct CursorStats {
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl CursorStats {
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Cursor that replays a pre-scripted sequence of fetch results.
///
/// Panics if fetched beyond its script — a drain loop that keeps fetching
/// after `has_more == false` or an error is a bug worth catching loudly.
pub struct ScriptedCursor<T> {
    script: VecDeque<Result<Batch<T>, TestError>>,
    stats: Arc<CursorStats>,
    gate: Option<Gate>,
}

impl<T: Send + 'static> ScriptedCursor<T> {
    #[must_use]
    pub fn new(script: Vec<Result<Batch<T>, TestError>>) -> Self {
        Self {
            script: script.into(),
            stats: Arc::new(CursorStats::default()),
            gate: None,
        }
    }

    /// Batches in order; every batch but the last reports `has_more`.
    #[must_use]
    pub fn from_batches(batches: Vec<Vec<T>>) -> Self {
        let last = batches.len().saturating_sub(1);
        let script = batches
            .into_iter()
            .enumerate()
            .map(|(index, items)| Ok(Batch::new(items, index != last)))
            .collect();
        Self::new(script)
    }

    /// Park every fetch at `gate` until the test releases it.
    #[must_use]
    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Count fetches/closes into `stats` (shared across factory-produced
    /// instances).
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<CursorStats>) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<CursorStats> {
        self.stats.clone()
    }
}

impl<T: Send + 'static> CursorSource for ScriptedCursor<T> {
    type Item = T;
    type Error = TestError;

    fn fetch_next(&mut self) -> impl Future<Output = Result<Batch<T>, TestError>> + Send {
        async move {
            self.stats.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.pass().await;
            }
            self.script.pop_front().expect("fetch beyond script")
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
