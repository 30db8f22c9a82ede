//! Instrumented merge operations for exercising merger build behaviour.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use treedag::{BuildError, DirMerge, MergeOperation};

/// Wraps [`DirMerge`] and counts how many times `merge` is invoked, for
/// asserting the at-most-one-concurrent-build contract.
#[derive(Default)]
pub struct CountingMerge {
    calls: AtomicUsize,
    delay: Duration,
    inner: DirMerge,
}

impl CountingMerge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stretch each merge call out, so concurrent `ready()` callers overlap
    /// a build that is genuinely still in flight.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MergeOperation for CountingMerge {
    async fn merge(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.merge(input, output).await
    }
}

/// Sleeps before delegating to [`DirMerge`], leaving a window in which a
/// build can be aborted mid-flight.
pub struct SlowMerge {
    delay: Duration,
    inner: DirMerge,
}

impl SlowMerge {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            inner: DirMerge,
        })
    }
}

#[async_trait]
impl MergeOperation for SlowMerge {
    async fn merge(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        tokio::time::sleep(self.delay).await;
        self.inner.merge(input, output).await
    }
}
