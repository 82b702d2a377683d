//! Join barrier shared by the executors that cannot simply await their
//! task handles.
//!
//! A [`WaitGroup`] counts outstanding units. [`WaitGroup::enter`] hands out a
//! [`WaitGuard`] that releases its unit when dropped, which includes the
//! unwinding path of a panicking task; such guards are counted separately so
//! the waiter can report the failure once.

use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    panicked: AtomicUsize,
    zero: Notify,
}

/// Counter with an async wait-until-zero.
#[derive(Clone, Debug, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work. The unit completes when the guard drops.
    pub fn enter(&self) -> WaitGuard {
        self.inner.pending.fetch_add(1, Ordering::Relaxed);
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Units registered and not yet completed.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Units whose guard was dropped while their thread was panicking.
    pub fn panicked(&self) -> usize {
        self.inner.panicked.load(Ordering::Acquire)
    }

    /// Resolves once every registered unit has completed.
    ///
    /// Everything a unit wrote before its guard dropped is visible to the
    /// caller after this returns.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.inner.zero.notified());
            // register before checking so a release between the check and
            // the await still wakes us
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One outstanding unit of a [`WaitGroup`].
#[derive(Debug)]
#[must_use = "the unit completes as soon as the guard is dropped"]
pub struct WaitGuard {
    inner: Arc<Inner>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.inner.panicked.fetch_add(1, Ordering::Relaxed);
        }
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.zero.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::atomic::AtomicBool, time::Duration};

    #[tokio::test]
    async fn empty_group_returns_immediately() {
        WaitGroup::new().wait().await;
    }

    #[tokio::test]
    async fn waits_for_every_guard() {
        let wg = WaitGroup::new();
        let guards: Vec<_> = (0..3).map(|_| wg.enter()).collect();
        assert_eq!(wg.pending(), 3);

        let waiter = tokio::spawn({
            let wg = wg.clone();
            async move { wg.wait().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guards);
        waiter.await.unwrap();
        assert_eq!(wg.pending(), 0);
        assert_eq!(wg.panicked(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_are_visible_after_wait() {
        let wg = WaitGroup::new();
        let flags: Arc<Vec<AtomicBool>> = Arc::new((0..64).map(|_| AtomicBool::new(false)).collect());

        for i in 0..64 {
            let guard = wg.enter();
            let flags = Arc::clone(&flags);
            tokio::spawn(async move {
                let _guard = guard;
                flags[i].store(true, Ordering::Relaxed);
            });
        }

        wg.wait().await;
        assert!(flags.iter().all(|f| f.load(Ordering::Relaxed)));
    }

    #[tokio::test]
    async fn panicking_unit_is_counted() {
        let wg = WaitGroup::new();
        let guard = wg.enter();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("unit failed");
        });

        wg.wait().await;
        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(wg.panicked(), 1);
    }
}
