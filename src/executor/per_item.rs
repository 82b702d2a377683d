use std::sync::Arc;

use tokio::sync::Semaphore;
use typed_builder::TypedBuilder;

use super::{Executor, Strategy};
use crate::{Error, Result, sync::WaitGroup};

/// Spawns one Tokio task per index and waits on a [`WaitGroup`].
///
/// This is the most expensive shape: `n` spawns, each doing a single unit of
/// work. With `max_in_flight` set, spawning blocks on a semaphore so at most
/// that many tasks exist at once; each task holds its permit until it
/// finishes.
#[derive(Clone, Debug, TypedBuilder)]
pub struct PerItemExecutor {
    /// Reported degree of parallelism. The runtime decides where tasks run.
    #[builder(default = num_cpus::get())]
    pub workers: usize,
    /// Upper bound on concurrently alive tasks. `None` means unbounded.
    #[builder(default)]
    pub max_in_flight: Option<usize>,
}

impl Executor for PerItemExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::PerItem
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn for_each<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let wg = WaitGroup::new();
        let limiter = self
            .max_in_flight
            .map(|cap| Arc::new(Semaphore::new(cap.max(1))));

        for i in 0..n {
            let permit = match &limiter {
                Some(limiter) => Some(
                    Arc::clone(limiter)
                        .acquire_owned()
                        .await
                        .map_err(|_| Error::RuntimeShutdown {
                            strategy: Strategy::PerItem,
                        })?,
                ),
                None => None,
            };
            let guard = wg.enter();
            let body = Arc::clone(&body);

            tokio::spawn(async move {
                let _guard = guard;
                let _permit = permit;
                body(i);
            });
        }

        wg.wait().await;

        match wg.panicked() {
            0 => Ok(()),
            tasks => {
                tracing::error!("{tasks} per-item task(s) panicked");
                Err(Error::TaskPanicked {
                    strategy: Strategy::PerItem,
                    tasks,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_index_once() {
        let n = 1000;
        let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
        let c = Arc::clone(&counts);
        PerItemExecutor::builder()
            .workers(4)
            .build()
            .for_each(n, move |i| {
                c[i].fetch_add(1, Ordering::Relaxed);
            })
            .await
            .unwrap();
        assert!(counts.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounded_fan_out_respects_cap() {
        let alive = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&alive), Arc::clone(&peak));

        PerItemExecutor::builder()
            .workers(4)
            .max_in_flight(Some(2))
            .build()
            .for_each(200, move |_| {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::yield_now();
                a.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(alive.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_are_counted_after_full_join() {
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        let err = PerItemExecutor::builder()
            .build()
            .for_each(10, move |i| {
                if i % 5 == 0 {
                    panic!("unit {i} failed");
                }
                d.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::TaskPanicked {
                strategy: Strategy::PerItem,
                tasks: 2
            }
        ));
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }
}
