use std::sync::Arc;

use typed_builder::TypedBuilder;

use super::{Executor, Strategy, check_workers, join_workers};
use crate::{Result, partition::Strided};

/// One task per worker; worker `k` visits `k, k + w, k + 2w, ...`.
///
/// Exactly `workers` tasks are spawned per call, whatever `n` is. Workers
/// whose first index is already past `n` return immediately.
#[derive(Clone, Debug, TypedBuilder)]
pub struct StridedExecutor {
    #[builder(default = num_cpus::get())]
    pub workers: usize,
}

impl Executor for StridedExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Strided
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn for_each<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        check_workers(self.workers)?;
        let body = Arc::new(body);
        let workers = self.workers;

        let handles = (0..workers)
            .map(|id| {
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    tracing::trace_span!("worker", strategy = "strided", id).in_scope(|| {
                        for i in Strided::new(id, n, workers) {
                            body(i);
                        }
                    });
                })
            })
            .collect();

        join_workers(Strategy::Strided, handles).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn residue_classes_arrive_in_stride_order() {
        let n = 100;
        let workers = 3;
        let order = Arc::new(Mutex::new(Vec::with_capacity(n)));
        let o = Arc::clone(&order);

        StridedExecutor::builder()
            .workers(workers)
            .build()
            .for_each(n, move |i| o.lock().unwrap().push(i))
            .await
            .unwrap();

        let order = order.lock().unwrap();
        assert_eq!(order.len(), n);
        for k in 0..workers {
            let seen: Vec<usize> = order.iter().copied().filter(|i| i % workers == k).collect();
            assert_eq!(seen, Strided::new(k, n, workers).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn more_workers_than_items() {
        let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
        let c = Arc::clone(&counts);
        StridedExecutor::builder()
            .workers(8)
            .build()
            .for_each(3, move |i| {
                c[i].fetch_add(1, Ordering::Relaxed);
            })
            .await
            .unwrap();
        assert!(counts.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[tokio::test]
    async fn zero_workers_is_an_error() {
        let err = StridedExecutor::builder()
            .workers(0)
            .build()
            .for_each(4, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
