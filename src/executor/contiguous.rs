use std::sync::Arc;

use typed_builder::TypedBuilder;

use super::{Executor, Strategy, check_workers, join_workers};
use crate::{Result, partition::compute_block};

/// One task per worker; worker `k` walks its own contiguous block.
///
/// Each task computes its block once with
/// [`compute_block`](crate::partition::compute_block) and then iterates it
/// sequentially, so every worker touches a single region of memory.
#[derive(Clone, Debug, TypedBuilder)]
pub struct ContiguousExecutor {
    #[builder(default = num_cpus::get())]
    pub workers: usize,
}

impl Executor for ContiguousExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Contiguous
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
                    let block = compute_block(id, n, workers);
                    tracing::trace_span!(
                        "worker",
                        strategy = "contiguous",
                        id,
                        first = block.first,
                        last = block.last
                    )
                    .in_scope(|| {
                        for i in block.range() {
                            body(i);
                        }
                    });
                })
            })
            .collect();

        join_workers(Strategy::Contiguous, handles).await
    }
}
