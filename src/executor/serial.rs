use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{Executor, Strategy};
use crate::{Error, Result};

/// Runs the whole range on the calling task. No concurrency at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Serial
    }

    fn workers(&self) -> usize {
        1
    }

    async fn for_each<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        catch_unwind(AssertUnwindSafe(|| {
            for i in 0..n {
                body(i);
            }
        }))
        .map_err(|_| Error::TaskPanicked {
            strategy: Strategy::Serial,
            tasks: 1,
        })
    }
}
