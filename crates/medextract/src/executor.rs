//! Bounded worker pool
//!
//! Items are pulled lazily from the input, run on tokio's blocking pool with
//! at most `workers` in flight, and yielded in completion order. A task that
//! panics comes back as a [`JoinError`] alongside the item it was given, so
//! the caller can still account for it.

use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinError;

#[derive(Debug, Clone, Copy)]
pub struct Executor {
    workers: usize,
}

impl Executor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` over `items`, yielding `(item, result)` as tasks finish
    ///
    /// Nothing is started until the stream is polled, and dropping the
    /// stream stops feeding new items. Tasks already running finish in the
    /// background; their results are discarded.
    pub fn run<I, T, F>(
        &self,
        items: I,
        task: F,
    ) -> impl Stream<Item = (I::Item, Result<T, JoinError>)>
    where
        I: IntoIterator,
        I::Item: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I::Item) -> T + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        stream::iter(items)
            .map(move |item| {
                let task = Arc::clone(&task);
                let input = item.clone();
                async move {
                    let result = tokio::task::spawn_blocking(move || task(input)).await;
                    (item, result)
                }
            })
            .buffer_unordered(self.workers)
    }
}
