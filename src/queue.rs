use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// At most `workers` spawned futures run at once; the rest wait for a permit.
/// Results are collected in completion order.
#[derive(Debug)]
pub struct WorkerPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(workers: usize) -> Self {
        let permits = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            // The semaphore is owned by the pool and never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            fut.await
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task. A panicked task is reported as an error instead of
    /// taking the others down with it.
    pub async fn join_all(mut self) -> Vec<Result<T, tokio::task::JoinError>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            results.push(result);
        }
        results
    }
}
