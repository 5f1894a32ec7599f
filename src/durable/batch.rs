use crate::error::EngineError;
use futures::future::{BoxFuture, join_all};
use std::future::Future;
use tracing::{debug, warn};

type Labeled<'a> = (String, BoxFuture<'a, Result<(), EngineError>>);

/// A set of sub-tasks of one workflow, run concurrently on the workflow's
/// own task and joined together.
///
/// Sub-tasks spawned with [`Batch::spawn`] propagate: once every sub-task has
/// finished, the first of their errors (in spawn order) fails the batch.
/// Sub-tasks spawned with [`Batch::spawn_logged`] only log their failure.
#[derive(Default)]
pub struct Batch<'a> {
    propagating: Vec<Labeled<'a>>,
    logged: Vec<Labeled<'a>>,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, label: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'a,
    {
        self.propagating.push((label.into(), Box::pin(task)));
    }

    pub fn spawn_logged<F>(&mut self, label: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'a,
    {
        self.logged.push((label.into(), Box::pin(task)));
    }

    pub fn len(&self) -> usize {
        self.propagating.len() + self.logged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn join(self) -> Result<(), EngineError> {
        let total = self.len();
        let (propagating_labels, propagating): (Vec<_>, Vec<_>) =
            self.propagating.into_iter().unzip();
        let (logged_labels, logged): (Vec<_>, Vec<_>) = self.logged.into_iter().unzip();

        let (propagated, logged) = futures::join!(join_all(propagating), join_all(logged));

        for (label, result) in logged_labels.iter().zip(logged) {
            if let Err(err) = result {
                warn!(task = %label, error = %err, "best-effort task failed");
            }
        }

        let mut errors = Vec::with_capacity(total);
        for (label, result) in propagating_labels.iter().zip(propagated) {
            if let Err(err) = result {
                debug!(task = %label, error = %err, "batch task failed");
                errors.push(err);
            }
        }
        if errors.len() > 1 {
            warn!(failed = errors.len(), total, "multiple batch tasks failed, returning the first");
        }
        errors.into_iter().next().map_or(Ok(()), Err)
    }
}
