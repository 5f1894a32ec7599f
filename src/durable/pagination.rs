use super::batch::Batch;
use super::context::WorkflowContext;
use crate::error::EngineError;
use async_trait::async_trait;
use tracing::info;

pub struct FetchedPage<I, S> {
    pub items: Vec<I>,
    /// State to resume from after this page is processed.
    pub state: S,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit<S> {
    Completed,
    /// History grew past the threshold; restart with this state.
    ContinueAsNew(S),
}

/// A workflow that walks a paginated listing: fetch a page, fan its items
/// out into a batch, checkpoint, and repeat.
#[async_trait]
pub trait PaginatedTask: Send + Sync {
    type Item: Send;
    type State: Clone + Send + Sync;

    async fn fetch_page(
        &self,
        ctx: &WorkflowContext,
        state: &Self::State,
        page: usize,
    ) -> Result<FetchedPage<Self::Item, Self::State>, EngineError>;

    fn process<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        item: Self::Item,
        batch: &mut Batch<'a>,
    );

    async fn checkpoint(
        &self,
        ctx: &WorkflowContext,
        state: &Self::State,
        page: usize,
    ) -> Result<(), EngineError>;
}

pub async fn run_paginated<T: PaginatedTask>(
    ctx: &WorkflowContext,
    task: &T,
    mut state: T::State,
) -> Result<LoopExit<T::State>, EngineError> {
    let mut page = 0usize;
    loop {
        let fetched = task.fetch_page(ctx, &state, page).await?;
        let mut batch = Batch::new();
        for item in fetched.items {
            task.process(ctx, item, &mut batch);
        }
        batch.join().await?;

        state = fetched.state;
        task.checkpoint(ctx, &state, page).await?;
        if !fetched.has_more {
            return Ok(LoopExit::Completed);
        }
        page += 1;
        if ctx.should_continue_as_new() {
            info!(
                workflow_id = ctx.workflow_id(),
                history = ctx.history_len(),
                "history threshold reached, continuing as new"
            );
            return Ok(LoopExit::ContinueAsNew(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ConnectorId;
    use crate::domain::ports::WorkflowJournal;
    use crate::domain::workflow::{TerminateSchedules, WorkflowInput};
    use crate::durable::retry::{Backoff, RetryPolicy};
    use crate::error::ActivityError;
    use crate::infrastructure::in_memory::InMemoryJournal;
    use std::sync::{Arc, Mutex};

    /// Walks 0..total in pages of `size`, recording processed items.
    struct Counter {
        total: usize,
        size: usize,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl PaginatedTask for Counter {
        type Item = usize;
        type State = usize;

        async fn fetch_page(
            &self,
            ctx: &WorkflowContext,
            state: &usize,
            page: usize,
        ) -> Result<FetchedPage<usize, usize>, EngineError> {
            let (start, total, size) = (*state, self.total, self.size);
            let items: Vec<usize> = ctx
                .activity(&format!("list-{page}"), RetryPolicy::Unbounded, move || async move {
                    Ok::<_, ActivityError>((start..total.min(start + size)).collect())
                })
                .await?;
            let next = start + items.len();
            Ok(FetchedPage {
                items,
                state: next,
                has_more: next < self.total,
            })
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a WorkflowContext,
            item: usize,
            batch: &mut Batch<'a>,
        ) {
            let seen = self.seen.clone();
            batch.spawn(format!("item-{item}"), async move {
                seen.lock().unwrap().push(item);
                Ok(())
            });
        }

        async fn checkpoint(
            &self,
            ctx: &WorkflowContext,
            _state: &usize,
            page: usize,
        ) -> Result<(), EngineError> {
            ctx.now(&format!("checkpoint-{page}")).await.map(|_| ())
        }
    }

    async fn ctx(threshold: usize) -> WorkflowContext {
        let journal = Arc::new(InMemoryJournal::default());
        let input = WorkflowInput::TerminateSchedules(TerminateSchedules {
            connector_id: ConnectorId::new("c"),
            cursor: None,
        });
        journal.begin("loop", input).await.unwrap();
        WorkflowContext::new("loop", 0, journal, Backoff::default(), threshold)
    }

    #[tokio::test]
    async fn test_walks_every_page() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = Counter { total: 7, size: 3, seen: seen.clone() };
        let exit = run_paginated(&ctx(1_000).await, &task, 0).await.unwrap();
        assert_eq!(exit, LoopExit::Completed);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_continues_as_new_with_latest_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = Counter { total: 10, size: 2, seen: seen.clone() };
        // Two journal entries per page, so the threshold trips after page two.
        let exit = run_paginated(&ctx(4).await, &task, 0).await.unwrap();
        assert_eq!(exit, LoopExit::ContinueAsNew(4));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }
}
