//! The engine seam and the handle returned by `execute`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use sluice_core::ExecutionId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::result::ExecutionResult;

/// Runs a materialized pipeline.
///
/// The engine receives the whole context: it reads the materialized graph,
/// parameters and configuration from it and publishes into the channels the
/// context's observers are already subscribed to.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run the execution to completion.
    async fn submit(&self, ctx: Arc<ExecutionContext>) -> Result<ExecutionResult, ExecutionError>;
}

/// A running (or rejected) execution.
///
/// Await it for the [`ExecutionResult`]. Dropping the handle before the
/// execution has finished cancels it; a spawned execution then winds down in
/// the background and still closes its channels.
pub struct ExecutionHandle {
    execution_id: ExecutionId,
    cancellation: CancellationToken,
    state: HandleState,
    finished: bool,
}

enum HandleState {
    Spawned(JoinHandle<Result<ExecutionResult, ExecutionError>>),
    Inline(BoxFuture<'static, Result<ExecutionResult, ExecutionError>>),
    Rejected(Option<ExecutionError>),
}

impl ExecutionHandle {
    pub(crate) fn spawned(
        execution_id: ExecutionId,
        cancellation: CancellationToken,
        handle: JoinHandle<Result<ExecutionResult, ExecutionError>>,
    ) -> Self {
        Self {
            execution_id,
            cancellation,
            finished: false,
            state: HandleState::Spawned(handle),
        }
    }

    pub(crate) fn inline(
        execution_id: ExecutionId,
        cancellation: CancellationToken,
        future: BoxFuture<'static, Result<ExecutionResult, ExecutionError>>,
    ) -> Self {
        Self {
            execution_id,
            cancellation,
            finished: false,
            state: HandleState::Inline(future),
        }
    }

    pub(crate) fn rejected(
        execution_id: ExecutionId,
        cancellation: CancellationToken,
        error: ExecutionError,
    ) -> Self {
        Self {
            execution_id,
            cancellation,
            finished: false,
            state: HandleState::Rejected(Some(error)),
        }
    }

    /// The execution this handle tracks.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Request cancellation. Best effort: operations already running stop
    /// only if they observe the token.
    pub fn cancel(&self) {
        tracing::info!(execution_id = %self.execution_id, "cancellation requested");
        self.cancellation.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Future for ExecutionHandle {
    type Output = Result<ExecutionResult, ExecutionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let poll = match &mut self.state {
            HandleState::Spawned(handle) => Pin::new(handle).poll(cx).map(|joined| {
                joined.unwrap_or_else(|err| Err(ExecutionError::Join(err.to_string())))
            }),
            HandleState::Inline(future) => future.as_mut().poll(cx),
            HandleState::Rejected(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or(ExecutionError::AlreadyStarted))),
        };
        if poll.is_ready() {
            self.finished = true;
        }
        poll
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        // A rejected handle shares the token of the execution that did start.
        if self.finished || matches!(self.state, HandleState::Rejected(_)) {
            return;
        }
        tracing::debug!(execution_id = %self.execution_id, "handle dropped, cancelling execution");
        self.cancellation.cancel();
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Spawned(_) => "spawned",
            HandleState::Inline(_) => "inline",
            HandleState::Rejected(_) => "rejected",
        };
        f.debug_struct("ExecutionHandle")
            .field("execution_id", &self.execution_id)
            .field("state", &state)
            .field("finished", &self.finished)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
