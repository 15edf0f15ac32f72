//! In-process engine running operations level by level.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::{ExecutionId, OperationId};
use sluice_reporting::{EventPayload, OperationState, OperationStatus, RowCount};
use sluice_runtime::{
    ChannelSet, MaterializedConnection, MaterializedElement, MaterializedOperation,
    MaterializedPipeline, OperationContext, OperationError,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::engine::ExecutionEngine;
use crate::error::ExecutionError;
use crate::result::{ExecutionResult, OperationOutcome};
use crate::status::ExecutionStatus;

/// Runs the materialized pipeline on the current tokio runtime.
///
/// Levels run one after another; the operations of a level run concurrently,
/// up to `max_parallel_operations`. Every operation publishes its
/// `OperationStatus` transitions and, once finished, the `RowCount` its
/// handler returned, plus a `RowCount` on each outgoing connection carrying
/// the rows it wrote. Downstream operations see the sum of those rows as
/// their upstream rows.
///
/// The first failing operation cancels the execution; operations that never
/// ran end as stopped. All channels are closed however `submit` exits, so
/// every live subscription completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

impl LocalEngine {
    /// Create a local engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn submit(&self, ctx: Arc<ExecutionContext>) -> Result<ExecutionResult, ExecutionError> {
        let closer = CloseOnDrop(Arc::clone(ctx.materialized()));
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ExecutionError::Engine(
                "local engine requires a tokio runtime".into(),
            ));
        }

        let started_at = Utc::now();
        let pipeline = Arc::clone(&closer.0);
        let cancellation = ctx.cancellation().clone();

        let mut outcomes: HashMap<OperationId, OperationOutcome> = pipeline
            .operations()
            .iter()
            .map(|op| (op.id(), OperationOutcome::pending()))
            .collect();

        publish_status(pipeline.channels(), OperationStatus::new(OperationState::Running));

        let run = Run {
            execution_id: ctx.id(),
            pipeline: Arc::clone(&pipeline),
            parameters: Arc::new(merged_parameters(&ctx)),
            semaphore: Arc::new(Semaphore::new(ctx.config().max_parallel_operations)),
            cancellation: cancellation.clone(),
        };

        let (failure, timed_out) = match ctx.config().timeout {
            Some(limit) => match tokio::time::timeout(limit, run.levels(&mut outcomes)).await {
                Ok(failure) => (failure, false),
                Err(_) => {
                    tracing::warn!(execution_id = %ctx.id(), ?limit, "execution timed out");
                    cancellation.cancel();
                    (None, true)
                }
            },
            None => (run.levels(&mut outcomes).await, false),
        };

        for op in pipeline.operations() {
            if let Some(outcome) = outcomes.get_mut(&op.id()) {
                if !outcome.state.is_terminal() {
                    *outcome = OperationOutcome::stopped();
                    publish_status(op.channels(), OperationStatus::new(OperationState::Stopped));
                }
            }
        }

        let status = if timed_out {
            ExecutionStatus::TimedOut
        } else if failure.is_some() {
            ExecutionStatus::Failed
        } else if cancellation.is_cancelled() {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };

        let pipeline_status = match (&status, &failure) {
            (ExecutionStatus::Completed, _) => OperationStatus::new(OperationState::Finished),
            (ExecutionStatus::Failed, Some((id, reason))) => OperationStatus::with_message(
                OperationState::Failed,
                format!("operation {id} failed: {reason}"),
            ),
            (ExecutionStatus::Failed, None) => OperationStatus::new(OperationState::Failed),
            (other, _) => OperationStatus::with_message(OperationState::Stopped, other.to_string()),
        };
        publish_status(pipeline.channels(), pipeline_status);
        drop(closer);

        tracing::info!(
            execution_id = %ctx.id(),
            pipeline_id = %pipeline.id(),
            %status,
            "execution finished"
        );

        Ok(ExecutionResult {
            execution_id: ctx.id(),
            status,
            failed_operation: failure.map(|(id, _)| id),
            operations: outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Pipeline variables overlaid with the context's parameters.
fn merged_parameters(ctx: &ExecutionContext) -> HashMap<String, serde_json::Value> {
    let mut parameters = ctx.pipeline().variables.clone();
    parameters.extend(ctx.parameters());
    parameters
}

fn publish_status(channels: &ChannelSet, status: OperationStatus) {
    publish(channels, &status);
}

fn publish<P: EventPayload>(channels: &ChannelSet, payload: &P) {
    let Some(channel) = channels.typed::<P>() else {
        return;
    };
    if let Err(err) = channel.publish_payload(payload) {
        tracing::warn!(
            source = %channels.source(),
            event_type = P::EVENT_TYPE,
            error = %err,
            "failed to publish event"
        );
    }
}

/// Closes every channel of the pipeline when dropped, so subscriptions
/// complete on every exit path of the engine, panics included.
struct CloseOnDrop(Arc<MaterializedPipeline>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close_all();
    }
}

/// Shared state of one engine run.
struct Run {
    execution_id: ExecutionId,
    pipeline: Arc<MaterializedPipeline>,
    parameters: Arc<HashMap<String, serde_json::Value>>,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
}

impl Run {
    /// Execute all levels in order.
    ///
    /// Returns `Some((operation_id, error))` if an operation failed.
    async fn levels(
        &self,
        outcomes: &mut HashMap<OperationId, OperationOutcome>,
    ) -> Option<(OperationId, String)> {
        for level in self.pipeline.levels() {
            if self.cancellation.is_cancelled() {
                break;
            }
            if let Some(failure) = self.level(level, outcomes).await {
                return Some(failure);
            }
        }
        None
    }

    async fn level(
        &self,
        level: &[OperationId],
        outcomes: &mut HashMap<OperationId, OperationOutcome>,
    ) -> Option<(OperationId, String)> {
        let mut join_set = JoinSet::new();

        for &id in level {
            let Some(operation) = self.pipeline.operation(id) else {
                continue;
            };
            let upstream_rows = self
                .pipeline
                .incoming(id)
                .iter()
                .filter_map(|conn| outcomes.get(&conn.from()))
                .map(|outcome| outcome.rows.written)
                .sum();
            outcomes.insert(id, OperationOutcome::running());

            join_set.spawn(
                OperationTask {
                    execution_id: self.execution_id,
                    operation: Arc::clone(operation),
                    outgoing: self.pipeline.outgoing(id).into_iter().cloned().collect(),
                    upstream_rows,
                    parameters: Arc::clone(&self.parameters),
                    semaphore: Arc::clone(&self.semaphore),
                    cancellation: self.cancellation.clone(),
                }
                .run(),
            );
        }

        let mut failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, outcome)) => {
                    if failure.is_none() && outcome.state == OperationState::Failed {
                        failure = Some((id, outcome.error.clone().unwrap_or_default()));
                    }
                    outcomes.insert(id, outcome);
                }
                Err(join_err) => {
                    tracing::error!(?join_err, "operation task panicked");
                    self.cancellation.cancel();
                }
            }
        }

        // Tasks that panicked never reported back.
        for &id in level {
            let Some(outcome) = outcomes.get_mut(&id) else {
                continue;
            };
            if outcome.state == OperationState::Running {
                *outcome = OperationOutcome::failed("operation task panicked");
                if let Some(operation) = self.pipeline.operation(id) {
                    publish_status(
                        operation.channels(),
                        OperationStatus::with_message(OperationState::Failed, "operation task panicked"),
                    );
                }
                if failure.is_none() {
                    failure = Some((id, "operation task panicked".to_owned()));
                }
            }
        }

        failure
    }
}

/// Bundled parameters for a single operation run.
struct OperationTask {
    execution_id: ExecutionId,
    operation: Arc<MaterializedOperation>,
    outgoing: Vec<Arc<MaterializedConnection>>,
    upstream_rows: u64,
    parameters: Arc<HashMap<String, serde_json::Value>>,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
}

impl OperationTask {
    /// Acquire a permit, check cancellation, run the handler and report.
    async fn run(self) -> (OperationId, OperationOutcome) {
        let id = self.operation.id();
        let channels = self.operation.channels();

        let Ok(_permit) = self.semaphore.acquire().await else {
            publish_status(channels, OperationStatus::new(OperationState::Stopped));
            return (id, OperationOutcome::stopped());
        };
        if self.cancellation.is_cancelled() {
            publish_status(channels, OperationStatus::new(OperationState::Stopped));
            return (id, OperationOutcome::stopped());
        }

        publish_status(channels, OperationStatus::new(OperationState::Running));
        tracing::debug!(operation_id = %id, operation = self.operation.name(), "running operation");

        let ctx = OperationContext::new(
            self.execution_id,
            Arc::clone(&self.operation),
            self.cancellation.child_token(),
        )
        .with_upstream_rows(self.upstream_rows)
        .with_parameters(Arc::clone(&self.parameters));

        match self.operation.handler().run(ctx).await {
            Ok(rows) => {
                publish(channels, &rows);
                publish_status(channels, OperationStatus::new(OperationState::Finished));
                let passed = RowCount {
                    read: rows.written,
                    written: rows.written,
                    rejected: 0,
                };
                for conn in &self.outgoing {
                    publish(conn.channels(), &passed);
                }
                tracing::debug!(operation_id = %id, written = rows.written, "operation finished");
                (id, OperationOutcome::finished(rows))
            }
            Err(OperationError::Cancelled) => {
                publish_status(channels, OperationStatus::new(OperationState::Stopped));
                (id, OperationOutcome::stopped())
            }
            Err(err) => {
                tracing::warn!(operation_id = %id, error = %err, "operation failed");
                self.cancellation.cancel();
                publish_status(
                    channels,
                    OperationStatus::with_message(OperationState::Failed, err.to_string()),
                );
                (id, OperationOutcome::failed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sluice_core::OperationKind;
    use sluice_pipeline::{OperationDefinition, PipelineBuilder, PipelineDefinition};
    use sluice_runtime::{OperationHandler, OperationRegistry};

    use crate::config::{ExecutionConfig, Scheduling};

    /// Writes `upstream + 1` rows.
    struct Increment(OperationKind);

    #[async_trait]
    impl OperationHandler for Increment {
        fn kind(&self) -> &OperationKind {
            &self.0
        }

        async fn run(&self, ctx: OperationContext) -> Result<RowCount, OperationError> {
            Ok(RowCount {
                read: ctx.upstream_rows(),
                written: ctx.upstream_rows() + 1,
                rejected: 0,
            })
        }
    }

    fn context(definition: PipelineDefinition) -> Arc<ExecutionContext> {
        let registry = OperationRegistry::new();
        registry.register(Arc::new(Increment(OperationKind::new("inc").unwrap())));
        ExecutionContext::new(
            Arc::new(LocalEngine::new()),
            Arc::new(registry),
            Arc::new(definition),
            ExecutionConfig::default().with_scheduling(Scheduling::Inline),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn diamond_sums_upstream_rows() {
        let kind = OperationKind::new("inc").unwrap();
        let [a, b, c, d] = [(); 4].map(|()| OperationId::v4());
        let definition = PipelineBuilder::new("diamond")
            .add_operation(OperationDefinition::new(a, "a", kind.clone()))
            .add_operation(OperationDefinition::new(b, "b", kind.clone()))
            .add_operation(OperationDefinition::new(c, "c", kind.clone()))
            .add_operation(OperationDefinition::new(d, "d", kind))
            .connect(a, b)
            .connect(a, c)
            .connect(b, d)
            .connect(c, d)
            .build()
            .unwrap();

        let result = context(definition).execute().await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.operation(a).unwrap().rows.written, 1);
        assert_eq!(result.operation(b).unwrap().rows.written, 2);
        assert_eq!(result.operation(c).unwrap().rows.written, 2);
        assert_eq!(result.operation(d).unwrap().rows.read, 4);
        assert_eq!(result.operation(d).unwrap().rows.written, 5);
    }

    #[tokio::test]
    async fn variables_are_overridden_by_parameters() {
        let op = OperationId::v4();
        let definition = PipelineBuilder::new("vars")
            .add_operation(OperationDefinition::new(
                op,
                "a",
                OperationKind::new("inc").unwrap(),
            ))
            .variable("limit", serde_json::json!(10))
            .variable("mode", serde_json::json!("fast"))
            .build()
            .unwrap();
        let ctx = context(definition);
        ctx.set_parameter("limit", serde_json::json!(20)).unwrap();

        let merged = merged_parameters(&ctx);
        assert_eq!(merged["limit"], serde_json::json!(20));
        assert_eq!(merged["mode"], serde_json::json!("fast"));
    }

    #[tokio::test]
    async fn channels_are_closed_afterwards() {
        let op = OperationId::v4();
        let definition = PipelineBuilder::new("single")
            .add_operation(OperationDefinition::new(
                op,
                "a",
                OperationKind::new("inc").unwrap(),
            ))
            .build()
            .unwrap();
        let ctx = context(definition);
        ctx.execute().await.unwrap();

        let channels = ctx.materialized().operation(op).unwrap().channels();
        assert!(channels.typed::<OperationStatus>().unwrap().is_closed());
        assert!(
            ctx.materialized()
                .channels()
                .typed::<OperationStatus>()
                .unwrap()
                .is_closed()
        );
    }

    #[test]
    fn missing_runtime_still_closes_channels() {
        let op = OperationId::v4();
        let definition = PipelineBuilder::new("single")
            .add_operation(OperationDefinition::new(
                op,
                "a",
                OperationKind::new("inc").unwrap(),
            ))
            .build()
            .unwrap();
        let ctx = context(definition);
        let mut sub = ctx
            .materialized()
            .channels()
            .typed::<OperationStatus>()
            .unwrap()
            .subscribe();

        let err = futures::executor::block_on(ctx.execute()).unwrap_err();
        assert!(matches!(err, ExecutionError::Engine(_)));
        assert!(futures::executor::block_on(sub.recv()).is_none());
    }
}
