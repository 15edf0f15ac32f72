//! The execution context facade.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use parking_lot::RwLock;
use sluice_core::ExecutionId;
use sluice_pipeline::{LogicalElement, PipelineDefinition};
use sluice_reporting::{EventPayload, EventStream, EventType, PublisherRegistry, ReportingError};
use sluice_runtime::{ElementIndex, MaterializedPipeline, Materializer, OperationRegistry};
use tokio_util::sync::CancellationToken;

use crate::config::{ExecutionConfig, Scheduling};
use crate::engine::{ExecutionEngine, ExecutionHandle};
use crate::error::{ContextError, ExecutionError};
use crate::store::{MetaStore, Repository};

/// Everything one execution attempt of a pipeline needs.
///
/// Construction materializes the pipeline exactly once; a context only
/// exists if materialization succeeded. Observers then request event streams
/// of logical elements through [`event_stream`](Self::event_stream), before or
/// during execution. [`execute`](Self::execute) hands the context to its
/// engine and may be called once.
///
/// Parameters and environment variables can be changed until execution
/// starts and are frozen afterwards.
pub struct ExecutionContext {
    id: ExecutionId,
    pipeline: Arc<PipelineDefinition>,
    materialized: Arc<MaterializedPipeline>,
    index: Arc<ElementIndex>,
    publishers: PublisherRegistry,
    engine: Arc<dyn ExecutionEngine>,
    config: ExecutionConfig,
    arguments: Vec<String>,
    parameters: RwLock<HashMap<String, serde_json::Value>>,
    environment: RwLock<HashMap<String, serde_json::Value>>,
    metastore: Option<Arc<dyn MetaStore>>,
    repository: Option<Arc<dyn Repository>>,
    cancellation: CancellationToken,
    started: AtomicBool,
}

impl ExecutionContext {
    /// Materialize `pipeline` and build a context with default collaborators.
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        registry: Arc<OperationRegistry>,
        pipeline: Arc<PipelineDefinition>,
        config: ExecutionConfig,
    ) -> Result<Arc<Self>, ContextError> {
        Self::builder(engine, registry, pipeline).config(config).build()
    }

    /// Start building a context.
    #[must_use]
    pub fn builder(
        engine: Arc<dyn ExecutionEngine>,
        registry: Arc<OperationRegistry>,
        pipeline: Arc<PipelineDefinition>,
    ) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            engine,
            registry,
            pipeline,
            config: ExecutionConfig::default(),
            arguments: Vec::new(),
            parameters: HashMap::new(),
            environment: HashMap::new(),
            metastore: None,
            repository: None,
        }
    }

    /// The stream of `event_type` events published for `source`.
    ///
    /// Repeated and concurrent calls with the same arguments share one
    /// stream. Elements outside the materialized pipeline, and elements that
    /// do not publish `event_type`, yield [`EventStream::Empty`].
    pub async fn event_stream(
        &self,
        source: LogicalElement,
        event_type: &EventType,
    ) -> Result<EventStream, ReportingError> {
        self.publishers.event_stream(source, event_type).await
    }

    /// The stream of payload `P` published for `source`.
    pub async fn typed_stream<P: EventPayload>(
        &self,
        source: LogicalElement,
    ) -> Result<EventStream, ReportingError> {
        self.publishers.typed_stream::<P>(source).await
    }

    /// Logical elements this context advertises as reporting sources.
    ///
    /// Always empty: any element of the pipeline can be asked for streams.
    #[must_use]
    pub fn reporting_sources(&self) -> Vec<LogicalElement> {
        Vec::new()
    }

    /// Hand the context to the engine.
    ///
    /// A second call returns a handle that fails with
    /// [`ExecutionError::AlreadyStarted`]. With [`Scheduling::Io`] the engine
    /// runs on a spawned task; outside a tokio runtime it falls back to
    /// running inside the handle.
    pub fn execute(self: &Arc<Self>) -> ExecutionHandle {
        {
            let _parameters = self.parameters.write();
            let _environment = self.environment.write();
            if self.started.swap(true, Ordering::AcqRel) {
                tracing::warn!(execution_id = %self.id, "execute called twice");
                return ExecutionHandle::rejected(
                    self.id,
                    self.cancellation.clone(),
                    ExecutionError::AlreadyStarted,
                );
            }
        }

        let engine = Arc::clone(&self.engine);
        let ctx = Arc::clone(self);
        let future = async move { engine.submit(ctx).await }.boxed();

        tracing::info!(
            execution_id = %self.id,
            pipeline_id = %self.pipeline.id,
            scheduling = ?self.config.scheduling,
            "execution started"
        );

        match self.config.scheduling {
            Scheduling::Io => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => ExecutionHandle::spawned(
                    self.id,
                    self.cancellation.clone(),
                    runtime.spawn(future),
                ),
                Err(_) => {
                    tracing::warn!(
                        execution_id = %self.id,
                        "no tokio runtime available, running execution inline"
                    );
                    ExecutionHandle::inline(self.id, self.cancellation.clone(), future)
                }
            },
            Scheduling::Inline => {
                ExecutionHandle::inline(self.id, self.cancellation.clone(), future)
            }
        }
    }

    /// Whether [`execute`](Self::execute) has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// A parameter value.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<serde_json::Value> {
        self.parameters.read().get(name).cloned()
    }

    /// Set a parameter. Last write wins.
    pub fn set_parameter(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ContextError> {
        let mut parameters = self.parameters.write();
        if self.is_started() {
            return Err(ContextError::ExecutionStarted);
        }
        parameters.insert(name.into(), value);
        Ok(())
    }

    /// Snapshot of all parameters.
    #[must_use]
    pub fn parameters(&self) -> HashMap<String, serde_json::Value> {
        self.parameters.read().clone()
    }

    /// An environment variable.
    #[must_use]
    pub fn environment_variable(&self, name: &str) -> Option<serde_json::Value> {
        self.environment.read().get(name).cloned()
    }

    /// Set an environment variable. Last write wins.
    pub fn set_environment_variable(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ContextError> {
        let mut environment = self.environment.write();
        if self.is_started() {
            return Err(ContextError::ExecutionStarted);
        }
        environment.insert(name.into(), value);
        Ok(())
    }

    /// Snapshot of all environment variables.
    #[must_use]
    pub fn environment(&self) -> HashMap<String, serde_json::Value> {
        self.environment.read().clone()
    }

    /// Unique id of this execution attempt.
    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// The logical pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<PipelineDefinition> {
        &self.pipeline
    }

    /// The materialized pipeline built when the context was created.
    #[must_use]
    pub fn materialized(&self) -> &Arc<MaterializedPipeline> {
        &self.materialized
    }

    /// The logical-to-materialized index.
    #[must_use]
    pub fn index(&self) -> &Arc<ElementIndex> {
        &self.index
    }

    /// The publisher registry behind [`event_stream`](Self::event_stream).
    #[must_use]
    pub fn publishers(&self) -> &PublisherRegistry {
        &self.publishers
    }

    /// Execution settings.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Where the engine runs.
    #[must_use]
    pub fn scheduling(&self) -> Scheduling {
        self.config.scheduling
    }

    /// Command-line style arguments supplied by the host.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// The host's metadata store, if any.
    #[must_use]
    pub fn metastore(&self) -> Option<&Arc<dyn MetaStore>> {
        self.metastore.as_ref()
    }

    /// The host's repository, if any.
    #[must_use]
    pub fn repository(&self) -> Option<&Arc<dyn Repository>> {
        self.repository.as_ref()
    }

    /// Token cancelling this execution.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("pipeline_id", &self.pipeline.id)
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("publishers", &self.publishers)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExecutionContext`].
pub struct ExecutionContextBuilder {
    engine: Arc<dyn ExecutionEngine>,
    registry: Arc<OperationRegistry>,
    pipeline: Arc<PipelineDefinition>,
    config: ExecutionConfig,
    arguments: Vec<String>,
    parameters: HashMap<String, serde_json::Value>,
    environment: HashMap<String, serde_json::Value>,
    metastore: Option<Arc<dyn MetaStore>>,
    repository: Option<Arc<dyn Repository>>,
}

impl ExecutionContextBuilder {
    /// Set the execution settings.
    #[must_use]
    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Append an argument.
    #[must_use]
    pub fn argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Set an initial parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Set an initial environment variable.
    #[must_use]
    pub fn environment_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.environment.insert(name.into(), value);
        self
    }

    /// Attach the host's metadata store.
    #[must_use]
    pub fn metastore(mut self, metastore: Arc<dyn MetaStore>) -> Self {
        self.metastore = Some(metastore);
        self
    }

    /// Attach the host's repository.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Validate the configuration, materialize the pipeline and build the context.
    pub fn build(self) -> Result<Arc<ExecutionContext>, ContextError> {
        self.config.validate()?;

        let materialization =
            Materializer::new(self.registry, self.config.event_capacity).materialize(&self.pipeline)?;
        let publishers = PublisherRegistry::new(materialization.index.clone());

        let ctx = ExecutionContext {
            id: ExecutionId::v4(),
            pipeline: self.pipeline,
            materialized: materialization.pipeline,
            index: materialization.index,
            publishers,
            engine: self.engine,
            config: self.config,
            arguments: self.arguments,
            parameters: RwLock::new(self.parameters),
            environment: RwLock::new(self.environment),
            metastore: self.metastore,
            repository: self.repository,
            cancellation: CancellationToken::new(),
            started: AtomicBool::new(false),
        };

        tracing::info!(
            execution_id = %ctx.id,
            pipeline_id = %ctx.pipeline.id,
            elements = ctx.index.len(),
            "execution context created"
        );

        Ok(Arc::new(ctx))
    }
}

impl fmt::Debug for ExecutionContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContextBuilder")
            .field("pipeline_id", &self.pipeline.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
