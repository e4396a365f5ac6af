//! # Node Assembly
//!
//! Wires one cluster member together: shard storage, embedded runtime,
//! liveness tracker, metadata resolver, forwarder, query router and the HTTP
//! server on top.

use crate::api::{self, AppState};
use crate::config::NodeConfig;
use crate::forward::{Forwarder, HttpForwarder};
use crate::router::QueryRouter;
use shardgate_core::{
    EmbeddedRuntime, LivenessTracker, MetadataResolver, ShardStorage, ShardgateError,
    StreamsRuntime,
};
use std::future::Future;
use std::sync::Arc;

/// A fully wired node, not yet started.
pub struct NodeHandle {
    config: NodeConfig,
    runtime: Arc<EmbeddedRuntime>,
    router: Arc<QueryRouter>,
    liveness: LivenessTracker,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("runtime", &self.runtime)
            .field("live", &self.liveness.is_live())
            .finish_non_exhaustive()
    }
}

impl NodeHandle {
    /// Build a node that forwards over HTTP.
    pub fn build(config: NodeConfig, storage: Arc<dyn ShardStorage>) -> Result<Self, ShardgateError> {
        let forwarder = HttpForwarder::new(
            config.self_address(),
            config.forward_timeout(),
            config.server.api_key.clone(),
        )?;
        Self::build_with_forwarder(config, storage, Arc::new(forwarder))
    }

    /// Build a node with a custom forwarder.
    pub fn build_with_forwarder(
        config: NodeConfig,
        storage: Arc<dyn ShardStorage>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, ShardgateError> {
        config.validate()?;
        let registry = config.registry()?;
        let me = config.self_address();

        let runtime = Arc::new(EmbeddedRuntime::new(me.clone(), registry.stores(), storage));
        let liveness = LivenessTracker::new();
        runtime.register_state_listener(Arc::new(liveness.clone()));

        let resolver = MetadataResolver::new(
            runtime.clone() as Arc<dyn StreamsRuntime>,
            me,
            config.cluster.partitions,
        );
        let router = Arc::new(QueryRouter::new(
            runtime.clone() as Arc<dyn StreamsRuntime>,
            resolver,
            forwarder,
            registry,
        ));

        Ok(Self {
            config,
            runtime,
            router,
            liveness,
        })
    }

    /// Join the cluster with the configured members and partition count.
    pub fn start(&self) -> Result<(), ShardgateError> {
        let members = self.config.members()?;
        tracing::info!(
            node = %self.config.self_address(),
            members = members.len(),
            partitions = self.config.cluster.partitions,
            "Starting runtime"
        );
        self.runtime.start(&members, self.config.cluster.partitions)
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<EmbeddedRuntime> {
        &self.runtime
    }

    #[must_use]
    pub fn router(&self) -> &Arc<QueryRouter> {
        &self.router
    }

    #[must_use]
    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// HTTP state for this node.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState::new(self.router.clone(), self.liveness.clone())
            .with_policy(self.config.response)
            .with_settings(self.config.server.clone())
    }

    /// Serve on the configured bind address until `shutdown` resolves, then stop the runtime.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ShardgateError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_address();
        let result = api::run_server(&addr, self.app_state(), shutdown).await;
        self.stop();
        result
    }

    /// Serve on an already bound listener until `shutdown` resolves, then stop the runtime.
    pub async fn serve_on<F>(
        self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> Result<(), ShardgateError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let result = api::serve(listener, self.app_state(), shutdown).await;
        self.stop();
        result
    }

    fn stop(&self) {
        if let Err(e) = self.runtime.shutdown() {
            tracing::warn!("Runtime shutdown: {}", e);
        } else {
            tracing::info!("Runtime stopped");
        }
    }
}
