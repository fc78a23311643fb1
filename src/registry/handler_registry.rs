//! # Handler Registry
//!
//! Explicit mapping from operation name to handler, built once at process
//! start. Both the HTTP layer and the CLI dispatch through it, so every entry
//! point runs the same validation and the same service calls.

use crate::constants::operations;
use crate::error::{IndexerError, Result};
use crate::orchestration::{IndexRequest, IndexingService};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type Handler = fn(Arc<IndexingService>, Value) -> BoxFuture<'static, Result<Value>>;

#[derive(Debug, Deserialize)]
struct RunRef {
    run_id: Uuid,
}

fn parse<T: for<'de> Deserialize<'de>>(operation: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| IndexerError::configuration(format!("invalid {operation} payload: {e}")))
}

fn index(service: Arc<IndexingService>, payload: Value) -> BoxFuture<'static, Result<Value>> {
    async move {
        let request: IndexRequest = parse(operations::INDEX, payload)?;
        let run_id = service.start_index(request)?;
        Ok(json!(run_id))
    }
    .boxed()
}

fn resume(service: Arc<IndexingService>, payload: Value) -> BoxFuture<'static, Result<Value>> {
    async move {
        let RunRef { run_id } = parse(operations::RESUME, payload)?;
        let run_id = service.resume(run_id).await?;
        Ok(json!(run_id))
    }
    .boxed()
}

fn status(service: Arc<IndexingService>, payload: Value) -> BoxFuture<'static, Result<Value>> {
    async move {
        let RunRef { run_id } = parse(operations::STATUS, payload)?;
        let checkpoint = service.status(run_id).await?;
        Ok(serde_json::to_value(checkpoint)?)
    }
    .boxed()
}

fn cancel(service: Arc<IndexingService>, payload: Value) -> BoxFuture<'static, Result<Value>> {
    async move {
        let RunRef { run_id } = parse(operations::CANCEL, payload)?;
        let cancelled = service.cancel(run_id).await?;
        Ok(json!({"run_id": run_id, "cancelled": cancelled}))
    }
    .boxed()
}

fn list(service: Arc<IndexingService>, _payload: Value) -> BoxFuture<'static, Result<Value>> {
    async move {
        let runs = service.list_runs().await?;
        Ok(serde_json::to_value(runs)?)
    }
    .boxed()
}

pub struct HandlerRegistry {
    service: Arc<IndexingService>,
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerRegistry {
    pub fn new(service: Arc<IndexingService>) -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        handlers.insert(operations::INDEX, index);
        handlers.insert(operations::RESUME, resume);
        handlers.insert(operations::STATUS, status);
        handlers.insert(operations::CANCEL, cancel);
        handlers.insert(operations::LIST, list);
        Self { service, handlers }
    }

    pub fn service(&self) -> &Arc<IndexingService> {
        &self.service
    }

    /// Registered operation names, sorted
    pub fn operations(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn invoke(&self, operation: &str, payload: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(operation)
            .ok_or_else(|| IndexerError::NotFound(format!("operation {operation}")))?;
        debug!(operation, "Dispatching operation");
        handler(self.service.clone(), payload).await
    }
}
