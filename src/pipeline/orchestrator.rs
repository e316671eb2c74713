//! Named workflows as small dependency graphs of stages.
//!
//! A stage starts once every predecessor has finished, so independent
//! stages run concurrently. A stage whose predecessor did not reach
//! `success` is recorded as `skipped` with the predecessor's reason. The run always reports every stage, in
//! dependency order, whatever order the concurrent stages finished in.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use super::stage::{StageResult, StageStatus};
use super::PipelineError;

pub type StageFuture = Pin<Box<dyn Future<Output = StageResult> + Send>>;

/// Stage body. Receives the results of its predecessors.
pub type StageFn = Box<dyn FnOnce(StageInputs) -> StageFuture + Send>;

/// Predecessor results handed to a stage.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    results: HashMap<String, StageResult>,
}

impl StageInputs {
    pub fn get(&self, stage: &str) -> Option<&StageResult> {
        self.results.get(stage)
    }

    pub fn payload_as<T: DeserializeOwned>(&self, stage: &str) -> Option<T> {
        self.get(stage).and_then(|r| r.payload_as())
    }
}

struct StageNode {
    id: String,
    deps: Vec<String>,
    run: StageFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded.
    Success,
    /// Some stages succeeded, others failed or were skipped.
    Partial,
    /// No stage succeeded.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    fn from_results(results: &[StageResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if succeeded == results.len() {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

/// Merged outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    /// Every stage outcome, in dependency order.
    pub stages: Vec<StageResult>,
    pub duration_ms: u64,
}

impl WorkflowRun {
    pub fn stage(&self, id: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == id)
    }

    pub fn payload_as<T: DeserializeOwned>(&self, id: &str) -> Option<T> {
        self.stage(id).filter(|s| s.is_success()).and_then(|s| s.payload_as())
    }

    /// First stage that did not succeed, if any.
    pub fn first_failure(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.is_success())
    }
}

/// Builder and runner for a named workflow.
pub struct Workflow {
    name: String,
    stages: Vec<StageNode>,
}

impl Workflow {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: Vec::new(),
        }
    }

    /// Add a stage that runs after every stage listed in `deps` succeeded.
    pub fn stage<F, Fut>(mut self, id: &str, deps: &[&str], f: F) -> Self
    where
        F: FnOnce(StageInputs) -> Fut + Send + 'static,
        Fut: Future<Output = StageResult> + Send + 'static,
    {
        self.stages.push(StageNode {
            id: id.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            run: Box::new(move |inputs| -> StageFuture { Box::pin(f(inputs)) }),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the graph. Only plumbing faults are returned as errors.
    ///
    /// Each stage starts as soon as its own predecessors have finished.
    /// Dropping the returned future aborts every stage still running.
    pub async fn run(self) -> Result<WorkflowRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("workflow", name = %self.name, %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(self, run_id: Uuid) -> Result<WorkflowRun, PipelineError> {
        let started = Instant::now();
        let order: Vec<String> = plan_waves(&self.stages)?.into_iter().flatten().collect();

        let mut by_id: HashMap<String, StageNode> = self
            .stages
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let mut pending: Vec<StageNode> = order.iter().filter_map(|id| by_id.remove(id)).collect();
        let mut done: HashMap<String, StageResult> = HashMap::new();
        let mut running: FuturesUnordered<StageTask> = FuturesUnordered::new();

        loop {
            // skipping a stage can release its own dependents, so repeat
            let mut skipped_any = true;
            while skipped_any {
                skipped_any = false;
                let mut waiting = Vec::new();
                for node in std::mem::take(&mut pending) {
                    if !node.deps.iter().all(|d| done.contains_key(d)) {
                        waiting.push(node);
                        continue;
                    }
                    let blocker = node
                        .deps
                        .iter()
                        .filter_map(|d| done.get(d))
                        .find(|r| r.status != StageStatus::Success);
                    if let Some(blocker) = blocker {
                        tracing::info!(stage = %node.id, blocked_by = %blocker.stage, "stage skipped");
                        let skipped = StageResult::skipped(&node.id, blocker);
                        done.insert(node.id, skipped);
                        skipped_any = true;
                        continue;
                    }
                    running.push(StageTask::spawn(node, &done));
                }
                pending = waiting;
            }

            let Some((id, joined)) = running.next().await else {
                break;
            };
            let result = joined.map_err(|e| PipelineError::Join {
                stage: id.clone(),
                reason: e.to_string(),
            })?;
            done.insert(id, result);
        }

        let stages: Vec<StageResult> = order.iter().filter_map(|id| done.remove(id)).collect();
        let status = RunStatus::from_results(&stages);
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(status = status.as_str(), elapsed_ms = duration_ms, "workflow finished");

        Ok(WorkflowRun {
            run_id,
            workflow: self.name,
            status,
            stages,
            duration_ms,
        })
    }
}

/// A spawned stage. Dropping it aborts the task.
struct StageTask {
    id: String,
    handle: JoinHandle<StageResult>,
}

impl StageTask {
    fn spawn(node: StageNode, done: &HashMap<String, StageResult>) -> Self {
        let inputs = StageInputs {
            results: node
                .deps
                .iter()
                .filter_map(|d| done.get(d).map(|r| (d.clone(), r.clone())))
                .collect(),
        };
        let span = tracing::info_span!("stage", stage = %node.id);
        let stage_id = node.id.clone();
        let fut = (node.run)(inputs);
        let handle = tokio::spawn(
            async move {
                let t = Instant::now();
                let mut result = fut.await;
                result.stage = stage_id;
                result.duration_ms = t.elapsed().as_millis() as u64;
                tracing::info!(
                    status = result.status.as_str(),
                    elapsed_ms = result.duration_ms,
                    "stage finished"
                );
                result
            }
            .instrument(span),
        );
        Self {
            id: node.id,
            handle,
        }
    }
}

impl Future for StageTask {
    type Output = (String, Result<StageResult, JoinError>);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.handle)
            .poll(cx)
            .map(|joined| (this.id.clone(), joined))
    }
}

impl Drop for StageTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Group stages into waves: each wave depends only on earlier waves.
/// Within a wave, declaration order is kept.
fn plan_waves(stages: &[StageNode]) -> Result<Vec<Vec<String>>, PipelineError> {
    let mut ids = HashSet::new();
    for node in stages {
        if !ids.insert(node.id.as_str()) {
            return Err(PipelineError::DuplicateStage(node.id.clone()));
        }
    }
    for node in stages {
        if let Some(missing) = node.deps.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(PipelineError::UnknownDependency {
                stage: node.id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut waves = Vec::new();
    while placed.len() < stages.len() {
        let wave: Vec<&str> = stages
            .iter()
            .filter(|n| !placed.contains(n.id.as_str()))
            .filter(|n| n.deps.iter().all(|d| placed.contains(d.as_str())))
            .map(|n| n.id.as_str())
            .collect();
        if wave.is_empty() {
            let remaining = stages
                .iter()
                .filter(|n| !placed.contains(n.id.as_str()))
                .map(|n| n.id.clone())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PipelineError::Cycle(remaining));
        }
        placed.extend(wave.iter().copied());
        waves.push(wave.into_iter().map(String::from).collect());
    }
    Ok(waves)
}
