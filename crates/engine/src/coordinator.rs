//! `ExecutionCoordinator` — the execution state machine.
//!
//! ```text
//! start_execution ──▶ running ──complete_execution──▶ completed
//!                        │
//!                        └────fail_execution─────────▶ failed
//! ```
//!
//! Every call re-validates that the execution exists before writing, and
//! every state change is one event appended through [`EventLog`] plus one
//! patch of the execution's summary fields. Nothing here decides that a node
//! failure fails the run: the external executor says so by calling
//! [`ExecutionCoordinator::fail_execution`]. There is no timeout either; an
//! executor that dies without calling it leaves the execution `running`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::{
    Store,
    models::{ExecutionPatch, ExecutionRow},
};

use crate::{
    EngineError, EventLog,
    metrics::ExecutionMetrics,
    models::{EventLevel, Execution, ExecutionEvent, ExecutionStatus, event_types},
};

#[derive(Clone)]
pub struct ExecutionCoordinator {
    store: Arc<dyn Store>,
    events: EventLog,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<dyn Store>, events: EventLog) -> Self {
        Self { store, events }
    }

    /// Create a running execution for `scenario_id` and return its id.
    #[instrument(skip(self, trigger))]
    pub async fn start_execution(
        &self,
        scenario_id: Uuid,
        trigger: Value,
    ) -> Result<Uuid, EngineError> {
        if self.store.get_scenario(scenario_id).await?.is_none() {
            return Err(EngineError::not_found("scenario", scenario_id));
        }

        let now = Utc::now();
        let row = ExecutionRow {
            id: Uuid::new_v4(),
            scenario_id,
            status: ExecutionStatus::Running.to_string(),
            progress: 0.0,
            current_node_id: None,
            estimated_time_remaining_ms: None,
            trigger: trigger.clone(),
            output: None,
            error: None,
            failed_node_id: None,
            metrics: None,
            start_time: now,
            end_time: None,
            last_updated: now,
        };
        self.store.insert_execution(&row).await?;

        self.events
            .append(
                row.id,
                event_types::EXECUTION_STARTED,
                None,
                json!({ "trigger": trigger }),
                None,
            )
            .await?;

        info!(execution_id = %row.id, "execution started");
        Ok(row.id)
    }

    /// Record a node-level event and make `node_id` the current node.
    ///
    /// Run lifecycle tags (`execution_started`, `execution_completed`,
    /// `execution_failed`) are refused with `InvalidState`: the run only
    /// starts and ends through this coordinator's own transitions.
    #[instrument(skip(self, details))]
    pub async fn advance_node(
        &self,
        execution_id: Uuid,
        node_id: Uuid,
        event_type: &str,
        details: Value,
    ) -> Result<ExecutionEvent, EngineError> {
        self.load(execution_id).await?;
        if event_types::is_execution_lifecycle(event_type) {
            return Err(EngineError::InvalidState(format!(
                "{event_type} cannot be recorded as a node event"
            )));
        }

        let event = self
            .events
            .append(execution_id, event_type, Some(node_id), details, None)
            .await?;

        self.store
            .patch_execution(
                execution_id,
                &ExecutionPatch {
                    current_node_id: Some(node_id),
                    last_updated: Some(event.timestamp),
                    ..Default::default()
                },
            )
            .await?;

        if event.level >= EventLevel::Warning {
            warn!(level = %event.level, "node event recorded");
        }
        Ok(event)
    }

    /// Report progress of a running execution.
    ///
    /// `progress` is clamped into `[0, 100]`; NaN is rejected. Without an
    /// explicit estimate the remaining time is extrapolated from the elapsed
    /// time, and cleared while progress is still 0. Returns `false` without
    /// writing anything when the execution has already finished. Never
    /// changes the status.
    #[instrument(skip(self))]
    pub async fn update_progress(
        &self,
        execution_id: Uuid,
        progress: f64,
        current_node_id: Option<Uuid>,
        estimated_time_remaining_ms: Option<i64>,
    ) -> Result<bool, EngineError> {
        if progress.is_nan() {
            return Err(EngineError::InvalidState("progress must be a number".into()));
        }

        let execution = self.load(execution_id).await?;
        if execution.status.is_terminal() {
            warn!(status = %execution.status, "progress reported for finished execution, ignored");
            return Ok(false);
        }

        let clamped = progress.clamp(0.0, 100.0);
        if clamped != progress {
            warn!(clamped, "progress out of range, clamped");
        }

        let estimate = match estimated_time_remaining_ms {
            Some(ms) => Some(ms),
            None => {
                let elapsed_ms = (Utc::now() - execution.start_time).num_milliseconds();
                estimate_remaining_ms(elapsed_ms, clamped)
            }
        };

        self.store
            .patch_execution(
                execution_id,
                &ExecutionPatch {
                    progress: Some(clamped),
                    current_node_id,
                    estimated_time_remaining_ms: Some(estimate),
                    ..Default::default()
                },
            )
            .await?;

        self.events
            .append(
                execution_id,
                event_types::PROGRESS_UPDATED,
                None,
                json!({
                    "progress": clamped,
                    "current_node_id": current_node_id,
                    "estimated_time_remaining_ms": estimate,
                }),
                Some(EventLevel::Debug),
            )
            .await?;

        Ok(true)
    }

    /// Mark the execution completed with its final output.
    #[instrument(skip(self, output))]
    pub async fn complete_execution(
        &self,
        execution_id: Uuid,
        output: Value,
    ) -> Result<(), EngineError> {
        self.finish(
            execution_id,
            ExecutionStatus::Completed,
            ExecutionPatch {
                output: Some(output.clone()),
                ..Default::default()
            },
        )
        .await?;

        self.events
            .append(
                execution_id,
                event_types::EXECUTION_COMPLETED,
                None,
                json!({ "output": output }),
                None,
            )
            .await?;

        info!("execution completed");
        Ok(())
    }

    /// Mark the execution failed. `failed_node_id`, when known, is stored on
    /// the execution and tags the `execution_failed` event.
    #[instrument(skip(self))]
    pub async fn fail_execution(
        &self,
        execution_id: Uuid,
        error: &str,
        failed_node_id: Option<Uuid>,
    ) -> Result<(), EngineError> {
        self.finish(
            execution_id,
            ExecutionStatus::Failed,
            ExecutionPatch {
                error: Some(error.to_owned()),
                failed_node_id,
                ..Default::default()
            },
        )
        .await?;

        self.events
            .append(
                execution_id,
                event_types::EXECUTION_FAILED,
                failed_node_id,
                json!({ "error": error }),
                Some(EventLevel::Error),
            )
            .await?;

        warn!(error, "execution failed");
        Ok(())
    }

    /// Cache computed metrics on the execution. Write-once: when metrics are
    /// already stored they are returned and `metrics` is discarded.
    #[instrument(skip(self, metrics))]
    pub async fn record_metrics(
        &self,
        execution_id: Uuid,
        metrics: ExecutionMetrics,
    ) -> Result<ExecutionMetrics, EngineError> {
        let execution = self.load(execution_id).await?;
        if let Some(existing) = execution.metrics {
            return Ok(existing);
        }

        let raw = serde_json::to_value(&metrics).map_err(|e| EngineError::CorruptRecord {
            entity: "execution",
            id: execution_id,
            reason: format!("metrics: {e}"),
        })?;
        self.store
            .patch_execution(
                execution_id,
                &ExecutionPatch {
                    metrics: Some(raw),
                    ..Default::default()
                },
            )
            .await?;

        info!("metrics cached");
        Ok(metrics)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn load(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let row = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))?;
        Execution::try_from(row)
    }

    /// Move a running execution into a terminal status.
    async fn finish(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        patch: ExecutionPatch,
    ) -> Result<(), EngineError> {
        let execution = self.load(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "execution {execution_id} is already {}",
                execution.status
            )));
        }

        let now = Utc::now();
        self.store
            .patch_execution(
                execution_id,
                &ExecutionPatch {
                    status: Some(status.to_string()),
                    end_time: Some(now),
                    last_updated: Some(now),
                    ..patch
                },
            )
            .await?;
        Ok(())
    }
}

/// Remaining time extrapolated from `elapsed_ms` at the reported rate.
/// `None` until there is progress to extrapolate from.
fn estimate_remaining_ms(elapsed_ms: i64, progress: f64) -> Option<i64> {
    if progress <= 0.0 {
        return None;
    }
    let elapsed = elapsed_ms.max(0) as f64;
    let total = elapsed / (progress / 100.0);
    Some((total - elapsed).max(0.0).round() as i64)
}
