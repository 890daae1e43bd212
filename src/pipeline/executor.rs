//! The ordered transformation executor: sorts a plan's entries, dispatches
//! typed context views, and enforces the timeout, cancellation and
//! failure-mode contracts.

use crate::config::{FailureMode, GlobalOptions};
use crate::message::context::{MessageContext, Side};
use crate::metrics::metrics;
use crate::pipeline::PipelineError;
use crate::plan::{PlanEntry, TransformationPlan};
use crate::redact::RedactionPolicy;
use crate::telemetry::{event_id, SPAN_TRANSFORM_PREFIX};
use crate::transform::{Transform, TransformError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Applied,
    Skipped,
    Failed,
    TimedOut,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Applied => "ok",
            EntryStatus::Skipped => "skipped",
            EntryStatus::Failed | EntryStatus::TimedOut => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EntryStatus::Failed | EntryStatus::TimedOut)
    }
}

/// Outcome of one scheduled transform.
#[derive(Debug, Clone)]
pub struct EntryReport {
    pub transform: &'static str,
    pub order: i32,
    pub status: EntryStatus,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Outcome of one pipeline invocation, so hosts and tests can assert
/// behaviour without scraping logs.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub side: Side,
    pub entries: Vec<EntryReport>,
}

impl PipelineReport {
    pub fn executed(&self) -> usize {
        self.count(EntryStatus::Applied)
    }

    pub fn skipped(&self) -> usize {
        self.count(EntryStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_failure())
            .count()
    }

    fn count(&self, status: EntryStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }
}

/// Stateless across exchanges; holds only the immutable global options and
/// the redaction policy derived from them.
pub struct PipelineExecutor {
    options: Arc<GlobalOptions>,
    redaction: RedactionPolicy,
}

impl PipelineExecutor {
    pub fn new(options: Arc<GlobalOptions>) -> Self {
        let redaction = RedactionPolicy::from_options(&options);
        Self { options, redaction }
    }

    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    pub async fn run_request(
        &self,
        ctx: &mut MessageContext,
        plan: &TransformationPlan,
    ) -> Result<PipelineReport, PipelineError> {
        let span = tracing::info_span!(
            target: "reqrep::pipeline",
            "reqrep.pipeline.request",
            pipeline.side = Side::Request.as_str(),
            http.request.method = %ctx.method(),
        );
        self.run_side(ctx, plan, Side::Request).instrument(span).await
    }

    pub async fn run_response(
        &self,
        ctx: &mut MessageContext,
        plan: &TransformationPlan,
    ) -> Result<PipelineReport, PipelineError> {
        let span = tracing::info_span!(
            target: "reqrep::pipeline",
            "reqrep.pipeline.response",
            pipeline.side = Side::Response.as_str(),
            http.request.method = %ctx.method(),
        );
        self.run_side(ctx, plan, Side::Response).instrument(span).await
    }

    /// Effective timeout: the plan's own when positive, else the global
    /// default.
    pub fn effective_timeout(&self, plan: &TransformationPlan) -> Duration {
        if plan.timeout > Duration::ZERO {
            plan.timeout
        } else {
            self.options.default_timeout
        }
    }

    /// Effective failure mode: the plan's own only when explicitly set. The
    /// enum value alone must never decide; an unset mode falls back to the
    /// global default.
    pub fn effective_failure_mode(&self, plan: &TransformationPlan) -> FailureMode {
        if plan.explicit_failure_mode {
            plan.failure_mode
        } else {
            self.options.default_failure_mode
        }
    }

    async fn run_side(
        &self,
        ctx: &mut MessageContext,
        plan: &TransformationPlan,
        side: Side,
    ) -> Result<PipelineReport, PipelineError> {
        debug_assert_eq!(ctx.side(), side, "context side must match entry point");

        let entries = plan.sorted_entries(side);
        let timeout = self.effective_timeout(plan);
        let timeout_ms = timeout.as_millis() as u64;
        let failure_mode = self.effective_failure_mode(plan);
        let collector = metrics();

        collector.record_pipeline_started();
        tracing::info!(
            target: "reqrep::pipeline",
            event = "pipeline_started",
            event_id = event_id::PIPELINE_STARTED,
            side = side.as_str(),
            transforms = entries.len(),
            timeout_ms,
            failure_mode = failure_mode.as_str(),
        );
        let redacted_query = ctx
            .address()
            .query()
            .map(|query| self.redaction.redact_query(query))
            .unwrap_or_default();
        let redacted_headers = self.redaction.header_line(ctx.headers().iter());
        tracing::debug!(
            target: "reqrep::pipeline",
            event = "pipeline_message",
            side = side.as_str(),
            method = %ctx.method(),
            path = %ctx.address().path(),
            query = %redacted_query,
            headers = %redacted_headers,
        );

        let report = if plan.allow_parallel && entries.len() > 1 {
            self.run_entries_parallel(ctx, &entries, side, timeout, failure_mode)
                .await
        } else {
            self.run_entries_sequential(ctx, &entries, side, timeout, failure_mode)
                .await
        };

        match &report {
            Ok(report) => {
                collector.record_pipeline_completed();
                tracing::info!(
                    target: "reqrep::pipeline",
                    event = "pipeline_completed",
                    event_id = event_id::PIPELINE_COMPLETED,
                    side = side.as_str(),
                    executed = report.executed(),
                    skipped = report.skipped(),
                    failed = report.failed(),
                );
            }
            Err(err) => {
                collector.record_pipeline_aborted();
                tracing::error!(
                    target: "reqrep::pipeline",
                    event = "pipeline_aborted",
                    event_id = event_id::PIPELINE_ABORTED,
                    side = side.as_str(),
                    error = %err,
                );
            }
        }

        report
    }

    async fn run_entries_sequential(
        &self,
        ctx: &mut MessageContext,
        entries: &[PlanEntry],
        side: Side,
        timeout: Duration,
        failure_mode: FailureMode,
    ) -> Result<PipelineReport, PipelineError> {
        let mut reports = Vec::with_capacity(entries.len());

        for entry in entries {
            if ctx.cancellation().is_cancelled() {
                return Err(PipelineError::ClientAbort);
            }

            let report = self.run_entry(ctx, entry, side, timeout).await?;
            let failed = report.status.is_failure();
            let transform = report.transform;
            reports.push(report);

            if failed && failure_mode == FailureMode::StopPipeline {
                return Err(PipelineError::TransformationFailed {
                    transform: transform.to_string(),
                    side,
                });
            }
        }

        Ok(PipelineReport {
            side,
            entries: reports,
        })
    }

    /// Structured fan-out for plans that opted in. Entry completion is
    /// awaited before returning; access to the context is serialised behind
    /// an async mutex, so this is safe but preserves no ordering. Intended
    /// strictly for independent header/address transforms; JSON-mutating
    /// plans must stay sequential.
    async fn run_entries_parallel(
        &self,
        ctx: &mut MessageContext,
        entries: &[PlanEntry],
        side: Side,
        timeout: Duration,
        failure_mode: FailureMode,
    ) -> Result<PipelineReport, PipelineError> {
        let shared = tokio::sync::Mutex::new(ctx);

        let tasks = entries.iter().map(|entry| {
            let shared = &shared;
            async move {
                let mut guard = shared.lock().await;
                self.run_entry(&mut guard, entry, side, timeout).await
            }
        });

        let results = futures_util::future::join_all(tasks).await;

        let mut reports = Vec::with_capacity(entries.len());
        let mut failure: Option<PipelineError> = None;

        for result in results {
            match result {
                Ok(report) => {
                    if report.status.is_failure()
                        && failure_mode == FailureMode::StopPipeline
                        && failure.is_none()
                    {
                        failure = Some(PipelineError::TransformationFailed {
                            transform: report.transform.to_string(),
                            side,
                        });
                    }
                    reports.push(report);
                }
                // Client abort outranks any transform failure.
                Err(PipelineError::ClientAbort) => return Err(PipelineError::ClientAbort),
                Err(other) => return Err(other),
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }

        Ok(PipelineReport {
            side,
            entries: reports,
        })
    }

    async fn run_entry(
        &self,
        ctx: &mut MessageContext,
        entry: &PlanEntry,
        side: Side,
        timeout: Duration,
    ) -> Result<EntryReport, PipelineError> {
        let name = entry.transform.name();
        let content_type = ctx.payload().content_type().unwrap_or("").to_string();
        let ambient = ctx.cancellation().clone();
        let collector = metrics();

        let span = tracing::info_span!(
            target: "reqrep::transform",
            "reqrep.transform",
            otel.name = %format!("{SPAN_TRANSFORM_PREFIX}.{name}"),
            transform.name = name,
            transform.side = side.as_str(),
            transform.order = entry.order,
            transform.result = tracing::field::Empty,
            payload.content_type = %content_type,
        );

        crate::transform_event!(
            debug,
            "reqrep::transform",
            "transform_executing",
            event_id::TRANSFORM_EXECUTING,
            transform = name,
            side = side.as_str(),
            order = entry.order,
        );

        let started = Instant::now();
        let step_token = ambient.child_token();

        // Ok(true) = applied, Ok(false) = guard said skip.
        let outcome: Result<bool, TransformError> = {
            let span = span.clone();
            let apply = async {
                match &entry.transform {
                    Transform::Buffered(transform) => {
                        let mut view = ctx.buffered_view();
                        if !transform.should_apply(&view) {
                            return Ok(false);
                        }
                        transform.apply(&mut view, &step_token).await.map(|_| true)
                    }
                    Transform::Streaming(transform) => {
                        let mut view = ctx.streaming_view();
                        if !transform.should_apply(&view) {
                            return Ok(false);
                        }
                        transform.apply(&mut view, &step_token).await.map(|_| true)
                    }
                }
            };

            tokio::select! {
                biased;
                _ = ambient.cancelled() => {
                    return Err(PipelineError::ClientAbort);
                }
                result = tokio::time::timeout(timeout, apply).instrument(span) => match result {
                    Ok(inner) => inner,
                    Err(_) => {
                        step_token.cancel();
                        Err(TransformError::Timeout {
                            elapsed_ms: timeout.as_millis() as u64,
                        })
                    }
                }
            }
        };

        let elapsed = started.elapsed();

        let report = match outcome {
            Ok(true) => {
                let elapsed_ms = elapsed.as_millis() as u64;
                span.record("transform.result", "ok");
                collector.record_transform_executed(name, side.as_str(), elapsed);
                crate::transform_event!(
                    info,
                    "reqrep::transform",
                    "transform_completed",
                    event_id::TRANSFORM_COMPLETED,
                    transform = name,
                    side = side.as_str(),
                    elapsed_ms = elapsed_ms,
                );
                EntryReport {
                    transform: name,
                    order: entry.order,
                    status: EntryStatus::Applied,
                    elapsed,
                    error: None,
                }
            }
            Ok(false) => {
                span.record("transform.result", "skipped");
                collector.record_transform_skipped(name, side.as_str());
                crate::transform_event!(
                    debug,
                    "reqrep::transform",
                    "transform_skipped",
                    event_id::TRANSFORM_SKIPPED,
                    transform = name,
                    side = side.as_str(),
                );
                EntryReport {
                    transform: name,
                    order: entry.order,
                    status: EntryStatus::Skipped,
                    elapsed,
                    error: None,
                }
            }
            Err(err) => {
                // A failure caused by the client going away propagates as an
                // abort instead of entering failure handling.
                if ambient.is_cancelled() && !err.is_timeout() {
                    return Err(PipelineError::ClientAbort);
                }

                span.record("transform.result", "failed");
                collector.record_transform_failed(name, side.as_str());

                let (status, event, id) = if err.is_timeout() {
                    (
                        EntryStatus::TimedOut,
                        "transform_timed_out",
                        event_id::TRANSFORM_TIMED_OUT,
                    )
                } else {
                    (
                        EntryStatus::Failed,
                        "transform_failed",
                        event_id::TRANSFORM_FAILED,
                    )
                };

                crate::transform_event!(
                    error,
                    "reqrep::transform",
                    event,
                    id,
                    transform = name,
                    side = side.as_str(),
                    error = err,
                );

                EntryReport {
                    transform: name,
                    order: entry.order,
                    status,
                    elapsed,
                    error: Some(err.to_string()),
                }
            }
        };

        Ok(report)
    }
}
