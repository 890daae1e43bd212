//! Counter contract: executed/skipped/failed move with pipeline outcomes.
//! Runs as its own binary so the process-wide counters stay predictable.

mod common;

use common::{executor, request_context, FailingTransform};
use reqrep::metrics::metrics;
use reqrep::transform::headers::RequestId;
use reqrep::transform::params::TransformParams;
use reqrep::transform::streaming::StreamingPassthrough;
use reqrep::{FailureMode, Payload, PlanEntry, Transform, TransformationPlan};

#[tokio::test(flavor = "multi_thread")]
async fn counters_track_pipeline_outcomes() {
    let before = metrics().snapshot();

    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(
            RequestId::from_params(&TransformParams::empty()).expect("configure"),
        ),
    ));
    plan.request.push(PlanEntry::new(
        20,
        Transform::buffered(FailingTransform { label: "boom" }),
    ));
    plan.request.push(PlanEntry::new(
        30,
        Transform::streaming(
            StreamingPassthrough::from_params(&TransformParams::empty()).expect("configure"),
        ),
    ));
    plan.failure_mode = FailureMode::LogAndSkip;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline succeeds under LogAndSkip");

    assert_eq!(report.executed(), 2);
    assert_eq!(report.failed(), 1);

    let after = metrics().snapshot();
    assert_eq!(after.pipelines_started - before.pipelines_started, 1);
    assert_eq!(after.pipelines_completed - before.pipelines_completed, 1);
    assert_eq!(after.transforms_executed - before.transforms_executed, 2);
    assert_eq!(after.transforms_failed - before.transforms_failed, 1);

    let outcome = after
        .transform_outcomes
        .iter()
        .find(|entry| entry.transform == "boom")
        .expect("failed transform recorded");
    assert!(outcome.failed >= 1);
    assert_eq!(outcome.side, "request");
}
