mod common;

use common::{
    executor, executor_with, json_payload, request_context, FailingTransform, RecordingTransform,
    SlowTransform,
};
use reqrep::pipeline::executor::EntryStatus;
use reqrep::{
    FailureMode, GlobalOptions, Payload, PipelineError, PlanEntry, Side, Transform,
    TransformationPlan,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn recording_plan(orders: &[i32], log: &Arc<Mutex<Vec<&'static str>>>) -> TransformationPlan {
    const LABELS: [&str; 4] = ["t-a", "t-b", "t-c", "t-d"];
    let mut plan = TransformationPlan::empty();
    for (idx, order) in orders.iter().enumerate() {
        plan.request.push(PlanEntry::new(
            *order,
            Transform::buffered(RecordingTransform {
                label: LABELS[idx],
                log: log.clone(),
            }),
        ));
    }
    plan
}

#[tokio::test(flavor = "multi_thread")]
async fn entries_apply_in_ascending_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    // Registered at 30, 10, 20; observed order must be 10, 20, 30.
    let plan = recording_plan(&[30, 10, 20], &log);

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert_eq!(*log.lock().expect("log"), vec!["t-b", "t-c", "t-a"]);
    assert_eq!(report.executed(), 3);

    let observed_orders: Vec<i32> = report.entries.iter().map(|entry| entry.order).collect();
    assert_eq!(observed_orders, vec![10, 20, 30]);
}

#[tokio::test(flavor = "multi_thread")]
async fn order_ties_keep_insertion_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let plan = recording_plan(&[10, 10, 10], &log);

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert_eq!(*log.lock().expect("log"), vec!["t-a", "t-b", "t-c"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn log_and_skip_runs_the_rest_of_the_plan() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform { label: "boom" }),
    ));
    plan.request.push(PlanEntry::new(
        20,
        Transform::buffered(RecordingTransform {
            label: "survivor",
            log: log.clone(),
        }),
    ));
    plan.failure_mode = FailureMode::LogAndSkip;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("failure mode must not abort the exchange");

    assert_eq!(*log.lock().expect("log"), vec!["survivor"]);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.executed(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn continue_behaves_like_log_and_skip_on_the_wire() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform { label: "boom" }),
    ));
    plan.request.push(PlanEntry::new(
        20,
        Transform::buffered(RecordingTransform {
            label: "survivor",
            log: log.clone(),
        }),
    ));
    plan.failure_mode = FailureMode::Continue;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("continue must not abort");
    assert_eq!(report.executed(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_pipeline_raises_with_name_and_side() {
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform {
            label: "strip-authorization",
        }),
    ));
    plan.failure_mode = FailureMode::StopPipeline;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let err = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect_err("stop pipeline must abort");

    match err {
        PipelineError::TransformationFailed { transform, side } => {
            assert_eq!(transform, "strip-authorization");
            assert_eq!(side, Side::Request);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn implicit_mode_falls_back_to_global_default() {
    // Plan never set a mode; the global default StopPipeline must win over
    // the enum's own default.
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform { label: "boom" }),
    ));
    assert!(!plan.explicit_failure_mode);

    let options = GlobalOptions {
        default_failure_mode: FailureMode::StopPipeline,
        ..GlobalOptions::default()
    };

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let err = executor_with(options)
        .run_request(&mut ctx, &plan)
        .await
        .expect_err("global default must apply");
    assert!(matches!(err, PipelineError::TransformationFailed { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_mode_wins_over_global_default() {
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform { label: "boom" }),
    ));
    plan.failure_mode = FailureMode::LogAndSkip;
    plan.explicit_failure_mode = true;

    let options = GlobalOptions {
        default_failure_mode: FailureMode::StopPipeline,
        ..GlobalOptions::default()
    };

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    executor_with(options)
        .run_request(&mut ctx, &plan)
        .await
        .expect("explicit LogAndSkip must not abort");
}

#[tokio::test(flavor = "multi_thread")]
async fn effective_timeout_prefers_the_plan() {
    let executor = executor_with(GlobalOptions {
        default_timeout: Duration::from_secs(9),
        ..GlobalOptions::default()
    });

    let mut plan = TransformationPlan::empty();
    plan.timeout = Duration::from_millis(120);
    assert_eq!(executor.effective_timeout(&plan), Duration::from_millis(120));

    plan.timeout = Duration::ZERO;
    assert_eq!(executor.effective_timeout(&plan), Duration::from_secs(9));
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_synthesises_a_timeout_failure() {
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(SlowTransform {
            delay: Duration::from_secs(30),
        }),
    ));
    plan.timeout = Duration::from_millis(50);
    plan.failure_mode = FailureMode::LogAndSkip;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("timeout under LogAndSkip proceeds");

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].status, EntryStatus::TimedOut);
    let message = report.entries[0].error.as_deref().unwrap_or_default();
    assert!(message.contains("timed out"), "got: {message}");
    assert!(message.contains("50"), "timeout ms missing: {message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn client_abort_propagates_without_failure_handling() {
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(SlowTransform {
            delay: Duration::from_secs(30),
        }),
    ));
    plan.failure_mode = FailureMode::LogAndSkip;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let abort = ctx.cancellation().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        abort.cancel();
    });

    let err = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect_err("client abort must propagate");
    assert!(matches!(err, PipelineError::ClientAbort));
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_plans_run_every_entry() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut plan = recording_plan(&[10, 20, 30], &log);
    plan.allow_parallel = true;

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("parallel plan should succeed");

    assert_eq!(report.executed(), 3);
    assert_eq!(log.lock().expect("log").len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_op_plan_returns_the_original_bytes() {
    let raw = r#"{ "untouched": true }"#;
    let mut ctx = request_context("POST", "http://localhost/api", json_payload(raw));
    let report = executor()
        .run_request(&mut ctx, &TransformationPlan::empty())
        .await
        .expect("empty plan should pass through");
    assert!(report.entries.is_empty());

    let flushed = ctx.payload_mut().flush().await.expect("flush");
    assert_eq!(flushed.as_ref(), raw.as_bytes());
}
