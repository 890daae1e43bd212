mod common;

use common::{
    executor, is_hex_id, json_payload, request_context, response_context, unsigned_token,
    FailingTransform,
};
use reqrep::host::{gateway_error_for, GATEWAY_ERROR_STATUS};
use reqrep::{
    FailureMode, Payload, PipelineError, PlanBuilder, PlanEntry, RouteEntry, RoutePolicy, Side,
    Transform, TransformCatalog, TransformationPlan,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn row(transformer: &str, order: i32, params: Option<&str>) -> RouteEntry {
    RouteEntry {
        method: "POST".to_string(),
        path: "/api".to_string(),
        transformer: transformer.to_string(),
        side: Side::Request,
        order,
        params: params.map(str::to_string),
    }
}

fn build_plan(rows: &[RouteEntry], policy: &RoutePolicy) -> TransformationPlan {
    PlanBuilder::new(Arc::new(TransformCatalog::builtin())).build(rows, policy)
}

#[tokio::test(flavor = "multi_thread")]
async fn order_submission_pipeline_enriches_headers_and_body() {
    let plan = build_plan(
        &[
            row("correlation-id", 10, None),
            row("request-id", 20, None),
            row("jwt-forward", 30, None),
            row(
                "jwt-claims-extract",
                40,
                Some(r#"{"claimMap":"sub=X-User-Id|email=X-User-Email"}"#),
            ),
            row("gateway-metadata", 50, None),
        ],
        &RoutePolicy::default(),
    );

    let mut ctx = request_context(
        "POST",
        "http://localhost/api/orders",
        json_payload(r#"{"order":"ABC"}"#),
    );
    let token = unsigned_token(&json!({"sub":"u123","email":"a@b"}));
    ctx.headers_mut().set("Authorization", format!("Bearer {token}"));

    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");
    assert_eq!(report.failed(), 0);

    let headers = ctx.headers();
    assert!(is_hex_id(headers.get("X-Correlation-Id").expect("correlation id")));
    assert!(is_hex_id(headers.get("X-Request-Id").expect("request id")));
    assert_eq!(headers.get("X-User-Id"), Some("u123"));
    assert_eq!(headers.get("X-User-Email"), Some("a@b"));
    assert!(headers.contains("Authorization"), "token must be retained");

    let flushed = ctx.payload_mut().flush().await.expect("flush");
    let body: JsonValue = serde_json::from_slice(&flushed).expect("reparse");
    assert_eq!(body["order"], json!("ABC"));
    let gateway = body["_gateway"].as_object().expect("_gateway object");
    assert!(gateway.contains_key("version"));
    assert!(gateway
        .get("processedAt")
        .and_then(JsonValue::as_str)
        .is_some_and(|stamp| stamp.ends_with('Z')));
    assert!(gateway
        .get("requestId")
        .and_then(JsonValue::as_str)
        .is_some_and(is_hex_id));
}

#[tokio::test(flavor = "multi_thread")]
async fn catalog_listing_rewrites_the_path_prefix() {
    let plan = build_plan(
        &[
            row("correlation-id", 10, None),
            row("jwt-forward", 20, None),
            row(
                "path-prefix-rewrite",
                30,
                Some(r#"{"from":"/api/products","to":"/catalog"}"#),
            ),
        ],
        &RoutePolicy::default(),
    );

    let mut ctx = request_context("GET", "http://localhost/api/products", Payload::empty());
    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert_eq!(ctx.address().path(), "/catalog");
    assert_eq!(ctx.method(), "GET");
    assert!(is_hex_id(
        ctx.headers().get("X-Correlation-Id").expect("correlation id")
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_route_swaps_client_auth_for_internal_key() {
    let plan = build_plan(
        &[
            row("correlation-id", 10, None),
            row("strip-authorization", 20, None),
            row(
                "add-header",
                30,
                Some(r#"{"name":"X-Internal-Key","value":"secret"}"#),
            ),
        ],
        &RoutePolicy {
            failure_mode: Some(FailureMode::StopPipeline),
            ..RoutePolicy::default()
        },
    );

    let mut ctx = request_context("POST", "http://localhost/api/admin", Payload::empty());
    ctx.headers_mut().set("Authorization", "Bearer client-token");

    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert!(!ctx.headers().contains("Authorization"));
    assert_eq!(ctx.headers().get("X-Internal-Key"), Some("secret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_route_failure_becomes_a_gateway_error() {
    // Same shape as the admin plan, but strip-authorization is forced to
    // throw and the route runs under StopPipeline.
    let mut plan = TransformationPlan::empty();
    plan.request.push(PlanEntry::new(
        10,
        Transform::buffered(FailingTransform {
            label: "strip-authorization",
        }),
    ));
    plan.failure_mode = FailureMode::StopPipeline;
    plan.explicit_failure_mode = true;

    let mut ctx = request_context("POST", "http://localhost/api/admin", Payload::empty());
    let err = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect_err("forced failure must abort");

    let (status, body) = gateway_error_for(&err).expect("gateway error");
    assert_eq!(status, GATEWAY_ERROR_STATUS);
    assert_eq!(
        body,
        "Gateway error: request transformation failed in 'strip-authorization'."
    );
    match err {
        PipelineError::TransformationFailed { transform, side } => {
            assert_eq!(transform, "strip-authorization");
            assert_eq!(side, Side::Request);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn json_mutations_match_direct_tree_edits() {
    let plan = build_plan(
        &[
            row("json-add-field", 10, Some(r#"{"field":"added","value":"v"}"#)),
            row("json-rename-field", 20, Some(r#"{"from":"old","to":"new"}"#)),
            row("json-remove-field", 30, Some(r#"{"field":"drop"}"#)),
            row(
                "json-set-path",
                40,
                Some(r#"{"path":"meta.nested.flag","value":true}"#),
            ),
        ],
        &RoutePolicy::default(),
    );

    let original = json!({"old": 1, "drop": 2, "keep": 3});
    let mut ctx = request_context(
        "POST",
        "http://localhost/api/orders",
        json_payload(&original.to_string()),
    );
    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    let flushed = ctx.payload_mut().flush().await.expect("flush");
    let piped: JsonValue = serde_json::from_slice(&flushed).expect("reparse");

    // The same edits applied directly to the tree in memory.
    let mut direct = original;
    let map = direct.as_object_mut().expect("object");
    map.insert("added".to_string(), json!("v"));
    let old = map.remove("old").expect("old field");
    map.insert("new".to_string(), old);
    map.remove("drop");
    map.insert("meta".to_string(), json!({"nested": {"flag": true}}));

    assert_eq!(piped, direct);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_token_skips_claim_extraction_silently() {
    let plan = build_plan(
        &[row(
            "jwt-claims-extract",
            10,
            Some(r#"{"claimMap":"sub=X-User-Id"}"#),
        )],
        &RoutePolicy {
            failure_mode: Some(FailureMode::StopPipeline),
            ..RoutePolicy::default()
        },
    );

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    ctx.headers_mut().set("Authorization", "Bearer not.a.jwt");

    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("malformed token is not a failure");
    assert_eq!(report.failed(), 0);
    assert!(!ctx.headers().contains("X-User-Id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn response_side_catalog_cleans_internal_headers() {
    let rows = vec![
        RouteEntry {
            method: "GET".to_string(),
            path: "/api".to_string(),
            transformer: "remove-internal-headers".to_string(),
            side: Side::Response,
            order: 10,
            params: None,
        },
        RouteEntry {
            method: "GET".to_string(),
            path: "/api".to_string(),
            transformer: "gateway-response-tag".to_string(),
            side: Side::Response,
            order: 20,
            params: Some(r#"{"version":"9.9.9"}"#.to_string()),
        },
    ];
    let plan = build_plan(&rows, &RoutePolicy::default());

    let mut ctx = response_context("http://localhost/api", Payload::empty());
    ctx.headers_mut().set("X-Internal-Token", "shh");
    ctx.headers_mut().set("Server", "kestrel");
    ctx.headers_mut().set("Content-Type", "text/plain");

    executor()
        .run_response(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert!(!ctx.headers().contains("X-Internal-Token"));
    assert!(!ctx.headers().contains("Server"));
    assert_eq!(ctx.headers().get("X-Gateway-Version"), Some("9.9.9"));
    assert_eq!(ctx.headers().get("X-Processed-By"), Some("reqrep-gateway"));
    assert_eq!(ctx.headers().get("Content-Type"), Some("text/plain"));
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_plan_touches_headers_but_never_the_body() {
    let rows = vec![
        RouteEntry {
            method: "POST".to_string(),
            path: "/upload".to_string(),
            transformer: "streaming-passthrough".to_string(),
            side: Side::Request,
            order: 10,
            params: None,
        },
        RouteEntry {
            method: "POST".to_string(),
            path: "/upload".to_string(),
            transformer: "streaming-content-tag".to_string(),
            side: Side::Request,
            order: 20,
            params: None,
        },
    ];
    let plan = build_plan(&rows, &RoutePolicy::default());

    let payload = Payload::from_reader(
        Some("application/octet-stream".to_string()),
        Box::new(&b"binary-upload-bytes"[..]),
    );
    let mut ctx = request_context("POST", "http://localhost/upload", payload);

    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("streaming plan should succeed");
    assert_eq!(report.executed(), 2);
    assert_eq!(ctx.headers().get("X-Streamed-By"), Some("reqrep-gateway"));

    // The body was never buffered; flush drains the reader exactly once.
    let flushed = ctx.payload_mut().flush().await.expect("flush");
    assert_eq!(flushed.as_ref(), b"binary-upload-bytes");
}

#[tokio::test(flavor = "multi_thread")]
async fn method_override_is_conditional() {
    let plan = build_plan(
        &[row(
            "method-override",
            10,
            Some(r#"{"method":"PUT","onlyMethod":"POST"}"#),
        )],
        &RoutePolicy::default(),
    );

    let mut ctx = request_context("POST", "http://localhost/api", Payload::empty());
    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");
    assert_eq!(ctx.method(), "PUT");

    let mut ctx = request_context("GET", "http://localhost/api", Payload::empty());
    let report = executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");
    assert_eq!(ctx.method(), "GET");
    assert_eq!(report.skipped(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn query_and_host_rewrites_compose() {
    let plan = build_plan(
        &[
            row(
                "host-rewrite",
                10,
                Some(r#"{"host":"backend.internal","port":9000}"#),
            ),
            row("add-query-param", 20, Some(r#"{"name":"source","value":"gw"}"#)),
            row("remove-query-param", 30, Some(r#"{"name":"debug"}"#)),
        ],
        &RoutePolicy::default(),
    );

    let mut ctx = request_context(
        "GET",
        "http://edge.example.com/api/items?debug=1&page=2",
        Payload::empty(),
    );
    executor()
        .run_request(&mut ctx, &plan)
        .await
        .expect("pipeline should succeed");

    assert_eq!(ctx.address().host(), Some("backend.internal"));
    assert_eq!(ctx.address().port(), Some(9000));
    assert_eq!(ctx.address().query(), Some("page=2&source=gw"));
}
