//! Drives a whole exchange the way an embedding host would: request
//! pipeline, forward with a swapped response sink, response pipeline, flush.

mod common;

use common::{executor, json_payload};
use reqrep::host::{adjust_content_length, SinkSwapGuard};
use reqrep::{
    Address, MessageContext, MessageHeaders, Payload, PlanBuilder, RouteEntry, RoutePolicy, Side,
    TransformCatalog, TransformationPlan,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn route(transformer: &str, side: Side, order: i32, params: Option<&str>) -> RouteEntry {
    RouteEntry {
        method: "POST".to_string(),
        path: "/api/orders".to_string(),
        transformer: transformer.to_string(),
        side,
        order,
        params: params.map(str::to_string),
    }
}

fn plan() -> TransformationPlan {
    let rows = vec![
        route("correlation-id", Side::Request, 10, None),
        route("gateway-metadata", Side::Request, 20, None),
        route("remove-internal-headers", Side::Response, 10, None),
        route(
            "gateway-response-tag",
            Side::Response,
            20,
            Some(r#"{"version":"1.2.3"}"#),
        ),
    ];
    PlanBuilder::new(Arc::new(TransformCatalog::builtin())).build(&rows, &RoutePolicy::default())
}

/// Stand-in for the host's native response body slot.
struct ResponseBodySlot {
    sink: Vec<u8>,
}

async fn forward_to_backend(request_body: &[u8], sink: &mut Vec<u8>) -> MessageHeaders {
    // Fake backend: echoes the order id and leaks an internal header.
    let request: JsonValue = serde_json::from_slice(request_body).expect("backend parses request");
    let response_body = json!({"accepted": request["order"], "status": "queued"});
    sink.extend_from_slice(response_body.to_string().as_bytes());
    MessageHeaders::from_pairs(vec![
        ("Content-Type", "application/json".to_string()),
        ("Content-Length", "0".to_string()),
        ("X-Internal-Token", "shh".to_string()),
    ])
}

#[tokio::test(flavor = "multi_thread")]
async fn full_exchange_roundtrip() {
    let plan = plan();
    let executor = executor();
    let abort = CancellationToken::new();

    // Request leg.
    let mut request_ctx = MessageContext::request(
        "POST",
        Address::parse("http://localhost/api/orders").expect("url"),
        MessageHeaders::new(),
        json_payload(r#"{"order":"ABC"}"#),
        abort.clone(),
    );
    executor
        .run_request(&mut request_ctx, &plan)
        .await
        .expect("request pipeline");
    let outbound = request_ctx.payload_mut().flush().await.expect("flush");
    let outbound_tree: JsonValue = serde_json::from_slice(&outbound).expect("outbound json");
    assert!(outbound_tree["_gateway"].is_object());

    // Forward with the response sink swapped for a buffered one; the guard
    // restores the original sink no matter how forwarding exits.
    let mut slot = ResponseBodySlot { sink: Vec::new() };
    let (captured, response_headers) = {
        let mut guard = SinkSwapGuard::swap(&mut slot.sink, Vec::new());
        let headers = forward_to_backend(&outbound, guard.current_mut()).await;
        (guard.restore(), headers)
    };
    assert!(slot.sink.is_empty(), "original sink restored untouched");

    // Response leg over the captured bytes.
    let content_type = response_headers.get("Content-Type").map(str::to_string);
    let mut response_ctx = MessageContext::response(
        "POST",
        Address::parse("http://localhost/api/orders").expect("url"),
        response_headers,
        Payload::from_buffer(content_type, captured),
        abort,
    );
    executor
        .run_response(&mut response_ctx, &plan)
        .await
        .expect("response pipeline");

    assert!(!response_ctx.headers().contains("X-Internal-Token"));
    assert_eq!(
        response_ctx.headers().get("X-Gateway-Version"),
        Some("1.2.3")
    );

    // Host writes the final bytes and fixes the length.
    let final_bytes = response_ctx.payload_mut().flush().await.expect("flush");
    adjust_content_length(response_ctx.headers_mut(), final_bytes.len());
    assert_eq!(
        response_ctx.headers().get("Content-Length"),
        Some(final_bytes.len().to_string().as_str())
    );

    let final_tree: JsonValue = serde_json::from_slice(&final_bytes).expect("final json");
    assert_eq!(final_tree["accepted"], json!("ABC"));
}
