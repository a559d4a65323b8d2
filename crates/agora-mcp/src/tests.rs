use std::sync::Arc;

use agora_core::Timestamp;
use agora_core::fmt::BoxedErrorResult;
use agora_core::id::GroupId;
use agora_db::{Database, GroupRecord, SyncConfig};
use agora_engine::{SyncService, bus_channel};
use agora_providers::{ProviderEnv, ProviderRegistry};
use serde_json::{Value, json};

use crate::{McpAuth, McpContext, McpDispatcher, McpRegistry, register_builtins, scopes};

async fn fixture(auth: McpAuth) -> BoxedErrorResult<(McpDispatcher, McpContext)> {
    let db = Arc::new(Database::new_in_memory().await?);
    db.insert_group(
        GroupId::random(),
        GroupRecord {
            slug: "rustaceans".to_string(),
            name: "Rustaceans".to_string(),
            description: None,
            connections: vec![],
            member_count: 120,
            photo_url: None,
            display: true,
            featured: true,
            tags: vec!["rust".to_string()],
            social_links: Default::default(),
            sync: SyncConfig::default(),
            badge_limits: Default::default(),
            created_at: Timestamp::from(0),
        },
    )
    .await?;

    let (bus_tx, _bus_rx) = bus_channel(64);
    let sync = Arc::new(SyncService::new(
        db.clone(),
        Arc::new(ProviderRegistry::new()),
        ProviderEnv::default(),
        bus_tx.clone(),
    ));

    let mut registry = McpRegistry::new();
    register_builtins(&mut registry);

    let ctx = McpContext {
        db,
        bus: bus_tx,
        sync,
        auth,
    };
    Ok((McpDispatcher::new(registry), ctx))
}

async fn call(
    dispatcher: &McpDispatcher,
    ctx: &McpContext,
    body: Value,
) -> Option<Value> {
    dispatcher
        .handle(body.to_string().as_bytes(), ctx)
        .await
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn scoped_caller_sees_only_admitted_tools() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::with_scopes(["read:groups"])).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
    )
    .await
    .expect("response");

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .map(|t| t["name"].as_str().expect("name"))
        .collect();

    // Public tools stay visible.
    assert!(names.contains(&"groups_list"));
    assert!(names.contains(&"badges_list"));
    // Scope-gated tools the caller lacks are filtered out.
    assert!(!names.contains(&"admin_list_users"));
    assert!(!names.contains(&"events_list"));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn calling_a_tool_without_its_scope_is_an_in_band_error() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::with_scopes(["read:groups"])).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "events_list", "arguments": {} },
        }),
    )
    .await
    .expect("response");

    // Not a JSON-RPC error: an isError tool result mentioning the scope.
    assert!(response.get("error").is_none());
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));
    let text = result["content"][0]["text"].as_str().expect("text");
    assert!(text.contains("scope"));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn session_auth_admits_everything() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
    )
    .await
    .expect("response");
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .map(|t| t["name"].as_str().expect("name"))
        .collect();
    assert!(names.contains(&"admin_list_users"));

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "groups_list" },
        }),
    )
    .await
    .expect("response");
    assert_eq!(response["result"]["isError"], json!(false));
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("rustaceans"));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn schema_violations_are_in_band_errors() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "groups_get", "arguments": { "slug": 42 } },
        }),
    )
    .await
    .expect("response");
    assert_eq!(response["result"]["isError"], json!(true));
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("slug"));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn protocol_error_codes() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    // Parse failure.
    let response = dispatcher.handle(b"{not json", &ctx).await.expect("response");
    assert_eq!(response["error"]["code"], json!(-32700));

    // Wrong jsonrpc version.
    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" }),
    )
    .await
    .expect("response");
    assert_eq!(response["error"]["code"], json!(-32600));

    // Non-object message.
    let response = dispatcher.handle(b"\"ping\"", &ctx).await.expect("response");
    assert_eq!(response["error"]["code"], json!(-32600));

    // Unknown method.
    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/destroy" }),
    )
    .await
    .expect("response");
    assert_eq!(response["error"]["code"], json!(-32601));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn notifications_produce_no_response() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "method": "ping" }),
    )
    .await;
    assert!(response.is_none());

    // A batch of only notifications yields no body either.
    let response = call(
        &dispatcher,
        &ctx,
        json!([
            { "jsonrpc": "2.0", "method": "ping" },
            { "jsonrpc": "2.0", "method": "ping" },
        ]),
    )
    .await;
    assert!(response.is_none());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn batches_are_capped_and_mixed_batches_answer_requests_only() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    let oversized: Vec<Value> = (0..11)
        .map(|i| json!({ "jsonrpc": "2.0", "id": i, "method": "ping" }))
        .collect();
    let response = call(&dispatcher, &ctx, json!(oversized))
        .await
        .expect("response");
    assert_eq!(response["error"]["code"], json!(-32600));

    let response = call(
        &dispatcher,
        &ctx,
        json!([
            { "jsonrpc": "2.0", "id": 1, "method": "ping" },
            { "jsonrpc": "2.0", "method": "ping" },
        ]),
    )
    .await
    .expect("response");
    let batch = response.as_array().expect("batch response");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0]["id"], json!(1));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn resources_resolve_exact_then_template() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::with_scopes(Vec::<String>::new())).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "resources/read",
            "params": { "uri": "agora://groups" },
        }),
    )
    .await
    .expect("response");
    let text = response["result"]["contents"][0]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("rustaceans"));

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "resources/read",
            "params": { "uri": "agora://groups/rustaceans" },
        }),
    )
    .await
    .expect("response");
    let text = response["result"]["contents"][0]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("Rustaceans"));

    // Scope-gated resource denied to the scopeless caller.
    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "resources/read",
            "params": { "uri": "agora://events/upcoming" },
        }),
    )
    .await
    .expect("response");
    assert!(response.get("error").is_some());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn initialize_advertises_capabilities() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;
    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
    )
    .await
    .expect("response");
    assert_eq!(
        response["result"]["protocolVersion"],
        json!(crate::PROTOCOL_VERSION)
    );
    assert_eq!(response["result"]["serverInfo"]["name"], json!("agora"));
    assert!(response["result"]["capabilities"]["tools"].is_object());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn oversized_bodies_are_rejected() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;
    let huge = vec![b' '; crate::MAX_BODY_BYTES + 1];
    let response = dispatcher.handle(&huge, &ctx).await.expect("response");
    assert_eq!(response["error"]["code"], json!(-32600));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn prompts_render_from_store_state() -> BoxedErrorResult<()> {
    let (dispatcher, ctx) = fixture(McpAuth::session()).await?;

    let response = call(
        &dispatcher,
        &ctx,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "prompts/list" }),
    )
    .await
    .expect("response");
    let names: Vec<&str> = response["result"]["prompts"]
        .as_array()
        .expect("prompts")
        .iter()
        .map(|p| p["name"].as_str().expect("name"))
        .collect();
    assert!(names.contains(&"event_announcement"));
    assert!(names.contains(&"group_digest"));

    let response = call(
        &dispatcher,
        &ctx,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "prompts/get",
            "params": { "name": "group_digest", "arguments": { "slug": "rustaceans" } },
        }),
    )
    .await
    .expect("response");
    let text = response["result"]["messages"][0]["content"]["text"]
        .as_str()
        .expect("text");
    assert!(text.contains("Rustaceans"));
    Ok(())
}

// `scopes` consts are part of the public surface used by the server crate.
#[test]
fn scope_names_are_stable() {
    assert_eq!(scopes::READ_EVENTS, "read:events");
    assert_eq!(scopes::ADMIN, "admin");
}
