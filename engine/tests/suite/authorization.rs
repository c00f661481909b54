//! Interrupted auto tools: asynchronous confirmation and connection tokens.

use assent_engine::assent_tools::{
    ACCESS_DENIED_RESULT, AuthorizationConfig, AuthorizationStatus, Interrupt, KeyValueStore,
    ScheduledTask, connection_token_key, granted_token_key, pending_request_key,
};
use assent_engine::assent_types::{ToolCallId, ToolPartState};
use assent_engine::{
    CHECK_AUTHORIZATION_CALLBACK, ToolResultNotice, TurnEvent, builtin_registry,
    continue_interruption, recorded_interrupt,
};
use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    Harness, config, drain, find_tool, harness, harness_with, run_turn, text, tool_call,
};

const PURCHASE: &str = "Purchased 10 shares of ZEKE at market price $25";

async fn due_checks(h: &Harness) -> Vec<ScheduledTask> {
    h.scheduler
        .take_due(Utc::now() + TimeDelta::seconds(60))
        .await
}

/// Model asks to buy; the purchase is interrupted pending confirmation.
async fn interrupted_purchase(h: &mut Harness) -> String {
    h.chat.push_user_text("Buy 10 ZEKE");
    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    let part = find_tool(h.chat.messages(), "call_b");
    assert_eq!(part.state(), ToolPartState::OutputError);
    let Some(Interrupt::AuthorizationPending { request_id, .. }) = recorded_interrupt(part) else {
        panic!("expected a pending authorization, got {part:?}");
    };
    assert!(events.contains(&TurnEvent::Interrupted {
        tool_call_id: ToolCallId::new("call_b"),
        interrupt: recorded_interrupt(part).unwrap(),
    }));
    assert_eq!(events.last(), Some(&TurnEvent::Finish));
    request_id
}

#[tokio::test]
async fn approved_purchase_resumes_and_completes() {
    let mut h = harness(vec![
        tool_call("call_b", "buyStock", &json!({"ticker": "ZEKE", "quantity": 10})),
        text("Your order is placed."),
    ]);
    let request_id = interrupted_purchase(&mut h).await;
    assert_eq!(h.model.requests().len(), 1);
    assert_eq!(
        h.store.get(&pending_request_key("call_b")).await.unwrap(),
        Some(request_id.clone())
    );

    // Unanswered: the check reschedules itself and nothing else happens.
    let tasks = due_checks(&h).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].callback, CHECK_AUTHORIZATION_CALLBACK);
    let before = h.chat.messages().to_vec();
    let (tx, rx) = mpsc::unbounded_channel();
    h.chat.on_scheduled_task(&tasks[0], &tx).await.unwrap();
    drop(tx);
    assert!(drain(rx).is_empty());
    assert_eq!(h.chat.messages(), before.as_slice());

    h.gate
        .resolve(
            &request_id,
            AuthorizationStatus::Approved {
                access_token: "granted".to_string(),
            },
        )
        .await
        .unwrap();
    let tasks = due_checks(&h).await;
    assert_eq!(tasks.len(), 1);
    let (tx, rx) = mpsc::unbounded_channel();
    h.chat.on_scheduled_task(&tasks[0], &tx).await.unwrap();
    drop(tx);

    assert_eq!(
        drain(rx),
        vec![
            TurnEvent::ToolResult(ToolResultNotice::new(
                ToolCallId::new("call_b"),
                json!(PURCHASE)
            )),
            TurnEvent::TextDelta("Your order is placed.".to_string()),
            TurnEvent::Finish,
        ]
    );
    let part = find_tool(h.chat.messages(), "call_b");
    assert_eq!(part.state(), ToolPartState::OutputAvailable);
    assert_eq!(part.output(), Some(&json!(PURCHASE)));
    assert_eq!(h.store.get(&granted_token_key("call_b")).await.unwrap(), None);
    assert_eq!(h.store.get(&pending_request_key("call_b")).await.unwrap(), None);
    assert!(due_checks(&h).await.is_empty());
}

#[tokio::test]
async fn denied_purchase_records_denial() {
    let mut h = harness(vec![
        tool_call("call_b", "buyStock", &json!({"ticker": "ZEKE", "quantity": 10})),
        text("Understood, no purchase."),
    ]);
    let request_id = interrupted_purchase(&mut h).await;
    h.gate
        .resolve(&request_id, AuthorizationStatus::Denied)
        .await
        .unwrap();

    let tasks = due_checks(&h).await;
    let (tx, rx) = mpsc::unbounded_channel();
    h.chat.on_scheduled_task(&tasks[0], &tx).await.unwrap();
    drop(tx);

    let events = drain(rx);
    assert_eq!(
        events[0],
        TurnEvent::ToolResult(ToolResultNotice::new(
            ToolCallId::new("call_b"),
            json!(ACCESS_DENIED_RESULT)
        ))
    );
    assert_eq!(
        find_tool(h.chat.messages(), "call_b").output(),
        Some(&json!(ACCESS_DENIED_RESULT))
    );
    assert_eq!(h.store.get(&pending_request_key("call_b")).await.unwrap(), None);
    assert_eq!(h.model.requests().len(), 2);
}

#[tokio::test]
async fn connection_interrupt_waits_for_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(header("authorization", "Bearer vault-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {"primary": {"busy": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config();
    config.tools.calendar_api_url = format!("{}/freeBusy", server.uri());
    let registry = builtin_registry(&config.tools, &AuthorizationConfig::default()).unwrap();
    let mut h = harness_with(
        registry,
        &config,
        vec![
            tool_call(
                "call_c",
                "checkUsersCalendar",
                &json!({"date": "2025-03-01T10:00:00Z"}),
            ),
            text("You are free then."),
        ],
    );
    h.chat.push_user_text("Am I free tomorrow at ten?");
    run_turn(&mut h.chat).await.0.unwrap();

    let part = find_tool(h.chat.messages(), "call_c");
    assert!(matches!(
        recorded_interrupt(part),
        Some(Interrupt::TokenVault { connection, .. }) if connection == "google-oauth2"
    ));
    assert!(due_checks(&h).await.is_empty());

    // The client completes the connection and signals the continuation.
    h.store
        .put(
            &connection_token_key("google-oauth2", "user-1"),
            "vault-token".to_string(),
        )
        .await
        .unwrap();
    let resumed = continue_interruption(h.chat.messages(), &ToolCallId::new("call_c")).unwrap();
    h.chat.set_messages(resumed);
    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    assert_eq!(
        events[0],
        TurnEvent::ToolResult(ToolResultNotice::new(
            ToolCallId::new("call_c"),
            json!({"available": true})
        ))
    );
    assert_eq!(
        find_tool(h.chat.messages(), "call_c").output(),
        Some(&json!({"available": true}))
    );
}
