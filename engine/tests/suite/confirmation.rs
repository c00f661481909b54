//! Human-in-the-loop confirmation across turns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assent_engine::assent_tools::{ExecutionContext, ToolError, ToolRegistry, execution_fn};
use assent_engine::assent_types::{
    Approval, DENIED_RESULT, MISSING_EXECUTION_RESULT, Message, MessageId, ModelMessage, Part,
    Role, ToolCallId, ToolDefinition, ToolName, ToolPart, ToolPartState,
};
use assent_engine::{TURN_FAILED_MESSAGE, ToolResultNotice, TurnError, TurnEvent};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use crate::common::{config, decide, find_tool, harness, harness_with, run_turn, text, tool_call};

const PARIS_WEATHER: &str = "The weather in Paris is sunny and 72°F with light clouds.";

fn has_tool_use(messages: &[ModelMessage], id: &str) -> bool {
    messages
        .iter()
        .any(|m| matches!(m, ModelMessage::ToolUse(call) if call.id == id))
}

fn tool_result<'a>(messages: &'a [ModelMessage], id: &str) -> Option<&'a Value> {
    messages.iter().find_map(|m| match m {
        ModelMessage::ToolResult(result) if result.tool_call_id == id => Some(&result.content),
        _ => None,
    })
}

#[tokio::test]
async fn approved_call_runs_on_next_turn() {
    let mut h = harness(vec![
        tool_call("call_w", "getWeatherInformation", &json!({"city": "Paris"})),
        text("It is sunny in Paris."),
    ]);
    h.chat.push_user_text("What's the weather in Paris?");

    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();
    assert_eq!(
        events,
        vec![
            TurnEvent::ApprovalRequested {
                tool_call_id: ToolCallId::new("call_w"),
                tool_name: "getWeatherInformation".to_string(),
                input: json!({"city": "Paris"}),
            },
            TurnEvent::Finish,
        ]
    );
    let pending = find_tool(h.chat.messages(), "call_w");
    assert_eq!(pending.state(), ToolPartState::InputAvailable);
    assert!(pending.is_unresolved());

    let approved = decide(h.chat.messages(), "call_w", Approval::Yes);
    h.chat.set_messages(approved);
    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    assert_eq!(
        events,
        vec![
            TurnEvent::ToolResult(ToolResultNotice::new(
                ToolCallId::new("call_w"),
                json!(PARIS_WEATHER)
            )),
            TurnEvent::TextDelta("It is sunny in Paris.".to_string()),
            TurnEvent::Finish,
        ]
    );
    let done = find_tool(h.chat.messages(), "call_w");
    assert_eq!(done.state(), ToolPartState::OutputAvailable);
    assert_eq!(done.output(), Some(&json!(PARIS_WEATHER)));

    let requests = h.model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].messages,
        vec![ModelMessage::User("What's the weather in Paris?".to_string())]
    );
    assert!(has_tool_use(&requests[1].messages, "call_w"));
    assert_eq!(
        tool_result(&requests[1].messages, "call_w"),
        Some(&json!(PARIS_WEATHER))
    );
}

#[tokio::test]
async fn denied_call_reports_denial_to_model() {
    let mut h = harness(vec![
        tool_call("call_w", "getWeatherInformation", &json!({"city": "Paris"})),
        text("Okay, I won't check."),
    ]);
    h.chat.push_user_text("What's the weather in Paris?");
    run_turn(&mut h.chat).await.0.unwrap();

    let denied = decide(h.chat.messages(), "call_w", Approval::No);
    h.chat.set_messages(denied);
    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    assert_eq!(
        events[0],
        TurnEvent::ToolResult(ToolResultNotice::new(
            ToolCallId::new("call_w"),
            json!(DENIED_RESULT.as_str())
        ))
    );
    let requests = h.model.requests();
    assert_eq!(
        tool_result(&requests[1].messages, "call_w"),
        Some(&json!(DENIED_RESULT.as_str()))
    );
}

#[tokio::test]
async fn undecided_call_is_hidden_from_model() {
    let mut h = harness(vec![
        tool_call("call_w", "getWeatherInformation", &json!({"city": "Paris"})),
        text("Hello again."),
    ]);
    h.chat.push_user_text("What's the weather in Paris?");
    run_turn(&mut h.chat).await.0.unwrap();

    h.chat.push_user_text("Never mind, just say hi.");
    run_turn(&mut h.chat).await.0.unwrap();

    let requests = h.model.requests();
    assert!(!has_tool_use(&requests[1].messages, "call_w"));
    assert_eq!(
        requests[1].messages,
        vec![
            ModelMessage::User("What's the weather in Paris?".to_string()),
            ModelMessage::User("Never mind, just say hi.".to_string()),
        ]
    );
    assert_eq!(
        find_tool(h.chat.messages(), "call_w").state(),
        ToolPartState::InputAvailable
    );
}

fn approved_conversation() -> Vec<Message> {
    let part = ToolPart::new(
        ToolName::new("getWeatherInformation").unwrap(),
        ToolCallId::new("call_w"),
        ToolPartState::InputAvailable,
    )
    .with_input(json!({"city": "Paris"}))
    .with_approval(Approval::Yes);
    vec![
        Message::user_text(MessageId::new("m0"), "What's the weather in Paris?"),
        Message::new(MessageId::new("m1"), Role::Assistant, vec![Part::Tool(part)]),
    ]
}

#[tokio::test]
async fn execution_failure_fails_turn_with_generic_message() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut registry = ToolRegistry::default();
    registry
        .register_confirmable(
            ToolDefinition::new("getWeatherInformation", "weather", json!({"type": "object"})),
            execution_fn(move |_input: Value, _ctx: ExecutionContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Value, _>(ToolError::ExecutionFailed {
                        tool: "getWeatherInformation".to_string(),
                        message: "secret upstream detail".to_string(),
                    })
                }
            }),
        )
        .unwrap();
    let mut h = harness_with(registry, &config(), vec![text("unused")]);
    let conversation = approved_conversation();
    h.chat.set_messages(conversation.clone());

    let (result, events) = run_turn(&mut h.chat).await;

    assert!(matches!(result, Err(TurnError::Reconcile(_))));
    assert_eq!(
        events,
        vec![TurnEvent::Error {
            message: TURN_FAILED_MESSAGE.to_string()
        }]
    );
    assert_eq!(h.chat.messages(), conversation.as_slice());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.model.requests().is_empty());
}

#[tokio::test]
async fn schema_only_tool_answers_with_fixed_error() {
    let mut registry = ToolRegistry::default();
    registry
        .register_schema(ToolDefinition::new(
            "getWeatherInformation",
            "weather",
            json!({"type": "object"}),
        ))
        .unwrap();
    let mut h = harness_with(registry, &config(), vec![text("Sorry.")]);
    h.chat.set_messages(approved_conversation());

    run_turn(&mut h.chat).await.0.unwrap();

    assert_eq!(
        find_tool(h.chat.messages(), "call_w").output(),
        Some(&json!(MISSING_EXECUTION_RESULT.as_str()))
    );
}
