//! Multi-step turns with auto tools.

use assent_engine::assent_tools::{Schedule, Scheduler};
use assent_engine::assent_types::{ModelMessage, Part, Role, ToolCallId, ToolPartState};
use assent_engine::{
    SCHEDULED_TASK_PREFIX, StreamEvent, TURN_FAILED_MESSAGE, TurnError, TurnEvent,
    builtin_registry,
};
use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::common::{config, drain, find_tool, harness, harness_with, run_turn, text, tool_call};

fn is_error_result(messages: &[ModelMessage], id: &str) -> bool {
    messages.iter().any(|m| {
        matches!(m, ModelMessage::ToolResult(result) if result.tool_call_id == id && result.is_error)
    })
}

#[tokio::test]
async fn auto_tool_runs_within_the_turn() {
    let mut h = harness(vec![
        tool_call("call_t", "getLocalTime", &json!({"timeZone": "Europe/Paris"})),
        text("It is morning in Paris."),
    ]);
    h.chat.push_user_text("What time is it in Paris?");

    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    assert_eq!(
        events[0],
        TurnEvent::ToolInputAvailable {
            tool_call_id: ToolCallId::new("call_t"),
            tool_name: "getLocalTime".to_string(),
            input: json!({"timeZone": "Europe/Paris"}),
        }
    );
    let TurnEvent::ToolResult(notice) = &events[1] else {
        panic!("expected a tool result, got {:?}", events[1]);
    };
    assert_eq!(notice.tool_call_id().as_str(), "call_t");
    assert_eq!(
        &events[2..],
        &[
            TurnEvent::TextDelta("It is morning in Paris.".to_string()),
            TurnEvent::Finish,
        ]
    );

    // One assistant message per model step.
    let messages = h.chat.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[1..].iter().all(|m| m.role() == Role::Assistant));
    let part = find_tool(messages, "call_t");
    assert_eq!(part.state(), ToolPartState::OutputAvailable);
    assert_eq!(part.output(), Some(notice.result()));
    assert_eq!(messages[2].parts()[0].as_text(), Some("It is morning in Paris."));

    let requests = h.model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].messages.iter().any(|m| matches!(
        m,
        ModelMessage::ToolResult(result) if result.tool_call_id == "call_t" && !result.is_error
    )));
    assert!(requests[0].system_prompt.ends_with("The name of the user is Ada."));
    let names: Vec<&str> = requests[0].tools.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"getWeatherInformation"));
    assert!(names.contains(&"buyStock"));
}

#[tokio::test]
async fn malformed_arguments_become_error_results() {
    let mut h = harness(vec![
        vec![
            StreamEvent::ToolCallStart {
                id: "call_x".to_string(),
                name: "getLocalTime".to_string(),
            },
            StreamEvent::ToolCallDelta {
                id: "call_x".to_string(),
                arguments: "{\"timeZone\": ".to_string(),
            },
            StreamEvent::Done,
        ],
        tool_call("call_y", "getLocalTime", &json!({"timeZone": "Mars/Olympus"})),
        tool_call("call_z", "getLocalTime", &json!({})),
        text("I could not tell the time."),
    ]);
    h.chat.push_user_text("What time is it?");

    run_turn(&mut h.chat).await.0.unwrap();

    let messages = h.chat.messages();
    let invalid = find_tool(messages, "call_x");
    assert_eq!(invalid.state(), ToolPartState::OutputError);
    assert_eq!(invalid.error_text(), Some("Invalid tool arguments JSON"));
    let unknown_zone = find_tool(messages, "call_y");
    assert_eq!(unknown_zone.state(), ToolPartState::OutputError);
    assert!(unknown_zone.error_text().unwrap().contains("Mars/Olympus"));
    let missing = find_tool(messages, "call_z");
    assert_eq!(missing.state(), ToolPartState::OutputError);
    assert!(missing.error_text().unwrap().starts_with("Bad tool args"));

    let requests = h.model.requests();
    assert_eq!(requests.len(), 4);
    assert!(is_error_result(&requests[1].messages, "call_x"));
    assert!(is_error_result(&requests[3].messages, "call_y"));
    assert!(is_error_result(&requests[3].messages, "call_z"));
}

#[tokio::test]
async fn unknown_tool_is_answered_with_error() {
    let mut h = harness(vec![
        tool_call("call_u", "launchRocket", &json!({})),
        text("I can't do that."),
    ]);
    h.chat.push_user_text("Launch the rocket");

    run_turn(&mut h.chat).await.0.unwrap();

    let part = find_tool(h.chat.messages(), "call_u");
    assert_eq!(part.state(), ToolPartState::OutputError);
    assert_eq!(part.error_text(), Some("Unknown tool: launchRocket"));
    assert_eq!(h.model.requests().len(), 2);
}

#[tokio::test]
async fn scheduled_task_posts_message_and_runs_turn() {
    let mut h = harness(vec![
        tool_call(
            "call_s",
            "scheduleTask",
            &json!({
                "description": "Water the plants",
                "when": {"type": "delayed", "delayInSeconds": 30}
            }),
        ),
        text("Scheduled."),
        text("Time to water the plants!"),
    ]);
    h.chat.push_user_text("Remind me to water the plants in 30 seconds");

    run_turn(&mut h.chat).await.0.unwrap();
    assert_eq!(
        find_tool(h.chat.messages(), "call_s").output(),
        Some(&json!("Task scheduled for type \"delayed\" : 30"))
    );

    let listed = h.scheduler.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].payload, json!("Water the plants"));
    assert!(h.scheduler.take_due(Utc::now()).await.is_empty());

    let due = h
        .scheduler
        .take_due(Utc::now() + TimeDelta::seconds(31))
        .await;
    assert_eq!(due.len(), 1);
    let (tx, rx) = mpsc::unbounded_channel();
    h.chat.on_scheduled_task(&due[0], &tx).await.unwrap();
    drop(tx);

    assert_eq!(
        drain(rx),
        vec![
            TurnEvent::TextDelta("Time to water the plants!".to_string()),
            TurnEvent::Finish,
        ]
    );
    let user_texts: Vec<&str> = h
        .chat
        .messages()
        .iter()
        .filter(|m| m.role() == Role::User)
        .filter_map(|m| m.parts().first().and_then(Part::as_text))
        .collect();
    assert_eq!(
        user_texts,
        [
            "Remind me to water the plants in 30 seconds".to_string(),
            format!("{SCHEDULED_TASK_PREFIX}Water the plants"),
        ]
    );
}

#[tokio::test]
async fn unknown_task_callback_is_ignored() {
    let mut h = harness(vec![]);
    let task = h
        .scheduler
        .schedule(
            Schedule::Delayed { delay_in_seconds: 0 },
            "somethingElse",
            Value::Null,
        )
        .await
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    h.chat.on_scheduled_task(&task, &tx).await.unwrap();
    drop(tx);

    assert!(drain(rx).is_empty());
    assert!(h.chat.messages().is_empty());
    assert!(h.model.requests().is_empty());
}

#[tokio::test]
async fn step_budget_bounds_the_turn() {
    let mut config = config();
    config.agent.max_steps = 2;
    let registry = builtin_registry(&config.tools, &config.authorization).unwrap();
    let call = |id: &str| tool_call(id, "getLocalTime", &json!({"timeZone": "UTC"}));
    let mut h = harness_with(registry, &config, vec![call("c1"), call("c2"), call("c3")]);
    h.chat.push_user_text("Keep checking the time");

    let (result, events) = run_turn(&mut h.chat).await;
    result.unwrap();

    assert_eq!(h.model.requests().len(), 2);
    assert_eq!(events.last(), Some(&TurnEvent::Finish));
    assert_eq!(h.chat.messages().len(), 3);
    let output = find_tool(h.chat.messages(), "c2").output().cloned().unwrap();
    assert!(output.as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn stream_error_fails_turn() {
    let mut h = harness(vec![vec![
        StreamEvent::TextDelta("Partial".to_string()),
        StreamEvent::Error("overloaded".to_string()),
    ]]);
    h.chat.push_user_text("Hello");

    let (result, events) = run_turn(&mut h.chat).await;

    assert!(matches!(result, Err(TurnError::Stream(ref e)) if e == "overloaded"));
    assert_eq!(
        events,
        vec![
            TurnEvent::TextDelta("Partial".to_string()),
            TurnEvent::Error {
                message: TURN_FAILED_MESSAGE.to_string()
            },
        ]
    );
    assert_eq!(h.chat.messages().len(), 1);
}
