//! End-to-end integration tests for the Dealroom assistant.
//!
//! These tests exercise the full pipeline from user message to persisted
//! transcript: the real tool catalog over the demo pipeline, the SQLite store,
//! the round loop and the client event stream. Only the model is scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dealroom_assistant::{AssistantService, AssistantSettings, ChatRequest, StreamEvent};
use dealroom_core::error::ProviderError;
use dealroom_core::event::{DomainEvent, EventBus};
use dealroom_core::identity::Principal;
use dealroom_core::message::{ConversationId, ModelMessage, Role};
use dealroom_core::provider::{
    BlockDelta, BlockKind, ModelEvent, ModelEventStream, Provider, ProviderRequest, Usage,
};
use dealroom_core::store::{ConversationStore, SortOrder};
use dealroom_store::SqliteStore;
use dealroom_tools::InMemoryDealDirectory;
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

type Round = Vec<ModelEvent>;

/// A mock provider that replays scripted rounds in sequence.
struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(rounds: Vec<Round>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider exhausted");
        let (tx, rx) = mpsc::channel(round.len().max(1));
        for event in round {
            tx.try_send(Ok(event)).unwrap();
        }
        Ok(rx)
    }
}

fn text_block(index: usize, fragments: &[&str]) -> Vec<ModelEvent> {
    let mut events = vec![ModelEvent::BlockStart {
        index,
        kind: BlockKind::Text,
    }];
    events.extend(fragments.iter().map(|f| ModelEvent::BlockDelta {
        index,
        delta: BlockDelta::Text(f.to_string()),
    }));
    events.push(ModelEvent::BlockStop { index });
    events
}

fn tool_block(index: usize, id: &str, name: &str, input: serde_json::Value) -> Vec<ModelEvent> {
    vec![
        ModelEvent::BlockStart {
            index,
            kind: BlockKind::ToolUse {
                id: id.into(),
                name: name.into(),
            },
        },
        ModelEvent::BlockDelta {
            index,
            delta: BlockDelta::Json(input.to_string()),
        },
        ModelEvent::BlockStop { index },
    ]
}

fn finished(mut events: Vec<ModelEvent>, stop_reason: &str) -> Round {
    events.push(ModelEvent::TurnDelta {
        stop_reason: Some(stop_reason.into()),
        usage: Some(Usage {
            input_tokens: 100,
            output_tokens: 20,
        }),
    });
    events
}

// ── Harness ──────────────────────────────────────────────────────────────

async fn service(
    provider: Arc<ScriptedProvider>,
    store: Arc<SqliteStore>,
    events: Arc<EventBus>,
) -> AssistantService {
    let directory = InMemoryDealDirectory::new()
        .with_demo_data("acme")
        .await
        .with_demo_data("globex")
        .await;
    let tools = Arc::new(dealroom_tools::default_registry(Arc::new(directory)));
    AssistantService::new(provider, tools, store, AssistantSettings::default()).with_event_bus(events)
}

async fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap())
}

async fn run_turn(
    service: &AssistantService,
    principal: &Principal,
    request: ChatRequest,
) -> (String, StreamEvent) {
    let mut rx = service.start_turn(principal.clone(), request).await.unwrap();
    let mut text = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Text { content } => text.push_str(&content),
            terminal => {
                assert!(rx.recv().await.is_none(), "nothing follows a terminal event");
                return (text, terminal);
            }
        }
    }
    panic!("stream ended without a terminal event");
}

fn tool_results(request: &ProviderRequest) -> Vec<(String, serde_json::Value, bool)> {
    request
        .messages
        .iter()
        .filter_map(|m| match m {
            ModelMessage::ToolResults { results } => Some(results),
            _ => None,
        })
        .flatten()
        .map(|r| {
            (
                r.call_id.clone(),
                serde_json::from_str(&r.output.to_content()).unwrap_or(serde_json::Value::Null),
                r.output.is_error(),
            )
        })
        .collect()
}

// ── E2E ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_deal_scoped_turn_with_parallel_tools() {
    let preamble = text_block(0, &["Let me pull ", "the deal and its checklist."]);
    let mut first = preamble;
    first.extend(tool_block(
        1,
        "call_deal",
        "get_deal",
        serde_json::json!({"deal_id": "acme-sunrise-manor"}),
    ));
    first.extend(tool_block(
        2,
        "call_list",
        "list_checklist_items",
        serde_json::json!({"deal_id": "acme-sunrise-manor", "open_only": true}),
    ));
    let provider = Arc::new(ScriptedProvider::new(vec![
        finished(first, "tool_use"),
        finished(
            text_block(0, &[" Sunrise Manor has two open diligence items."]),
            "end_turn",
        ),
    ]));
    let store = memory_store().await;
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let service = service(provider.clone(), store.clone(), bus).await;
    let alice = Principal::new("alice", "acme");

    let (text, terminal) = run_turn(
        &service,
        &alice,
        ChatRequest {
            message: "What's still open on this deal?".into(),
            conversation_id: None,
            deal_id: Some("acme-sunrise-manor".into()),
        },
    )
    .await;

    assert_eq!(
        text,
        "Let me pull the deal and its checklist. Sunrise Manor has two open diligence items."
    );
    let StreamEvent::Done { conversation_id } = terminal else {
        panic!("expected done, got {terminal:?}");
    };

    // Both tools ran against acme's pipeline; results are keyed by call id
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].system.contains("acme-sunrise-manor"));
    assert_eq!(requests[0].tools.len(), 4);
    let results = tool_results(&requests[1]);
    assert_eq!(results.len(), 2);
    let (_, deal, deal_failed) = results.iter().find(|(id, _, _)| id == "call_deal").unwrap();
    assert!(!deal_failed);
    assert_eq!(deal["bed_count"], 120);
    assert_eq!(deal["checklist"]["completed"], 2);
    let (_, list, _) = results.iter().find(|(id, _, _)| id == "call_list").unwrap();
    assert_eq!(list["count"], 2);

    // The transcript holds exactly the question and the full answer
    let id = ConversationId::from(&conversation_id);
    let saved = store
        .list_messages(&id, SortOrder::Ascending, 10)
        .await
        .unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].role, Role::User);
    assert_eq!(saved[1].role, Role::Assistant);
    assert_eq!(saved[1].content, text);

    let mut tool_events = 0;
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::ToolExecuted { success, .. } => {
                assert!(*success);
                tool_events += 1;
            }
            DomainEvent::TurnCompleted {
                rounds,
                tool_calls,
                truncated,
                tokens_used,
                ..
            } => {
                assert_eq!(*rounds, 2);
                assert_eq!(*tool_calls, 2);
                assert!(!truncated);
                assert_eq!(*tokens_used, 240);
                completed = true;
            }
            _ => {}
        }
    }
    assert_eq!(tool_events, 2);
    assert!(completed);
}

#[tokio::test]
async fn e2e_tools_cannot_reach_another_tenant() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        finished(
            tool_block(
                0,
                "call_1",
                "get_deal",
                serde_json::json!({"deal_id": "globex-sunrise-manor"}),
            ),
            "tool_use",
        ),
        finished(text_block(0, &["I can't find that deal."]), "end_turn"),
    ]));
    let service = service(
        provider.clone(),
        memory_store().await,
        Arc::new(EventBus::default()),
    )
    .await;

    let (text, terminal) = run_turn(
        &service,
        &Principal::new("alice", "acme"),
        ChatRequest {
            message: "Show me globex's Sunrise Manor".into(),
            ..ChatRequest::default()
        },
    )
    .await;

    assert!(matches!(terminal, StreamEvent::Done { .. }));
    assert_eq!(text, "I can't find that deal.");

    // The failure reached the model as an error result, not a turn failure
    let results = tool_results(&provider.requests()[1]);
    assert_eq!(results.len(), 1);
    assert!(results[0].2);
    assert!(results[0].1["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn e2e_history_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dealroom.db");
    let path = path.to_str().unwrap();
    let alice = Principal::new("alice", "acme");

    let conversation_id = {
        let provider = Arc::new(ScriptedProvider::new(vec![finished(
            text_block(0, &["You have three active deals."]),
            "end_turn",
        )]));
        let store = Arc::new(SqliteStore::new(path).await.unwrap());
        let service = service(provider, store, Arc::new(EventBus::default())).await;
        let (_, terminal) = run_turn(
            &service,
            &alice,
            ChatRequest {
                message: "How many active deals?".into(),
                ..ChatRequest::default()
            },
        )
        .await;
        match terminal {
            StreamEvent::Done { conversation_id } => conversation_id,
            other => panic!("expected done, got {other:?}"),
        }
    };

    let provider = Arc::new(ScriptedProvider::new(vec![finished(
        text_block(0, &["Two of them are in Florida."]),
        "end_turn",
    )]));
    let store = Arc::new(SqliteStore::new(path).await.unwrap());
    let service = service(provider.clone(), store, Arc::new(EventBus::default())).await;
    let (_, terminal) = run_turn(
        &service,
        &alice,
        ChatRequest {
            message: "Which are in Florida?".into(),
            conversation_id: Some(conversation_id.clone()),
            deal_id: None,
        },
    )
    .await;
    assert_eq!(
        terminal,
        StreamEvent::Done {
            conversation_id: conversation_id.clone()
        }
    );

    assert_eq!(
        provider.requests()[0].messages,
        vec![
            ModelMessage::user("How many active deals?"),
            ModelMessage::assistant_text("You have three active deals."),
            ModelMessage::user("Which are in Florida?"),
        ]
    );

    let listed = service.list_conversations(&alice, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "How many active deals?");
    assert_eq!(
        service
            .transcript(&alice, &conversation_id, 50)
            .await
            .unwrap()
            .len(),
        4
    );
}
