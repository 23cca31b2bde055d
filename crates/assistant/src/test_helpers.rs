//! Shared test helpers: scripted providers and canned event sequences.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dealroom_core::error::ProviderError;
use dealroom_core::provider::{
    BlockDelta, BlockKind, ModelEvent, ModelEventStream, Provider, ProviderRequest, Usage,
};
use tokio::sync::mpsc;

pub type Script = Vec<Result<ModelEvent, ProviderError>>;

/// Replays one script per call. When the queue runs dry, the `repeat` script
/// (if any) is used for every further call.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns the same script.
    pub fn repeating(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            repeat: Some(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .expect("ScriptedProvider: no more scripts");

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for item in script {
            tx.try_send(item).unwrap();
        }
        Ok(rx)
    }
}

/// Streams one text fragment, then stalls until the receiver is dropped.
#[derive(Default)]
pub struct StallingProvider {
    pub calls: AtomicUsize,
    pub released: Arc<AtomicBool>,
}

#[async_trait]
impl Provider for StallingProvider {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        let released = self.released.clone();
        tokio::spawn(async move {
            for event in text_events(0, "Working on it") {
                let _ = tx.send(Ok(event)).await;
            }
            tx.closed().await;
            released.store(true, Ordering::SeqCst);
        });
        Ok(rx)
    }
}

/// Panics on every call.
pub struct PanickingProvider;

#[async_trait]
impl Provider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
        panic!("provider blew up");
    }
}

/// Start, one delta, stop for a text block.
pub fn text_events(index: usize, text: &str) -> Vec<ModelEvent> {
    vec![
        ModelEvent::BlockStart {
            index,
            kind: BlockKind::Text,
        },
        ModelEvent::BlockDelta {
            index,
            delta: BlockDelta::Text(text.into()),
        },
        ModelEvent::BlockStop { index },
    ]
}

/// Start, input split in two deltas, stop for a tool block.
pub fn tool_events(index: usize, id: &str, name: &str, input_json: &str) -> Vec<ModelEvent> {
    let mid = input_json.len() / 2;
    let (head, tail) = input_json.split_at(mid);
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
            delta: BlockDelta::Json(head.into()),
        },
        ModelEvent::BlockDelta {
            index,
            delta: BlockDelta::Json(tail.into()),
        },
        ModelEvent::BlockStop { index },
    ]
}

fn finish(stop_reason: &str) -> ModelEvent {
    ModelEvent::TurnDelta {
        stop_reason: Some(stop_reason.into()),
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
    }
}

/// A round that answers with text only.
pub fn text_round(text: &str) -> Script {
    let mut events = text_events(0, text);
    events.push(finish("end_turn"));
    events.into_iter().map(Ok).collect()
}

/// A round that calls one tool (input must be ASCII JSON).
pub fn tool_round(id: &str, name: &str, input_json: &str) -> Script {
    let mut events = tool_events(0, id, name, input_json);
    events.push(finish("tool_use"));
    events.into_iter().map(Ok).collect()
}

/// A round with a text preamble followed by tool calls.
pub fn text_then_tools_round(text: &str, calls: &[(&str, &str, &str)]) -> Script {
    let mut events = text_events(0, text);
    for (i, (id, name, input)) in calls.iter().enumerate() {
        events.extend(tool_events(i + 1, id, name, input));
    }
    events.push(finish("tool_use"));
    events.into_iter().map(Ok).collect()
}
