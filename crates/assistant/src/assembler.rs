//! Block assembler: turns one round's event stream into finalized blocks.
//!
//! Slots are addressed by the provider's block index. Each slot moves
//! `Vacant → Open → Finalized` exactly once; anything that would break that
//! (delta before start, duplicate start, stop of an unknown index, a delta of
//! the wrong kind) is logged and ignored.

use dealroom_core::message::ContentBlock;
use dealroom_core::provider::{BlockDelta, BlockKind, ModelEvent};
use tracing::warn;

/// Blocks a single response may address; higher indices are ignored.
pub const MAX_BLOCKS: usize = 1024;

#[derive(Debug)]
enum Slot {
    Vacant,
    Open(OpenBlock),
    Finalized(ContentBlock),
}

#[derive(Debug)]
enum OpenBlock {
    Text(String),
    Tool { id: String, name: String, json: String },
}

impl OpenBlock {
    fn finalize(self) -> ContentBlock {
        match self {
            Self::Text(text) => ContentBlock::Text { text },
            Self::Tool { id, name, json } => {
                let input = parse_tool_input(&name, &json);
                ContentBlock::ToolInvocation { id, name, input }
            }
        }
    }
}

/// Parse the accumulated tool input. Anything but a JSON object becomes `{}`.
fn parse_tool_input(tool: &str, json: &str) -> serde_json::Value {
    if json.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) if value.is_object() => value,
        Ok(other) => {
            warn!(tool = %tool, input = %other, "Tool input is not an object, using {{}}");
            serde_json::json!({})
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "Unparseable tool input, using {{}}");
            serde_json::json!({})
        }
    }
}

/// Accumulates one model response.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    slots: Vec<Slot>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns the text fragment to forward to the client,
    /// if the event carried any.
    pub fn apply(&mut self, event: ModelEvent) -> Option<String> {
        match event {
            ModelEvent::BlockStart { index, kind } => {
                let Some(len) = index.checked_add(1).filter(|len| *len <= MAX_BLOCKS) else {
                    warn!(index, "Block index out of range ignored");
                    return None;
                };
                if self.slots.len() < len {
                    self.slots.resize_with(len, || Slot::Vacant);
                }
                let slot = &mut self.slots[index];
                if !matches!(slot, Slot::Vacant) {
                    warn!(index, "Duplicate block start ignored");
                    return None;
                }
                *slot = Slot::Open(match kind {
                    BlockKind::Text => OpenBlock::Text(String::new()),
                    BlockKind::ToolUse { id, name } => OpenBlock::Tool {
                        id,
                        name,
                        json: String::new(),
                    },
                });
                None
            }
            ModelEvent::BlockDelta { index, delta } => {
                let Some(Slot::Open(open)) = self.slots.get_mut(index) else {
                    warn!(index, "Delta for a block that is not open ignored");
                    return None;
                };
                match (open, delta) {
                    (OpenBlock::Text(buf), BlockDelta::Text(fragment)) => {
                        if fragment.is_empty() {
                            return None;
                        }
                        buf.push_str(&fragment);
                        Some(fragment)
                    }
                    (OpenBlock::Tool { json, .. }, BlockDelta::Json(fragment)) => {
                        json.push_str(&fragment);
                        None
                    }
                    _ => {
                        warn!(index, "Delta kind does not match block kind, ignored");
                        None
                    }
                }
            }
            ModelEvent::BlockStop { index } => {
                match self.slots.get_mut(index) {
                    Some(slot @ Slot::Open(_)) => {
                        if let Slot::Open(open) = std::mem::replace(slot, Slot::Vacant) {
                            *slot = Slot::Finalized(open.finalize());
                        }
                    }
                    _ => warn!(index, "Stop for a block that is not open ignored"),
                }
                None
            }
            ModelEvent::TurnDelta { .. } => None,
        }
    }

    /// Flush still-open slots and return the blocks in index order.
    pub fn finish(self) -> Vec<ContentBlock> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Vacant => None,
                Slot::Open(open) => Some(open.finalize()),
                Slot::Finalized(block) => Some(block),
            })
            .collect()
    }
}
