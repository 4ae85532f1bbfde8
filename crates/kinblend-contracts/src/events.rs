use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::image::{EncodedImage, Slot};
use crate::state::AppState;

pub type EventPayload = Map<String, Value>;

/// Append-only journal of session events (`events.jsonl`).
///
/// - default fields are `type`, `session_id`, `seq`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// Nothing reads the journal back; it is an audit trail only.
#[derive(Debug, Clone)]
pub struct EventJournal {
    inner: Arc<EventJournalInner>,
}

#[derive(Debug)]
struct EventJournalInner {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventJournalInner {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: Mutex::new(0),
            }),
        }
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut next_seq = self
            .inner
            .next_seq
            .lock()
            .map_err(|_| anyhow::anyhow!("event journal lock poisoned"))?;

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::from(*next_seq));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        *next_seq += 1;

        Ok(Value::Object(event))
    }

    pub fn emit_state(&self, state: &AppState) -> anyhow::Result<Value> {
        self.emit("state_changed", state.record())
    }

    pub fn emit_slot(&self, slot: Slot, image: Option<&EncodedImage>) -> anyhow::Result<Value> {
        let mut payload = EventPayload::new();
        payload.insert("slot".to_string(), serde_json::to_value(slot)?);
        match image {
            Some(image) => {
                payload.insert(
                    "media_type".to_string(),
                    Value::String(image.media_type().to_string()),
                );
                payload.insert("bytes".to_string(), Value::from(image.decoded_len()));
                self.emit("image_selected", payload)
            }
            None => self.emit("image_cleared", payload),
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
