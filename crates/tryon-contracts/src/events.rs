use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Structured log of what the tool did, one JSON object per line.
///
/// Every event carries `type`, `run_id` and `ts`; the payload is merged on
/// top. Clones share the same file and lock.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    sink: Sink,
    run_id: String,
    append: Mutex<()>,
}

#[derive(Debug)]
enum Sink {
    File(PathBuf),
    /// Events are built and returned but not persisted.
    Discard,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self::build(Sink::File(path.into()), run_id.into())
    }

    pub fn discard(run_id: impl Into<String>) -> Self {
        Self::build(Sink::Discard, run_id.into())
    }

    fn build(sink: Sink, run_id: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                run_id,
                append: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.shared.sink {
            Sink::File(path) => Some(path),
            Sink::Discard => None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let event = self.envelope(event_type, payload);
        if let Sink::File(path) = &self.shared.sink {
            let line = serde_json::to_string(&event)?;
            let _held = self
                .shared
                .append
                .lock()
                .map_err(|_| anyhow!("event log lock poisoned"))?;
            append_line(path, &line)
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        Ok(Value::Object(event))
    }

    fn envelope(&self, event_type: &str, payload: EventPayload) -> EventPayload {
        let mut event = EventPayload::new();
        event.insert("type".into(), Value::from(event_type));
        event.insert("run_id".into(), Value::from(self.shared.run_id.as_str()));
        event.insert(
            "ts".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        event.extend(payload);
        event
    }
}

/// Converts a `json!({...})` literal into an [`EventPayload`].
pub fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}
