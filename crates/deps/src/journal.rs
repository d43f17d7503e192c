//! Append-only event journal plus the alerting layer built on it.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType {
    pub system: String,
    pub event: String,
}

impl EventType {
    pub fn new(system: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            event: event.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("invalid disabled event `{0}`, expected `system:event`")]
    InvalidDisabledEvent(String),
    #[error("journal io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoding journal entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("journal is closed")]
    Closed,
}

/// Event types that must not be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledEvents(HashSet<EventType>);

impl DisabledEvents {
    pub fn contains(&self, event_type: &EventType) -> bool {
        self.0.contains(event_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses `system:event` pairs separated by commas. Blank input disables
/// nothing.
pub fn parse_disabled_events(raw: &str) -> Result<DisabledEvents, JournalError> {
    let mut set = HashSet::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (system, event) = entry
            .split_once(':')
            .map(|(s, e)| (s.trim(), e.trim()))
            .filter(|(s, e)| !s.is_empty() && !e.is_empty() && !e.contains(':'))
            .ok_or_else(|| JournalError::InvalidDisabledEvent(entry.to_string()))?;
        set.insert(EventType::new(system, event));
    }
    Ok(DisabledEvents(set))
}

pub trait Journal: Send + Sync {
    fn record_event(&self, event_type: &EventType, data: Value) -> Result<(), JournalError>;
    fn close(&self) -> Result<(), JournalError>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Entry<'a> {
    system: &'a str,
    event: &'a str,
    timestamp: String,
    data: Value,
}

/// Journal writing newline-delimited JSON into a directory.
#[derive(Debug)]
pub struct FsJournal {
    file: PathBuf,
    disabled: DisabledEvents,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FsJournal {
    pub fn open(dir: &Path, disabled: DisabledEvents) -> Result<Self, JournalError> {
        fs::create_dir_all(dir).map_err(|source| JournalError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let file = dir.join(format!(
            "journal-{}.ndjson",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .map_err(|source| JournalError::Io {
                path: file.clone(),
                source,
            })?;
        debug!(path = %file.display(), disabled = disabled.len(), "opened journal");

        Ok(Self {
            file,
            disabled,
            writer: Mutex::new(Some(BufWriter::new(handle))),
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn io_err(&self) -> impl FnOnce(io::Error) -> JournalError + '_ {
        move |source| JournalError::Io {
            path: self.file.clone(),
            source,
        }
    }
}

impl Journal for FsJournal {
    fn record_event(&self, event_type: &EventType, data: Value) -> Result<(), JournalError> {
        if self.disabled.contains(event_type) {
            return Ok(());
        }

        let line = serde_json::to_string(&Entry {
            system: &event_type.system,
            event: &event_type.event,
            timestamp: Utc::now().to_rfc3339(),
            data,
        })?;

        let mut guard = self.writer.lock().map_err(|_| JournalError::Closed)?;
        let writer = guard.as_mut().ok_or(JournalError::Closed)?;
        writeln!(writer, "{line}").map_err(self.io_err())?;
        writer.flush().map_err(self.io_err())
    }

    fn close(&self) -> Result<(), JournalError> {
        let mut guard = self.writer.lock().map_err(|_| JournalError::Closed)?;
        let mut writer = guard.take().ok_or(JournalError::Closed)?;
        writer.flush().map_err(self.io_err())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertType {
    pub system: String,
    pub subsystem: String,
}

/// Tracks raised alerts and journals every transition.
pub struct AlertingSystem {
    journal: Arc<dyn Journal>,
    active: Mutex<HashMap<AlertType, Value>>,
}

impl AlertingSystem {
    pub const SYSTEM: &'static str = "alert";

    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self {
            journal,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    pub fn raise(&self, alert: &AlertType, info: Value) -> Result<(), JournalError> {
        warn!(system = %alert.system, subsystem = %alert.subsystem, "alert raised");
        self.journal.record_event(
            &EventType::new(Self::SYSTEM, "raised"),
            serde_json::json!({
                "Type": { "System": alert.system, "Subsystem": alert.subsystem },
                "Info": info.clone(),
            }),
        )?;
        if let Ok(mut active) = self.active.lock() {
            active.insert(alert.clone(), info);
        }
        Ok(())
    }

    pub fn resolve(&self, alert: &AlertType, info: Value) -> Result<(), JournalError> {
        let was_active = self
            .active
            .lock()
            .map(|mut active| active.remove(alert).is_some())
            .unwrap_or(false);
        if !was_active {
            return Ok(());
        }
        self.journal.record_event(
            &EventType::new(Self::SYSTEM, "resolved"),
            serde_json::json!({
                "Type": { "System": alert.system, "Subsystem": alert.subsystem },
                "Info": info,
            }),
        )
    }

    pub fn active_alerts(&self) -> Vec<AlertType> {
        self.active
            .lock()
            .map(|active| active.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(journal: &FsJournal) -> Vec<Value> {
        fs::read_to_string(journal.file())
            .expect("journal readable")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect()
    }

    #[test]
    fn parses_disabled_event_pairs() {
        let disabled = parse_disabled_events(" wdpost:failed , sealing:precommit ").expect("parses");
        assert_eq!(disabled.len(), 2);
        assert!(disabled.contains(&EventType::new("wdpost", "failed")));
        assert!(parse_disabled_events("").expect("blank parses").is_empty());
    }

    #[test]
    fn rejects_malformed_disabled_events() {
        for raw in ["wdpost", "wdpost:", ":failed", "a:b:c"] {
            assert!(
                matches!(
                    parse_disabled_events(raw),
                    Err(JournalError::InvalidDisabledEvent(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn writes_enabled_events_and_skips_disabled_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let disabled = parse_disabled_events("noisy:tick").expect("parses");
        let journal = FsJournal::open(&dir.path().join("journal"), disabled).expect("opens");

        journal
            .record_event(&EventType::new("noisy", "tick"), serde_json::json!({}))
            .expect("disabled event accepted");
        journal
            .record_event(
                &EventType::new("sealing", "done"),
                serde_json::json!({"Sector": 7}),
            )
            .expect("event recorded");

        let entries = lines(&journal);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["System"], "sealing");
        assert_eq!(entries[0]["Data"]["Sector"], 7);
    }

    #[test]
    fn closed_journal_rejects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = FsJournal::open(dir.path(), DisabledEvents::default()).expect("opens");
        journal.close().expect("first close");

        assert!(matches!(
            journal.record_event(&EventType::new("a", "b"), Value::Null),
            Err(JournalError::Closed)
        ));
        assert!(matches!(journal.close(), Err(JournalError::Closed)));
    }

    #[test]
    fn alerts_are_journaled_and_tracked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Arc::new(FsJournal::open(dir.path(), DisabledEvents::default()).expect("opens"));
        let alerting = AlertingSystem::new(journal.clone());
        let alert = AlertType {
            system: "storage".into(),
            subsystem: "path-offline".into(),
        };

        alerting
            .raise(&alert, serde_json::json!({"Path": "/data"}))
            .expect("raise");
        assert_eq!(alerting.active_alerts(), vec![alert.clone()]);

        alerting.resolve(&alert, Value::Null).expect("resolve");
        alerting.resolve(&alert, Value::Null).expect("second resolve is a no-op");
        assert!(alerting.active_alerts().is_empty());

        let entries = lines(&journal);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["Event"], "raised");
        assert_eq!(entries[1]["Event"], "resolved");
    }
}
