use crate::error::NotifyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// User supplied identifier of an asynchronous backend process.
///
/// Doubles as the correlation key of the `onProcessDone` subscription, so it
/// can never be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Result<Self, NotifyError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NotifyError::InvalidProcessId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ProcessId {
    type Error = NotifyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ProcessId::new(value)
    }
}

impl TryFrom<String> for ProcessId {
    type Error = NotifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProcessId::new(value)
    }
}

impl<'de> Deserialize<'de> for ProcessId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProcessId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Status reported by the process resolvers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Pending,
    Done,
    Completed,
    #[serde(untagged)]
    Other(String),
}

/// Shape returned by `startProcess`, `endProcess` and `getProcess`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub status: ProcessStatus,
}

impl ProcessRecord {
    pub fn new(id: ProcessId, status: ProcessStatus) -> Self {
        Self { id, status }
    }
}

/// Opaque payload pushed once a process completes.
///
/// The session never looks inside; it only forwards it to the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct NotificationEvent(Value);

impl NotificationEvent {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn into_payload(self) -> Value {
        self.0
    }
}

impl fmt::Display for NotificationEvent {
    /// Compact JSON, the way the status log renders it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_id_rejects_blank() {
        assert!(matches!(
            ProcessId::new(""),
            Err(NotifyError::InvalidProcessId(_))
        ));
        assert!(ProcessId::new("   ").is_err());
        assert_eq!(ProcessId::new("proc-1").unwrap().as_str(), "proc-1");
    }

    #[test]
    fn test_process_id_deserialize_validates() {
        let id: ProcessId = serde_json::from_str("\"proc-7\"").unwrap();
        assert_eq!(id.to_string(), "proc-7");
        assert!(serde_json::from_str::<ProcessId>("\"\"").is_err());
    }

    #[test]
    fn test_process_record_statuses() {
        let record: ProcessRecord =
            serde_json::from_value(json!({"id": "p", "status": "PENDING"})).unwrap();
        assert_eq!(record.status, ProcessStatus::Pending);

        let record: ProcessRecord =
            serde_json::from_value(json!({"id": "p", "status": "FAILED"})).unwrap();
        assert_eq!(record.status, ProcessStatus::Other("FAILED".to_string()));

        let value = serde_json::to_value(ProcessRecord::new(
            ProcessId::new("p").unwrap(),
            ProcessStatus::Done,
        ))
        .unwrap();
        assert_eq!(value, json!({"id": "p", "status": "DONE"}));
    }

    #[test]
    fn test_event_renders_compact_json() {
        let event = NotificationEvent::new(json!({"status": "done"}));
        assert_eq!(event.to_string(), r#"{"status":"done"}"#);
    }
}
