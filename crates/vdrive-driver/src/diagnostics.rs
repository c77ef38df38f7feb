//! Last-error state and the `debug()` snapshot.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vdrive_types::{VfsError, VfsResult, VolumeId};

/// Replacement for redacted values.
pub const REDACTED: &str = "***";

/// Key fragments that mark a configuration value as secret.
const SECRET_MARKERS: &[&str] = &["password", "secret", "token", "key", "credential"];

/// Most recent failure of one volume.
///
/// Overwritten by every failing operation, untouched by successful ones.
#[derive(Debug, Default)]
pub struct ErrorState {
    last: Mutex<Option<String>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of `op` as `"<op>: <error>"`.
    pub fn record(&self, volume: &VolumeId, op: &str, err: &VfsError) {
        warn!(volume = %volume, op, kind = %err.kind(), error = %err, "operation failed");
        *self.last.lock().expect("lock poisoned") = Some(format!("{op}: {err}"));
    }

    /// Pass `result` through, recording it if it is an error.
    pub fn track<T>(&self, volume: &VolumeId, op: &str, result: VfsResult<T>) -> VfsResult<T> {
        if let Err(err) = &result {
            self.record(volume, op, err);
        }
        result
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().expect("lock poisoned").clone()
    }
}

/// Snapshot returned by `debug()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub volume: VolumeId,
    /// Backend kind.
    pub driver: String,
    pub alias: String,
    pub read_only: bool,
    /// Codec epoch the volume was mounted in.
    pub epoch: u64,
    pub open_descriptors: usize,
    pub last_error: Option<String>,
    /// Backend diagnostics merged with the volume's `extra` options, redacted.
    pub backend: BTreeMap<String, String>,
}

/// Returns `true` if values under `key` must never be shown.
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Replace every secret value with [`REDACTED`].
pub fn redact(fields: BTreeMap<String, String>) -> BTreeMap<String, String> {
    fields
        .into_iter()
        .map(|(key, value)| {
            if is_secret_key(&key) {
                (key, REDACTED.to_string())
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Render a configuration value for display.
pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdrive_types::ErrorKind;

    fn vid() -> VolumeId {
        VolumeId::new("v1").unwrap()
    }

    #[test]
    fn failures_overwrite_successes_do_not() {
        let state = ErrorState::new();
        assert_eq!(state.last(), None);

        let r: VfsResult<()> = state.track(&vid(), "mkdir", Err(VfsError::AlreadyExists("/x".into())));
        assert_eq!(r.unwrap_err().kind(), ErrorKind::AlreadyExists);
        assert_eq!(state.last().as_deref(), Some("mkdir: already exists: /x"));

        let ok = state.track(&vid(), "info", Ok(7));
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(state.last().as_deref(), Some("mkdir: already exists: /x"));

        state.record(&vid(), "rm", &VfsError::NotFound("/y".into()));
        assert_eq!(state.last().as_deref(), Some("rm: not found: /y"));
    }

    #[test]
    fn secrets_are_redacted() {
        let mut fields = BTreeMap::new();
        fields.insert("root".to_string(), "/srv".to_string());
        fields.insert("Password".to_string(), "hunter2".to_string());
        fields.insert("api_token".to_string(), "abc".to_string());
        fields.insert("ssh_key_path".to_string(), "/k".to_string());
        fields.insert("aws_secret".to_string(), "s".to_string());
        fields.insert("credentials".to_string(), "c".to_string());

        let redacted = redact(fields);
        assert_eq!(redacted["root"], "/srv");
        for key in ["Password", "api_token", "ssh_key_path", "aws_secret", "credentials"] {
            assert_eq!(redacted[key], REDACTED, "{key} leaked");
        }
    }

    #[test]
    fn values_render_plainly() {
        assert_eq!(display_value(&serde_json::json!("text")), "text");
        assert_eq!(display_value(&serde_json::json!(21)), "21");
        assert_eq!(display_value(&serde_json::json!(true)), "true");
    }
}
