//! Transition egress - appends containment transitions to file
//!
//! Transitions are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::types::TransitionEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for transitions
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a transition to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_transition(&self, event: &TransitionEvent) -> bool {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "transition_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                debug!(from = %event.from, to = %event.to, at = %event.at, "transition_egressed");
                true
            }
            Err(e) => {
                error!(from = %event.from, to = %event.to, error = %e, "transition_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ContainmentState, TransitionCause};
    use std::fs;
    use tempfile::tempdir;

    fn event(from: ContainmentState, to: ContainmentState, at: u64) -> TransitionEvent {
        TransitionEvent { from, to, at, cause: TransitionCause::Sample }
    }

    #[test]
    fn test_write_transition() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        assert!(egress.write_transition(&event(
            ContainmentState::Unknown,
            ContainmentState::Inside,
            1000
        )));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["from"], "unknown");
        assert_eq!(parsed["to"], "inside");
        assert_eq!(parsed["at"], 1000);
        assert_eq!(parsed["cause"], "sample");
    }

    #[test]
    fn test_append_mode_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nested").join("transitions.jsonl");
        fs::create_dir_all(file_path.parent().unwrap()).unwrap();
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(file_path.to_str().unwrap());
        egress.write_transition(&event(ContainmentState::Inside, ContainmentState::Unknown, 9));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
    }

    #[test]
    fn test_write_failure_returns_false() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let egress = Egress::new(dir.path().to_str().unwrap());
        assert!(!egress.write_transition(&event(
            ContainmentState::Unknown,
            ContainmentState::Outside,
            1
        )));
    }
}
