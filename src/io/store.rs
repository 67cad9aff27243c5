//! Zone store - durable single-slot persistence of the active zone
//!
//! The slot is one JSON file. Writes go to a sibling temp file that is
//! renamed over the slot, so a concurrent `load` sees either the old
//! record or the new one, never a partial write. Corrupt or invalid
//! records load as absence.

use crate::domain::zone::Zone;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-backed single zone slot
#[derive(Debug, Clone)]
pub struct ZoneStore {
    path: PathBuf,
}

impl ZoneStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `zone`, replacing whatever was stored
    pub fn save(&self, zone: &Zone) -> std::io::Result<()> {
        let json = serde_json::to_string(zone)?;

        // Create parent directories if they don't exist
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        info!(path = %self.path.display(), kind = %zone.kind(), "zone_saved");
        Ok(())
    }

    /// Read the persisted zone, `None` if missing or invalid
    pub fn load(&self) -> Option<Zone> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "zone_store_empty");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "zone_store_unreadable");
                return None;
            }
        };

        match serde_json::from_str::<Zone>(&content) {
            Ok(zone) => Some(zone),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "zone_store_invalid_record");
                None
            }
        }
    }

    /// Remove the persisted zone; no-op when the slot is empty
    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "zone_cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::Point;
    use tempfile::tempdir;

    fn circle() -> Zone {
        Zone::circle_at(4.7110, -74.0721, 500.0).unwrap()
    }

    fn polygon() -> Zone {
        Zone::polygon_from_coords(&[
            (4.70123456789, -74.0812345678),
            (4.7201, -74.0702),
            (4.6987654321, -74.0555555555),
            (4.6901, -74.0799),
        ])
        .unwrap()
    }

    #[test]
    fn test_load_empty_slot() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_round_trip_circle_and_polygon() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        for zone in [circle(), polygon()] {
            store.save(&zone).unwrap();
            assert_eq!(store.load(), Some(zone));
        }
    }

    #[test]
    fn test_round_trip_awkward_floats() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        let center = Point::new(0.1 + 0.2, -(1.0 / 3.0)).unwrap();
        let zone = Zone::circle(center, std::f64::consts::PI * 100.0).unwrap();
        store.save(&zone).unwrap();
        assert_eq!(store.load(), Some(zone));
    }

    #[test]
    fn test_save_replaces() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        store.save(&circle()).unwrap();
        store.save(&polygon()).unwrap();
        assert_eq!(store.load(), Some(polygon()));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_save_idempotent() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        store.save(&circle()).unwrap();
        let first = fs::read_to_string(store.path()).unwrap();
        store.save(&circle()).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), first);
    }

    #[test]
    fn test_truncated_record_loads_as_absent() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        store.save(&polygon()).unwrap();
        let full = fs::read_to_string(store.path()).unwrap();
        fs::write(store.path(), &full[..full.len() / 2]).unwrap();
        assert_eq!(store.load(), None);

        fs::write(store.path(), "").unwrap();
        assert_eq!(store.load(), None);

        fs::write(store.path(), [0xff, 0xfe, 0x00]).unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_invalid_record_loads_as_absent() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        fs::write(
            store.path(),
            r#"{"kind":"circle","center":{"lat":4.7,"lng":-74.0},"radiusMeters":-10}"#,
        )
        .unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_tagged_record_missing_fields_loads_as_absent() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        for json in [
            r#"{"kind":"circle","center":{"lat":4.7,"lng":-74.0},"radius":500}"#,
            r#"{"kind":"polygon","center":{"lat":4.7,"lng":-74.0},"radius":500}"#,
        ] {
            fs::write(store.path(), json).unwrap();
            assert_eq!(store.load(), None, "loaded {json}");
        }
    }

    #[test]
    fn test_legacy_record_loads() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        fs::write(store.path(), r#"{"center":{"lat":4.711,"lng":-74.0721},"radius":1200}"#)
            .unwrap();
        assert_eq!(store.load(), Some(Zone::circle_at(4.711, -74.0721, 1200.0).unwrap()));
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = ZoneStore::new(dir.path().join("zone.json"));

        store.save(&circle()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), None);

        // Clearing an empty slot is a no-op
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("zone.json");
        let store = ZoneStore::new(&nested);

        store.save(&circle()).unwrap();
        assert!(nested.exists());
    }
}
