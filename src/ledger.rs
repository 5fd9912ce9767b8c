//! Backup of each shortcut's original icon location.
//!
//! Stored as a JSON object mapping shortcut path to `"<icon path>,<index>"`.

use crate::compositor::sibling_tmp;
use crate::error::LedgerError;
use crate::icon_ref::IconRef;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Added,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Ledger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the ledger at `path`. A missing, unreadable or corrupt file gives
    /// an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            return Self::empty(path);
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    tracing::error!(path = %path.display(), "backup file is corrupted: {}", e);
                    BTreeMap::new()
                }
            },
            Err(e) => {
                tracing::error!(path = %path.display(), "error reading backup file: {}", e);
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    /// Write the whole mapping, creating parent directories as needed. On
    /// failure the previous file is left in place.
    pub fn save(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;

        let tmp = sibling_tmp(&self.path);
        let result = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::info!(path = %self.path.display(), "backup saved");
        Ok(())
    }

    /// Remember `original` for `shortcut` unless the same value is already
    /// stored.
    pub fn record(&mut self, shortcut: &Path, original: &IconRef) -> Recorded {
        let key = shortcut.to_string_lossy().into_owned();
        let value = original.to_string();
        match self.entries.get(&key) {
            Some(existing) if *existing == value => Recorded::Unchanged,
            Some(_) => {
                self.entries.insert(key, value);
                Recorded::Updated
            }
            None => {
                self.entries.insert(key, value);
                Recorded::Added
            }
        }
    }

    pub fn original(&self, shortcut: &Path) -> Option<IconRef> {
        self.entries
            .get(shortcut.to_string_lossy().as_ref())
            .map(|s| IconRef::parse(s))
    }

    /// Entries as `(shortcut path, original icon)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (PathBuf, IconRef)> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (PathBuf::from(k), IconRef::parse(v)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon_backups").join("icon_backup.json");

        let mut ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
        ledger.record(Path::new(r"C:\Users\X\Desktop\App.lnk"), &IconRef::new(r"C:\App\app.exe", 2));
        ledger.record(Path::new(r"C:\Users\X\Desktop\Notes.lnk"), &IconRef::new(r"C:\n.ico", 0));
        ledger.save().unwrap();

        let loaded = Ledger::load(&path);
        assert_eq!(loaded.entries, ledger.entries);
        assert!(!sibling_tmp(&path).exists());
    }

    #[test]
    fn test_load_known_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon_backup.json");
        fs::write(
            &path,
            r#"{"C:\\Users\\X\\Desktop\\App.lnk": "C:\\App\\app.exe,2"}"#,
        )
        .unwrap();

        let ledger = Ledger::load(&path);
        assert_eq!(ledger.len(), 1);
        let (shortcut, original) = ledger.iter().next().unwrap();
        assert_eq!(shortcut, PathBuf::from(r"C:\Users\X\Desktop\App.lnk"));
        assert_eq!(original, IconRef::new(r"C:\App\app.exe", 2));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon_backup.json");
        fs::write(&path, "{ this is not json").unwrap();
        assert!(Ledger::load(&path).is_empty());

        fs::write(&path, r#"["a", "b"]"#).unwrap();
        assert!(Ledger::load(&path).is_empty());
    }

    #[test]
    fn test_record_reports_changes() {
        let mut ledger = Ledger::empty("unused.json");
        let lnk = Path::new("App.lnk");
        let a = IconRef::new("a.exe", 1);
        let b = IconRef::new("b.exe", 0);

        assert_eq!(ledger.record(lnk, &a), Recorded::Added);
        assert_eq!(ledger.record(lnk, &a), Recorded::Unchanged);
        assert_eq!(ledger.record(lnk, &b), Recorded::Updated);
        assert_eq!(ledger.original(lnk), Some(b));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("icon_backup.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let mut ledger = Ledger::empty(&path);
        ledger.record(Path::new("App.lnk"), &IconRef::new("a.exe", 0));
        assert!(ledger.save().is_err());
        assert!(path.join("keep").exists());
        assert!(!sibling_tmp(&path).exists());
    }
}
