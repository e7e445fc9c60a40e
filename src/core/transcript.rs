use chrono::{DateTime, Local};
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::constants::CHATS_DIR_NAME;

/// One saved chat, as shown in the sidebar. `name` is the file stem; the
/// `.txt` extension is stripped for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Filesystem-backed store of completed exchanges, one file per exchange,
/// named by capture time.
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    /// Store rooted at the platform data directory.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "charla")
            .ok_or("Failed to determine data directory")?;
        Self::at(proj_dirs.data_dir().join(CHATS_DIR_NAME))
    }

    /// Store rooted at an explicit directory (config override, tests).
    pub fn at(dir: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a completed exchange. Whitespace-only contents are refused
    /// (there is nothing on screen worth keeping). Returns the entry written,
    /// or `None` when nothing was saved.
    pub fn save(&self, contents: &str) -> Result<Option<TranscriptEntry>, Box<dyn std::error::Error>> {
        self.save_at(Local::now(), contents)
    }

    pub fn save_at(
        &self,
        timestamp: DateTime<Local>,
        contents: &str,
    ) -> Result<Option<TranscriptEntry>, Box<dyn std::error::Error>> {
        if contents.trim().is_empty() {
            return Ok(None);
        }

        let base = timestamp.format("chat_%Y-%m-%d_%H-%M").to_string();
        let name = self.free_name(&base);
        let path = self.dir.join(format!("{name}.txt"));

        // Write through a temp file in the same directory so the rename is
        // atomic and a partial transcript never lands in the listing.
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(&path)
            .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

        debug!("saved transcript {}", path.display());
        Ok(Some(TranscriptEntry { name, path }))
    }

    // A second exchange in the same minute gets a numeric suffix instead of
    // clobbering the earlier transcript.
    fn free_name(&self, base: &str) -> String {
        if !self.dir.join(format!("{base}.txt")).exists() {
            return base.to_string();
        }
        let mut counter = 2u32;
        loop {
            let candidate = format!("{base}_{counter}");
            if !self.dir.join(format!("{candidate}.txt")).exists() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// All saved transcripts, newest first.
    pub fn list(&self) -> Result<Vec<TranscriptEntry>, Box<dyn std::error::Error>> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push(TranscriptEntry {
                name: name.to_string(),
                path: path.clone(),
            });
        }
        // Timestamped names sort lexicographically; reverse for newest first
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(entries)
    }

    /// Read a saved transcript back verbatim.
    pub fn load(&self, name: &str) -> Result<String, Box<dyn std::error::Error>> {
        if name.contains(['/', '\\']) {
            return Err(format!("invalid transcript name: {name}").into());
        }
        let path = self.dir.join(format!("{name}.txt"));
        Ok(fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, TranscriptStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = TranscriptStore::at(dir.path().join(CHATS_DIR_NAME)).expect("store");
        (dir, store)
    }

    fn minute(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, h, m, 0).unwrap()
    }

    #[test]
    fn save_then_load_is_verbatim() {
        let (_dir, store) = store();
        let contents = "\nYou: hi\n\nAI: Hello there!\nSecond line.\n";

        let entry = store
            .save_at(minute(9, 30), contents)
            .expect("save")
            .expect("entry");
        assert_eq!(entry.name, "chat_2024-05-17_09-30");

        let loaded = store.load(&entry.name).expect("load");
        assert_eq!(loaded, contents);
    }

    #[test]
    fn whitespace_only_contents_are_not_saved() {
        let (_dir, store) = store();
        assert!(store.save_at(minute(9, 30), "   \n\t\n").expect("save").is_none());
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn listing_is_newest_first() {
        let (_dir, store) = store();
        store.save_at(minute(9, 30), "first").expect("save");
        store.save_at(minute(10, 0), "second").expect("save");
        store.save_at(minute(9, 45), "third").expect("save");

        let names: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "chat_2024-05-17_10-00",
                "chat_2024-05-17_09-45",
                "chat_2024-05-17_09-30",
            ]
        );
    }

    #[test]
    fn same_minute_saves_get_a_suffix() {
        let (_dir, store) = store();
        let first = store
            .save_at(minute(9, 30), "one")
            .expect("save")
            .expect("entry");
        let second = store
            .save_at(minute(9, 30), "two")
            .expect("save")
            .expect("entry");
        let third = store
            .save_at(minute(9, 30), "three")
            .expect("save")
            .expect("entry");

        assert_eq!(first.name, "chat_2024-05-17_09-30");
        assert_eq!(second.name, "chat_2024-05-17_09-30_2");
        assert_eq!(third.name, "chat_2024-05-17_09-30_3");
        assert_eq!(store.load(&first.name).expect("load"), "one");
        assert_eq!(store.load(&second.name).expect("load"), "two");
    }

    #[test]
    fn non_txt_files_are_ignored_by_listing() {
        let (_dir, store) = store();
        fs::write(store.dir().join("notes.md"), "ignored").expect("write");
        store.save_at(minute(9, 30), "kept").expect("save");

        let entries = store.list().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "chat_2024-05-17_09-30");
    }

    #[test]
    fn load_rejects_path_separators() {
        let (_dir, store) = store();
        assert!(store.load("../escape").is_err());
    }
}
