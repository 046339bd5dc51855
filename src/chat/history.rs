//! Prompt history persisted under the CLI configuration directory.
//!
//! Only single-line prompts are stored; multi-line prompts are silently
//! ignored. The file is rewritten atomically (temp file then rename), so
//! concurrent CLIs race on the rename and the last writer wins.

use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on stored entries; older entries are dropped first.
pub const MAX_HISTORY_LENGTH: usize = 100;

const HISTORY_DIR: &str = "model-cli";
const HISTORY_FILE: &str = "history.txt";

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    entries: Vec<String>,
}

impl History {
    /// Opens `<config_dir>/model-cli/history.txt`, treating a missing file
    /// as empty. Duplicate lines are dropped on load, first occurrence
    /// wins.
    pub fn new(config_dir: &Path) -> io::Result<Self> {
        let path = config_dir.join(HISTORY_DIR).join(HISTORY_FILE);
        let mut history = Self {
            path,
            entries: Vec::new(),
        };
        history.load()?;
        Ok(history)
    }

    fn load(&mut self) -> io::Result<()> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        let mut entries = Vec::new();
        for line in data.trim_end_matches('\n').split('\n') {
            if !entries.iter().any(|existing| existing == line) {
                entries.push(line.to_string());
            }
        }
        self.entries = entries;
        Ok(())
    }

    /// Adds an entry and persists. Lines containing `\n` are ignored.
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        if line.contains('\n') {
            return Ok(());
        }

        self.entries.push(line.to_string());
        if self.entries.len() > MAX_HISTORY_LENGTH {
            let excess = self.entries.len() - MAX_HISTORY_LENGTH;
            self.entries.drain(..excess);
        }
        self.persist()
    }

    fn persist(&self) -> io::Result<()> {
        let dir = self.path.parent().expect("history path has a parent");
        create_private_dir(dir)?;

        let tmp = self.path.with_extension("txt.tmp");
        write_private_file(&tmp, self.entries.join("\n").as_bytes())?;
        let _ = std::fs::remove_file(&self.path);
        std::fs::rename(&tmp, &self.path)
    }

    /// Full-line suggestions whose lowercased form starts with `text`.
    pub fn suggestions(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .filter(|line| line.to_lowercase().starts_with(&text))
            .cloned()
            .collect()
    }

    /// Steps backwards through history. An index of -1 starts at the end.
    /// Returns the input unchanged when there is nowhere to go.
    pub fn previous(
        &self,
        text: &str,
        cursor: usize,
        index: isize,
    ) -> (String, isize, usize) {
        let mut index = index;
        if index == -1 && !self.entries.is_empty() {
            index = self.entries.len() as isize;
        }
        if index > 0 && !self.entries.is_empty() {
            let new_index = index - 1;
            let entry = &self.entries[new_index as usize];
            return (entry.clone(), new_index, entry.len());
        }
        (text.to_string(), index, cursor)
    }

    /// Steps forwards through history. Returns the input unchanged at the
    /// end or when no navigation is in progress.
    pub fn next(&self, text: &str, cursor: usize, index: isize) -> (String, isize, usize) {
        if index >= 0 && index < self.entries.len() as isize - 1 {
            let new_index = index + 1;
            let entry = &self.entries[new_index as usize];
            return (entry.clone(), new_index, entry.len());
        }
        (text.to_string(), index, cursor)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    match std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    std::fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_in(dir: &Path) -> History {
        History::new(dir).unwrap()
    }

    #[test]
    fn missing_file_means_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(dir.path());
        assert!(history.entries().is_empty());
    }

    #[test]
    fn append_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("first").unwrap();
        history.append("second").unwrap();

        let reloaded = history_in(dir.path());
        assert_eq!(reloaded.entries(), &["first", "second"]);
    }

    #[test]
    fn multiline_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("tell\nme\na\njoke").unwrap();
        assert!(history.entries().is_empty());
        assert!(!dir.path().join(HISTORY_DIR).join(HISTORY_FILE).exists());
    }

    #[test]
    fn duplicates_collapse_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("hello").unwrap();
        history.append("world").unwrap();
        history.append("hello").unwrap();

        let reloaded = history_in(dir.path());
        assert_eq!(reloaded.entries(), &["hello", "world"]);
    }

    #[test]
    fn history_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        for i in 0..MAX_HISTORY_LENGTH + 10 {
            history.append(&format!("entry {i}")).unwrap();
        }
        assert_eq!(history.entries().len(), MAX_HISTORY_LENGTH);
        assert_eq!(history.entries()[0], "entry 10");
    }

    #[test]
    fn suggestions_match_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("Tell me a joke").unwrap();
        history.append("weather today").unwrap();

        assert_eq!(history.suggestions("tell"), vec!["Tell me a joke"]);
        assert_eq!(history.suggestions("WEA"), vec!["weather today"]);
        assert!(history.suggestions("nope").is_empty());
    }

    #[test]
    fn previous_walks_from_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("one").unwrap();
        history.append("two").unwrap();

        let (text, index, cursor) = history.previous("", 0, -1);
        assert_eq!((text.as_str(), index, cursor), ("two", 1, 3));
        let (text, index, cursor) = history.previous(&text, cursor, index);
        assert_eq!((text.as_str(), index, cursor), ("one", 0, 3));
        // At the top nothing changes.
        let (text, index, _) = history.previous(&text, cursor, index);
        assert_eq!((text.as_str(), index), ("one", 0));
    }

    #[test]
    fn next_stops_at_the_newest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = history_in(dir.path());
        history.append("one").unwrap();
        history.append("two").unwrap();

        let (text, index, cursor) = history.next("one", 3, 0);
        assert_eq!((text.as_str(), index, cursor), ("two", 1, 3));
        let (text, index, _) = history.next(&text, cursor, index);
        assert_eq!((text.as_str(), index), ("two", 1));
    }

    #[test]
    fn navigation_on_empty_history_returns_input() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(dir.path());
        let (text, index, cursor) = history.previous("draft", 2, -1);
        assert_eq!((text.as_str(), index, cursor), ("draft", -1, 2));
        let (text, index, cursor) = history.next("draft", 2, -1);
        assert_eq!((text.as_str(), index, cursor), ("draft", -1, 2));
    }
}
