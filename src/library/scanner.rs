use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions shown in the browser. Display filter only; opening a file
/// always sniffs its content.
const MEDIA_EXTENSIONS: &[&str] = &[
    "aac", "flac", "m4a", "wav", "ogg", "mp3", "mp4", "aiff", "aif",
];

const PAGE: usize = 10;

/// Something that can hand out the currently selected file
pub trait FileSelection {
    fn selected_path(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

/// What pressing enter on the cursor did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Descended,
    File(PathBuf),
    Nothing,
}

/// Single-directory file browser
pub struct DirectoryBrowser {
    root: PathBuf,
    entries: Vec<Entry>,
    cursor: usize,
    selected: Option<PathBuf>,
    show_hidden: bool,
}

impl DirectoryBrowser {
    pub fn new<P: AsRef<Path>>(root: P, show_hidden: bool) -> Result<Self, anyhow::Error> {
        let mut browser = Self {
            root: root.as_ref().to_path_buf(),
            entries: Vec::new(),
            cursor: 0,
            selected: None,
            show_hidden,
        };
        browser.populate(root.as_ref())?;
        Ok(browser)
    }

    /// List `directory`: sub-directories first, then media files, each sorted by name
    pub fn list<P: AsRef<Path>>(directory: P, show_hidden: bool) -> Result<Vec<Entry>, anyhow::Error> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }

            let path = entry.path().to_path_buf();
            if path.is_dir() {
                dirs.push(Entry { path, name, is_dir: true });
            } else if is_media(&path) {
                files.push(Entry { path, name, is_dir: false });
            }
        }

        dirs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        dirs.extend(files);
        Ok(dirs)
    }

    fn populate(&mut self, directory: &Path) -> Result<(), anyhow::Error> {
        self.entries = Self::list(directory, self.show_hidden)?;
        self.root = directory.to_path_buf();
        self.cursor = 0;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Entry> {
        self.entries.get(self.cursor)
    }

    pub fn up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn down(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn page_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(PAGE);
    }

    pub fn page_down(&mut self) {
        self.cursor = (self.cursor + PAGE).min(self.entries.len().saturating_sub(1));
    }

    /// Descend into the directory under the cursor or select the file
    pub fn enter(&mut self) -> Result<Selection, anyhow::Error> {
        let Some(entry) = self.current().cloned() else {
            return Ok(Selection::Nothing);
        };
        if entry.is_dir {
            self.populate(&entry.path)?;
            Ok(Selection::Descended)
        } else {
            self.selected = Some(entry.path.clone());
            Ok(Selection::File(entry.path))
        }
    }

    /// Move to the parent directory, keeping the cursor on where we came from
    pub fn parent(&mut self) -> Result<(), anyhow::Error> {
        let Some(parent) = self.root.parent().map(Path::to_path_buf) else {
            return Ok(());
        };
        let previous = self.root.clone();
        self.populate(&parent)?;
        if let Some(index) = self.entries.iter().position(|e| e.path == previous) {
            self.cursor = index;
        }
        Ok(())
    }
}

impl FileSelection for DirectoryBrowser {
    fn selected_path(&self) -> Option<PathBuf> {
        self.selected.clone()
    }
}

fn is_media(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Interviews")).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join("b.MP3"), b"x").unwrap();
        fs::write(dir.path().join("a.wav"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("Interviews").join("one.flac"), b"x").unwrap();
        dir
    }

    #[test]
    fn lists_directories_then_media_files() {
        let dir = tree();
        let names: Vec<String> = DirectoryBrowser::list(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Interviews", "a.wav", "b.MP3"]);
    }

    #[test]
    fn formats_without_a_decoder_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["talk.opus", "talk.tta", "talk.ac3", "talk.aiff", "talk.m4a"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = DirectoryBrowser::list(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["talk.aiff", "talk.m4a"]);
    }

    #[test]
    fn hidden_entries_on_request() {
        let dir = tree();
        let entries = DirectoryBrowser::list(dir.path(), true).unwrap();
        assert!(entries.iter().any(|e| e.name == ".cache"));
    }

    #[test]
    fn enter_descends_and_selects() {
        let dir = tree();
        let mut browser = DirectoryBrowser::new(dir.path(), false).unwrap();
        assert_eq!(browser.enter().unwrap(), Selection::Descended);
        assert_eq!(browser.root(), dir.path().join("Interviews"));

        let picked = browser.enter().unwrap();
        assert_eq!(picked, Selection::File(dir.path().join("Interviews").join("one.flac")));
        assert_eq!(browser.selected_path(), Some(dir.path().join("Interviews").join("one.flac")));

        browser.parent().unwrap();
        assert_eq!(browser.root(), dir.path());
        assert_eq!(browser.current().map(|e| e.name.as_str()), Some("Interviews"));
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let dir = tree();
        let mut browser = DirectoryBrowser::new(dir.path(), false).unwrap();
        browser.up();
        assert_eq!(browser.cursor(), 0);
        browser.page_down();
        assert_eq!(browser.cursor(), 2);
        browser.down();
        assert_eq!(browser.cursor(), 2);
    }
}
