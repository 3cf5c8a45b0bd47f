//! In-memory filesystem for testing collectors without a real `/proc`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;

/// Files and directories held in memory.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content. Parent directories are created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Removes a file, e.g. to simulate a process exiting between listing
    /// `/proc` and reading its `stat`.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// Adds `/proc/[pid]/{stat,status,cmdline}`.
    ///
    /// `cmdline` uses NUL separators like the kernel does.
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, cmdline: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        self.add_file(base.join("cmdline"), cmdline);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();
        for file_path in self.files.keys() {
            if file_path.parent() == Some(path) {
                entries.insert(file_path.clone());
            }
        }
        for dir_path in &self.directories {
            if dir_path.parent() == Some(path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_creates_parents() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        assert!(fs.exists(Path::new("/proc/meminfo")));
        assert!(fs.exists(Path::new("/proc")));
        assert_eq!(
            fs.read_to_string(Path::new("/proc/meminfo")).unwrap(),
            "MemTotal: 16384 kB\n"
        );
    }

    #[test]
    fn test_read_dir_lists_direct_children() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "a");
        fs.add_file("/proc/1/status", "b");
        fs.add_file("/proc/2/stat", "c");

        assert_eq!(fs.read_dir(Path::new("/proc")).unwrap().len(), 2);
        assert_eq!(fs.read_dir(Path::new("/proc/1")).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_file_and_not_found() {
        let mut fs = MockFs::new();
        fs.add_process(7, "7 (x) S", "Name:\tx\n", "x\0");
        assert!(fs.exists(Path::new("/proc/7/cmdline")));
        fs.remove_file("/proc/7/stat");

        let err = fs.read_to_string(Path::new("/proc/7/stat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(fs.read_dir(Path::new("/nonexistent")).is_err());
    }
}
