//! Probes and parsers for the Linux `/proc` filesystem.

pub mod parser;

use std::path::Path;

use tracing::trace;

use crate::collector::traits::FileSystem;
use crate::util::now_nanos;

/// Reads one file and records when it was read.
///
/// A missing or unreadable file yields an empty string, which every parser
/// turns into zero values.
pub fn probe_file<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> (String, i64) {
    let content = match fs.read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "probe failed");
            String::new()
        }
    };
    (content, now_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_probe_missing_file_is_empty() {
        let fs = MockFs::new();
        let (content, ts) = probe_file(&fs, Path::new("/proc/nope"));
        assert!(content.is_empty());
        assert!(ts > 0);
    }
}
