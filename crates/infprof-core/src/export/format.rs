//! Output formats and the table that maps names and extensions to writers.

use std::path::Path;

use super::columnar::ColumnarWriter;
use super::delimited::DelimitedWriter;
use super::jsonl::JsonlWriter;
use super::FormatWriter;

/// The fixed set of on-disk layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jsonl,
    Csv,
    Tsv,
    Columnar,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::Jsonl => "jsonl",
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Columnar => "columnar",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Jsonl => ".jsonl",
            Format::Csv => ".csv",
            Format::Tsv => ".tsv",
            Format::Columnar => ".ipcol",
        }
    }
}

/// Constructor for a fresh, uninitialized writer.
pub type WriterFactory = fn() -> Box<dyn FormatWriter>;

/// One row of the registry.
#[derive(Clone, Copy)]
pub struct FormatEntry {
    pub format: Format,
    pub factory: WriterFactory,
}

impl FormatEntry {
    pub fn name(&self) -> &'static str {
        self.format.name()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    pub fn new_writer(&self) -> Box<dyn FormatWriter> {
        (self.factory)()
    }
}

impl std::fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEntry")
            .field("format", &self.format)
            .finish()
    }
}

/// Lookup table of available formats. Built explicitly and handed to the
/// [`Exporter`](super::Exporter), so each exporter sees only what its caller
/// registered.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    entries: Vec<FormatEntry>,
}

impl FormatRegistry {
    /// Registry with no formats.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in format.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Format::Jsonl, || Box::new(JsonlWriter::new()));
        registry.register(Format::Csv, || Box::new(DelimitedWriter::csv()));
        registry.register(Format::Tsv, || Box::new(DelimitedWriter::tsv()));
        registry.register(Format::Columnar, || Box::new(ColumnarWriter::new()));
        registry
    }

    /// Adds or replaces the writer factory for `format`.
    pub fn register(&mut self, format: Format, factory: WriterFactory) {
        self.entries.retain(|e| e.format != format);
        self.entries.push(FormatEntry { format, factory });
    }

    pub fn by_name(&self, name: &str) -> Option<&FormatEntry> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name))
    }

    /// Matches an extension given with or without the leading dot.
    pub fn by_extension(&self, ext: &str) -> Option<&FormatEntry> {
        let ext = ext.trim_start_matches('.');
        self.entries
            .iter()
            .find(|e| e.extension()[1..].eq_ignore_ascii_case(ext))
    }

    pub fn for_path(&self, path: &Path) -> Option<&FormatEntry> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.by_extension(e))
    }

    /// Extension for a format name, `.jsonl` when the name is unknown.
    pub fn extension_or_default(&self, name: &str) -> &'static str {
        self.by_name(name)
            .map(FormatEntry::extension)
            .unwrap_or(Format::Jsonl.extension())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(FormatEntry::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builtin_lookup() {
        let reg = FormatRegistry::builtin();
        assert_eq!(reg.by_name("CSV").unwrap().format, Format::Csv);
        assert_eq!(reg.by_extension(".tsv").unwrap().format, Format::Tsv);
        assert_eq!(reg.by_extension("ipcol").unwrap().format, Format::Columnar);
        assert!(reg.by_name("xml").is_none());
        assert_eq!(reg.names(), vec!["jsonl", "csv", "tsv", "columnar"]);
    }

    #[test]
    fn test_for_path_and_default_extension() {
        let reg = FormatRegistry::builtin();
        let entry = reg.for_path(&PathBuf::from("/tmp/run.jsonl")).unwrap();
        assert_eq!(entry.format, Format::Jsonl);
        assert!(reg.for_path(&PathBuf::from("/tmp/run")).is_none());
        assert_eq!(reg.extension_or_default("nope"), ".jsonl");
        assert_eq!(reg.extension_or_default("columnar"), ".ipcol");
    }

    #[test]
    fn test_registries_are_isolated() {
        let mut a = FormatRegistry::empty();
        a.register(Format::Jsonl, || Box::new(JsonlWriter::new()));
        let b = FormatRegistry::builtin();
        assert!(a.by_name("csv").is_none());
        assert!(b.by_name("csv").is_some());
        assert!(FormatRegistry::empty().is_empty());
    }
}
