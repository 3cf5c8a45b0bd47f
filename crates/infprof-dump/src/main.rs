use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use infprof_core::export::{self, ColumnarReader, ExportError, Format, FormatRegistry};
use infprof_core::record::{Record, TIMESTAMP_KEY, ValueKind};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "infprof-dump", about = "Inspect infprof output files")]
struct Cli {
    /// Path to a .jsonl, .csv, .tsv or .ipcol file
    path: PathBuf,

    /// Print row count, columns and time span instead of the records
    #[arg(long)]
    summary: bool,

    /// Print the summary as JSON
    #[arg(long, requires = "summary")]
    json: bool,

    /// Print at most this many records
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    let format = detect_format(&cli.path);

    let records = match export::read_records(format, &cli.path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read {}: {}", cli.path.display(), e);
            process::exit(1);
        }
    };

    let result = if cli.summary {
        match summarize(&cli.path, format, &records) {
            Ok(summary) => print_summary(&summary, cli.json),
            Err(e) => {
                eprintln!("Failed to summarize {}: {}", cli.path.display(), e);
                process::exit(1);
            }
        }
    } else {
        print_records(&records, cli.limit)
    };

    if let Err(e) = result
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        eprintln!("Write error: {}", e);
        process::exit(1);
    }
}

/// Format named by the file extension, JSONL when unknown.
fn detect_format(path: &Path) -> Format {
    FormatRegistry::builtin()
        .for_path(path)
        .map(|e| e.format)
        .unwrap_or(Format::Jsonl)
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ts(nanos: i64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(nanos)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

fn fmt_span(nanos: i64) -> String {
    let secs = nanos as f64 / 1e9;
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.3}s", secs)
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

fn print_records(records: &[Record], limit: Option<usize>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let take = limit.unwrap_or(records.len());
    for record in records.iter().take(take) {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

// ── Summary ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ColumnJson {
    name: String,
    kind: String,
    present: usize,
}

#[derive(Serialize)]
struct SummaryJson {
    file: String,
    format: &'static str,
    size_bytes: u64,
    rows: usize,
    columns: Vec<ColumnJson>,
    first_ts: Option<i64>,
    last_ts: Option<i64>,
}

/// Column kinds come from the embedded schema for columnar files and are
/// inferred from the values otherwise; a column holding more than one kind
/// is reported as `mixed`.
fn summarize(path: &Path, format: Format, records: &[Record]) -> Result<SummaryJson, ExportError> {
    let size_bytes = fs::metadata(path)?.len();

    let mut kinds: BTreeMap<String, Option<ValueKind>> = BTreeMap::new();
    let mut present: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        for (key, value) in record.iter() {
            *present.entry(key.to_string()).or_default() += 1;
            kinds
                .entry(key.to_string())
                .and_modify(|k| {
                    if *k != Some(value.kind()) {
                        *k = None;
                    }
                })
                .or_insert(Some(value.kind()));
        }
    }

    if format == Format::Columnar {
        let reader = ColumnarReader::open(path)?;
        for column in reader.schema() {
            kinds.insert(column.name.clone(), Some(column.kind));
            present.entry(column.name.clone()).or_default();
        }
    }

    let columns = kinds
        .into_iter()
        .map(|(name, kind)| ColumnJson {
            present: present.get(&name).copied().unwrap_or(0),
            kind: kind.map(|k| k.as_str()).unwrap_or("mixed").to_string(),
            name,
        })
        .collect();

    let timestamps: Vec<i64> = records
        .iter()
        .filter_map(|r| r.get_i64(TIMESTAMP_KEY))
        .collect();

    Ok(SummaryJson {
        file: path.display().to_string(),
        format: format.name(),
        size_bytes,
        rows: records.len(),
        columns,
        first_ts: timestamps.iter().min().copied(),
        last_ts: timestamps.iter().max().copied(),
    })
}

fn print_summary(summary: &SummaryJson, json: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if json {
        serde_json::to_writer_pretty(&mut out, summary)?;
        return writeln!(out);
    }

    writeln!(out, "File:     {}", summary.file)?;
    writeln!(out, "Format:   {}", summary.format)?;
    writeln!(out, "Size:     {}", human_bytes(summary.size_bytes))?;
    writeln!(out, "Rows:     {}", summary.rows)?;
    match (summary.first_ts, summary.last_ts) {
        (Some(first), Some(last)) => {
            writeln!(
                out,
                "Time:     {} .. {} ({})",
                fmt_ts(first),
                fmt_ts(last),
                fmt_span(last - first)
            )?;
        }
        _ => writeln!(out, "Time:     no timestamp column")?,
    }

    writeln!(out, "\nColumns ({}):", summary.columns.len())?;
    writeln!(out, "  {:<40} {:<8} {:>8}", "Name", "Type", "Present")?;
    writeln!(out, "  {}", "─".repeat(58))?;
    for column in &summary.columns {
        writeln!(
            out,
            "  {:<40} {:<8} {:>8}",
            column.name, column.kind, column.present
        )?;
    }
    Ok(())
}
