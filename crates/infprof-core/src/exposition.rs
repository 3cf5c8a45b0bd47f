//! Parser for the Prometheus plaintext exposition format.
//!
//! Each sample line has the shape `name{key="value",...} value`. Comment
//! lines start with `#`. Histograms are spread over `<name>_bucket`,
//! `<name>_sum` and `<name>_count` lines and are reassembled here into a
//! [`Histogram`] keyed by the bucket's `le` label.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Label value used for the open-ended top bucket.
pub const INF_LABEL: &str = "inf";

/// One parsed sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLine {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Role of a metric name, decided by its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Bucket,
    Sum,
    Count,
    Total,
    None,
}

/// Splits a metric name into its base name and suffix role.
pub fn classify(name: &str) -> (&str, Suffix) {
    if let Some(base) = name.strip_suffix("_bucket") {
        (base, Suffix::Bucket)
    } else if let Some(base) = name.strip_suffix("_sum") {
        (base, Suffix::Sum)
    } else if let Some(base) = name.strip_suffix("_count") {
        (base, Suffix::Count)
    } else if let Some(base) = name.strip_suffix("_total") {
        (base, Suffix::Total)
    } else {
        (name, Suffix::None)
    }
}

/// Parses one line. Comments, blank lines and malformed lines yield `None`.
///
/// The value is the last whitespace-separated token. Everything before it is
/// the metric name with an optional `{...}` label block.
pub fn parse_metric_line(line: &str) -> Option<MetricLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (head, value) = line.rsplit_once(char::is_whitespace)?;
    let value: f64 = value.trim().parse().ok()?;
    let head = head.trim();

    let (name, labels) = match head.find('{') {
        Some(open) => {
            let close = head.rfind('}')?;
            if close <= open {
                return None;
            }
            (&head[..open], parse_labels(&head[open + 1..close]))
        }
        None => (head, BTreeMap::new()),
    };

    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    Some(MetricLine {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parses the inside of a label block. Commas inside quoted values do not
/// separate pairs; pairs without `=` are ignored.
pub fn parse_labels(block: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for pair in split_unquoted(block, ',') {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        labels.insert(key.to_string(), unquote(value.trim()));
    }
    labels
}

/// Splits on `sep` outside of double quotes. Backslash escapes inside quotes
/// are kept verbatim for [`unquote`].
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < s.len() {
        parts.push(&s[start..]);
    }
    parts
}

fn unquote(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Replaces NaN and infinities with zero.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Normalizes an `le` label: every spelling of infinity becomes [`INF_LABEL`].
pub fn normalize_le(le: &str) -> String {
    let trimmed = le.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.eq_ignore_ascii_case("inf") {
        INF_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

fn bucket_bound(label: &str) -> f64 {
    if label == INF_LABEL {
        return f64::INFINITY;
    }
    label.parse().unwrap_or(f64::INFINITY)
}

/// Cumulative bucket counts of one histogram at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    buckets: BTreeMap<String, f64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the cumulative count for a bucket. A repeated label replaces
    /// the earlier count.
    pub fn set_bucket(&mut self, le: &str, count: f64) {
        self.buckets.insert(normalize_le(le), sanitize(count));
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.buckets.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Count of the `inf` bucket, i.e. the total number of observations.
    pub fn total(&self) -> Option<f64> {
        self.get(INF_LABEL)
    }

    /// Buckets ordered by numeric upper bound, `inf` last.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<(&str, f64)> = self
            .buckets
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        out.sort_by(|a, b| bucket_bound(a.0).total_cmp(&bucket_bound(b.0)));
        out
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted = self.sorted();
        let mut map = serializer.serialize_map(Some(sorted.len()))?;
        for (label, count) in sorted {
            map.serialize_entry(label, &count)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_gauge() {
        let m = parse_metric_line("vllm:num_requests_running 3").unwrap();
        assert_eq!(m.name, "vllm:num_requests_running");
        assert!(m.labels.is_empty());
        assert_eq!(m.value, 3.0);
    }

    #[test]
    fn test_parse_line_with_labels() {
        let m = parse_metric_line(
            r#"vllm:time_to_first_token_seconds_bucket{le="0.5",model_name="llama"} 7.0"#,
        )
        .unwrap();
        assert_eq!(m.name, "vllm:time_to_first_token_seconds_bucket");
        assert_eq!(m.labels.get("le").map(String::as_str), Some("0.5"));
        assert_eq!(m.labels.get("model_name").map(String::as_str), Some("llama"));
        assert_eq!(m.value, 7.0);
    }

    #[test]
    fn test_quoted_comma_is_not_separator() {
        let labels = parse_labels(r#"model="a,b", engine="x""#);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["model"], "a,b");
        assert_eq!(labels["engine"], "x");
    }

    #[test]
    fn test_label_value_with_space_and_escape() {
        let m = parse_metric_line(r#"foo{path="/a b",q="say \"hi\""} 1"#).unwrap();
        assert_eq!(m.labels["path"], "/a b");
        assert_eq!(m.labels["q"], r#"say "hi""#);
    }

    #[test]
    fn test_skips_comments_and_garbage() {
        assert!(parse_metric_line("# HELP foo help text").is_none());
        assert!(parse_metric_line("# TYPE foo gauge").is_none());
        assert!(parse_metric_line("").is_none());
        assert!(parse_metric_line("novalue").is_none());
        assert!(parse_metric_line("foo notanumber").is_none());
        assert!(parse_metric_line("foo}{ 1").is_none());
    }

    #[test]
    fn test_special_values_parse() {
        assert!(parse_metric_line("foo NaN").unwrap().value.is_nan());
        assert_eq!(parse_metric_line("foo +Inf").unwrap().value, f64::INFINITY);
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize(1.25), 1.25);
    }

    #[test]
    fn test_classify_suffixes() {
        assert_eq!(classify("x_bucket"), ("x", Suffix::Bucket));
        assert_eq!(classify("x_sum"), ("x", Suffix::Sum));
        assert_eq!(classify("x_count"), ("x", Suffix::Count));
        assert_eq!(classify("prompt_tokens_total"), ("prompt_tokens", Suffix::Total));
        assert_eq!(classify("kv_cache_usage_perc"), ("kv_cache_usage_perc", Suffix::None));
    }

    #[test]
    fn test_histogram_reconstruction() {
        let body = "\
foo_bucket{le=\"0.5\"} 7
foo_bucket{le=\"+Inf\"} 10
foo_bucket{le=\"0.1\"} 3
";
        let mut h = Histogram::new();
        for m in body.lines().filter_map(parse_metric_line) {
            h.set_bucket(&m.labels["le"], m.value);
        }

        assert_eq!(h.len(), 3);
        assert_eq!(h.get("0.1"), Some(3.0));
        assert_eq!(h.get("0.5"), Some(7.0));
        assert_eq!(h.get("inf"), Some(10.0));
        assert_eq!(h.total(), Some(10.0));

        let labels: Vec<&str> = h.sorted().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["0.1", "0.5", "inf"]);

        let counts: Vec<f64> = h.sorted().into_iter().map(|(_, c)| c).collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_histogram_sorts_numerically_not_lexically() {
        let mut h = Histogram::new();
        h.set_bucket("10", 5.0);
        h.set_bucket("2.5", 2.0);
        h.set_bucket("Inf", 6.0);
        let labels: Vec<&str> = h.sorted().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["2.5", "10", "inf"]);

        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"2.5":2.0,"10":5.0,"inf":6.0}"#);
    }

    #[test]
    fn test_normalize_le() {
        assert_eq!(normalize_le("+Inf"), "inf");
        assert_eq!(normalize_le("Inf"), "inf");
        assert_eq!(normalize_le("inf"), "inf");
        assert_eq!(normalize_le("0.25"), "0.25");
    }
}
