//! Difference between two records taken some time apart.
//!
//! Numeric fields present in both snapshots are subtracted; everything else
//! carries the newer value. The result is stamped with the interval it
//! covers.

use crate::record::{FlattenMode, Record, TIMESTAMP_KEY, Value};

pub const DELTA_DURATION_KEY: &str = "_delta_duration_ms";
pub const DELTA_START_KEY: &str = "_delta_start_ts";
pub const DELTA_END_KEY: &str = "_delta_end_ts";

/// Which fields get subtracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeltaMode {
    /// Every numeric field.
    #[default]
    All,
    /// Only fields whose name marks them as a cumulative counter; gauges keep
    /// their final value.
    CountersOnly,
}

const COUNTER_SUFFIXES: &[&str] = &[
    "Time", "Bytes", "Count", "Switches", "Fault", "Reads", "Writes", "Sent", "Recvd", "Errors",
    "Drops", "Packets", "Total",
];

/// Returns true when the field name ends with a cumulative-counter suffix.
pub fn is_counter_field(name: &str) -> bool {
    COUNTER_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Computes `final - initial` field by field.
///
/// Either side may be missing; the result is then the other side plus the
/// delta metadata.
pub fn compute_delta(
    initial: Option<&Record>,
    final_: Option<&Record>,
    duration_ms: i64,
) -> Record {
    compute_delta_with(initial, final_, duration_ms, DeltaMode::All, FlattenMode::Json)
}

/// Like [`compute_delta`], with explicit field selection and flattening.
///
/// Deferred collections are flattened with `flatten` before subtracting, so
/// under [`FlattenMode::Expand`] per-process and per-GPU counters get their
/// own deltas.
pub fn compute_delta_with(
    initial: Option<&Record>,
    final_: Option<&Record>,
    duration_ms: i64,
    mode: DeltaMode,
    flatten: FlattenMode,
) -> Record {
    let initial = initial.map(|r| r.flatten_with(flatten));
    let final_ = final_.map(|r| r.flatten_with(flatten));

    let mut result = Record::new();

    match (initial.as_deref(), final_.as_deref()) {
        (Some(initial), Some(final_)) => {
            for (key, final_val) in final_.iter() {
                let value = match initial.get(key) {
                    Some(initial_val) if key != TIMESTAMP_KEY && subtracts(key, mode) => {
                        subtract(initial_val, final_val).unwrap_or_else(|| final_val.clone())
                    }
                    _ => final_val.clone(),
                };
                result.insert(key, value);
            }
            for (key, initial_val) in initial.iter() {
                if !final_.contains_key(key) {
                    result.insert(key, initial_val.clone());
                }
            }
        }
        (Some(only), None) | (None, Some(only)) => result.overlay(only),
        (None, None) => {}
    }

    if let Some(ts) = initial.as_ref().and_then(|r| r.get(TIMESTAMP_KEY)) {
        result.insert(DELTA_START_KEY, ts.clone());
    }
    if let Some(ts) = final_.as_ref().and_then(|r| r.get(TIMESTAMP_KEY)) {
        result.insert(DELTA_END_KEY, ts.clone());
        result.insert(TIMESTAMP_KEY, ts.clone());
    }
    result.insert(DELTA_DURATION_KEY, duration_ms);

    result
}

fn subtracts(key: &str, mode: DeltaMode) -> bool {
    match mode {
        DeltaMode::All => true,
        DeltaMode::CountersOnly => is_counter_field(key),
    }
}

/// Int minus int stays an integer; any other numeric pair becomes a float.
fn subtract(initial: &Value, final_: &Value) -> Option<Value> {
    match (initial, final_) {
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(b.wrapping_sub(*a))),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            Some(Value::Float(b.as_f64()? - a.as_f64()?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProcessSample;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn test_basic_delta() {
        let initial = rec(&[("x", Value::Int(10)), ("y", Value::Str("a".into()))]);
        let final_ = rec(&[("x", Value::Int(15)), ("y", Value::Str("b".into()))]);

        let d = compute_delta(Some(&initial), Some(&final_), 1000);
        assert_eq!(d.get_i64("x"), Some(5));
        assert_eq!(d.get_str("y"), Some("b"));
        assert_eq!(d.get_i64(DELTA_DURATION_KEY), Some(1000));
    }

    #[test]
    fn test_missing_initial_is_identity() {
        let final_ = rec(&[("x", Value::Int(5))]);
        let d = compute_delta(None, Some(&final_), 100);
        assert_eq!(d.get_i64("x"), Some(5));
        assert_eq!(d.get_i64(DELTA_DURATION_KEY), Some(100));
        assert!(!d.contains_key(DELTA_START_KEY));
    }

    #[test]
    fn test_missing_final_is_identity() {
        let initial = rec(&[("x", Value::Int(5))]);
        let d = compute_delta(Some(&initial), None, 100);
        assert_eq!(d.get_i64("x"), Some(5));

        let empty = compute_delta(None, None, 7);
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_timestamps_metadata() {
        let initial = rec(&[(TIMESTAMP_KEY, Value::Int(1_000)), ("n", Value::Int(1))]);
        let final_ = rec(&[(TIMESTAMP_KEY, Value::Int(3_000)), ("n", Value::Int(4))]);
        let d = compute_delta(Some(&initial), Some(&final_), 2);
        assert_eq!(d.get_i64(DELTA_START_KEY), Some(1_000));
        assert_eq!(d.get_i64(DELTA_END_KEY), Some(3_000));
        assert_eq!(d.get_i64(TIMESTAMP_KEY), Some(3_000));
        assert_eq!(d.get_i64("n"), Some(3));
    }

    #[test]
    fn test_float_and_mixed_numeric() {
        let initial = rec(&[("f", Value::Float(1.5)), ("m", Value::Int(2))]);
        let final_ = rec(&[("f", Value::Float(4.0)), ("m", Value::Float(3.5))]);
        let d = compute_delta(Some(&initial), Some(&final_), 1);
        assert_eq!(d.get("f"), Some(&Value::Float(2.5)));
        assert_eq!(d.get("m"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_disappeared_and_new_keys() {
        let initial = rec(&[("gone", Value::Int(9)), ("flag", Value::Bool(false))]);
        let final_ = rec(&[("new", Value::Int(3)), ("flag", Value::Bool(true))]);
        let d = compute_delta(Some(&initial), Some(&final_), 1);
        assert_eq!(d.get_i64("gone"), Some(9));
        assert_eq!(d.get_i64("new"), Some(3));
        assert_eq!(d.get("flag"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_deferred_inputs_are_flattened() {
        let mut initial = Record::new();
        initial.set_processes(vec![ProcessSample::default()]);
        let mut final_ = Record::new();
        final_.set_processes(vec![ProcessSample {
            pid: 7,
            ..Default::default()
        }]);
        let d = compute_delta(Some(&initial), Some(&final_), 1);
        assert!(d.get_str("processes").unwrap().contains("\"pid\":7"));
        assert!(!d.has_deferred());
    }

    #[test]
    fn test_expanded_processes_are_subtracted() {
        let sample = |user: i64| {
            let mut r = Record::new();
            r.insert(TIMESTAMP_KEY, 0);
            r.set_processes(vec![ProcessSample {
                pid: 7,
                name: "python".into(),
                cpu_time_user_mode: user,
                ..Default::default()
            }]);
            r
        };
        let d = compute_delta_with(
            Some(&sample(10)),
            Some(&sample(30)),
            1000,
            DeltaMode::All,
            FlattenMode::Expand,
        );
        assert_eq!(d.get_i64("proc0CpuTimeUserMode"), Some(20));
        assert_eq!(d.get_str("proc0Name"), Some("python"));
        assert!(!d.contains_key("processes"));
        assert!(!d.has_deferred());
    }

    #[test]
    fn test_counters_only_mode() {
        let initial = rec(&[
            ("vDiskReadBytes", Value::Int(100)),
            ("vLoadAvg", Value::Float(1.0)),
        ]);
        let final_ = rec(&[
            ("vDiskReadBytes", Value::Int(160)),
            ("vLoadAvg", Value::Float(2.0)),
        ]);
        let d = compute_delta_with(
            Some(&initial),
            Some(&final_),
            1,
            DeltaMode::CountersOnly,
            FlattenMode::Json,
        );
        assert_eq!(d.get_i64("vDiskReadBytes"), Some(60));
        assert_eq!(d.get("vLoadAvg"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_is_counter_field() {
        assert!(is_counter_field("vCpuContextSwitches"));
        assert!(is_counter_field("vNetworkBytesSent"));
        assert!(is_counter_field("vllmTokensPromptTotal"));
        assert!(!is_counter_field("vMemoryUsedPercent"));
    }
}
