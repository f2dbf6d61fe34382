//! Prometheus text rendering of the latest sample per series.

use crate::timeseries::TimeSeriesStore;
use crate::types::Labels;
use std::fmt::Write;

/// Render one line per series: `name{k="v",...} <value> <timestamp ms>`
pub fn export_prometheus(store: &TimeSeriesStore) -> String {
    let mut out = String::new();
    for latest in store.latest(None) {
        out.push_str(&latest.name);
        write_labels(&mut out, &latest.labels);
        out.push(' ');
        write_value(&mut out, latest.sample.value);
        let _ = writeln!(out, " {}", latest.sample.timestamp.timestamp_millis());
    }
    out
}

fn write_labels(out: &mut String, labels: &Labels) {
    if labels.is_empty() {
        return;
    }

    out.push('{');
    for (i, (key, value)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push_str("=\"");
        escape_label_value(out, value);
        out.push('"');
    }
    out.push('}');
}

fn write_value(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str("NaN");
    } else if value == f64::INFINITY {
        out.push_str("+Inf");
    } else if value == f64::NEG_INFINITY {
        out.push_str("-Inf");
    } else {
        let _ = write!(out, "{}", value);
    }
}

fn escape_label_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}
