//! Prometheus text exposition (version 0.0.4) rendering.
//!
//! Records arrive pre-assembled; this module only groups them by metric
//! name, emits one `# TYPE` comment per group, and formats sample lines.

use std::collections::BTreeMap;

use crate::metric::MetricRecord;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render records into the text exposition format. Metric families appear
/// in name order; samples within a family keep their input order.
pub fn render(records: &[MetricRecord]) -> String {
    let mut families: BTreeMap<&str, Vec<&MetricRecord>> = BTreeMap::new();
    for record in records {
        families
            .entry(record.descriptor.name.as_str())
            .or_default()
            .push(record);
    }

    let mut out = String::new();
    for (name, family) in families {
        out.push_str("# TYPE ");
        out.push_str(name);
        out.push(' ');
        out.push_str(family[0].descriptor.kind.as_str());
        out.push('\n');

        for record in family {
            out.push_str(name);
            format_labels(&mut out, record);
            out.push(' ');
            out.push_str(&format_value(record.value));
            out.push('\n');
        }
    }

    out
}

fn format_labels(out: &mut String, record: &MetricRecord) {
    if record.descriptor.label_keys.is_empty() {
        return;
    }

    out.push('{');
    for (i, (key, value)) in record
        .descriptor
        .label_keys
        .iter()
        .zip(&record.label_values)
        .enumerate()
    {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_label_value(value));
        out.push('"');
    }
    out.push('}');
}

/// Backslash, double quote and newline must be escaped in label values.
fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}
