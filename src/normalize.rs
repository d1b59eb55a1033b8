use serde_json::Value;

use crate::{
    metrics::{ExtractedRecord, MetricKind, MetricSpec},
    prelude::*,
    record::{FieldValue, Fields},
};

/// Direction of the grid power flow: `1` or `-1`.
///
/// Whatever `gridStatus` is for, it is not the direction.
const GRID_DIRECTION_POINTER: &str = "/powerflow/loadStatus";

/// Power flows below this magnitude are reported as zero.
const NOISE_THRESHOLD_WATTS: f64 = 10.0;

/// Convert the power flow readings into signed integer watts.
///
/// Other metrics pass through as they are. Power flows which cannot be converted are dropped.
pub fn normalize(spec: &MetricSpec, record: ExtractedRecord, document: &Value) -> Fields {
    record
        .into_iter()
        .filter_map(|(name, value)| {
            let kind = spec.get(&name).map_or(MetricKind::Plain, |metric| metric.kind);
            let value = match kind {
                MetricKind::Plain => FieldValue::from_json(&value),
                MetricKind::PowerFlow | MetricKind::GridPowerFlow => {
                    normalize_power_flow(&name, &value, kind, document).map(FieldValue::Integer)
                }
            }?;
            Some((name, value))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn normalize_power_flow(name: &str, raw: &Value, kind: MetricKind, document: &Value) -> Option<i64> {
    let magnitude = match raw {
        Value::Null => return None,
        Value::String(text) if text.trim().is_empty() => {
            debug!(metric = name, "not reporting");
            return None;
        }
        Value::String(text) => parse_watts(text),
        Value::Number(number) => number.as_f64(),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    let Some(watts) = magnitude.map(f64::trunc).filter(|watts| watts.is_finite()) else {
        warn!(metric = name, %raw, "not a number, dropping");
        return None;
    };

    if watts.abs() < NOISE_THRESHOLD_WATTS {
        return Some(0);
    }

    if kind != MetricKind::GridPowerFlow {
        return Some(watts as i64);
    }
    let direction = document.pointer(GRID_DIRECTION_POINTER);
    if let Some(sign) = direction.and_then(Value::as_f64) {
        Some((watts * sign) as i64)
    } else {
        warn!(metric = name, %raw, ?direction, "unknown grid flow direction, dropping");
        None
    }
}

/// Parse `"3503(W)"` into `3503.0`.
fn parse_watts(text: &str) -> Option<f64> {
    text.trim().strip_suffix("(W)")?.trim().parse().ok()
}
