use chrono::{Local, NaiveDateTime, TimeZone};
use serde_json::Value;
use tracing::{Span, field::Empty};

use crate::{metrics::MetricSpec, normalize::normalize, prelude::*, record::Point};

/// Plant's local time of the measurement, without the time zone.
const TIMESTAMP_POINTER: &str = "/info/time";

const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Extract and normalize the metrics into a point stamped with the document's own time.
#[instrument(skip_all, fields(timestamp = Empty))]
pub fn build_point(measurement: &str, spec: &MetricSpec, document: &Value) -> Result<Point> {
    let timestamp = parse_timestamp(document)?;
    Span::current().record("timestamp", timestamp);
    let record = spec.extract(document);
    let fields = normalize(spec, record, document);
    debug!(%fields, "built the point");
    Ok(Point { measurement: measurement.to_owned(), timestamp, fields })
}

/// Parse `info.time` as the local time and convert it into epoch seconds.
pub fn parse_timestamp(document: &Value) -> Result<i64> {
    let text = document
        .pointer(TIMESTAMP_POINTER)
        .context("the document has no `info.time`")?
        .as_str()
        .context("`info.time` is not a string")?;
    let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .with_context(|| format!("`{text}` is not a valid timestamp"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("`{text}` does not exist in the local time zone"))?;
    Ok(local.timestamp())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn parse_timestamp_ok() -> Result {
        let document = json!({ "info": { "time": "03/14/2024 08:05:00" } });
        let expected = Local.with_ymd_and_hms(2024, 3, 14, 8, 5, 0).earliest().unwrap().timestamp();
        assert_eq!(parse_timestamp(&document)?, expected);
        Ok(())
    }

    #[test]
    fn parse_timestamp_errors() {
        assert!(parse_timestamp(&json!({})).is_err());
        assert!(parse_timestamp(&json!({ "info": { "time": 1_710_403_500 } })).is_err());
        assert!(parse_timestamp(&json!({ "info": { "time": "2024-03-14 08:05:00" } })).is_err());
    }

    #[test]
    fn build_point_ok() -> Result {
        // language=json
        let document = json!({
            "info": { "time": "03/14/2024 08:05:00" },
            "energeStatisticsCharts": { "sum": 12.5, "sell": 3.1, "buy": 0 },
            "powerflow": { "pv": "3503(W)", "load": "", "grid": "1250(W)", "loadStatus": -1 },
            "inverter": [{ "sn": "58500MSU123X9876", "d": { "vac1": 229.5, "pac": 3400 } }],
        });
        let point = build_point("sems", &MetricSpec::builtin()?, &document)?;
        assert_eq!(point.measurement, "sems");
        assert_eq!(point.timestamp, parse_timestamp(&document)?);
        assert_eq!(
            point.fields.iter().map(|(name, value)| (name.as_str(), value.clone())).collect::<Vec<_>>(),
            [
                ("d_buy", FieldValue::Float(0.0)),
                ("d_pv_sum", FieldValue::Float(12.5)),
                ("d_sell", FieldValue::Float(3.1)),
                ("p_grid", FieldValue::Integer(-1250)),
                ("p_pv", FieldValue::Integer(3503)),
                ("pac", FieldValue::Float(3400.0)),
                ("vac", FieldValue::Float(229.5)),
            ],
        );
        Ok(())
    }

    #[test]
    fn build_point_requires_timestamp() -> Result {
        let document = json!({ "powerflow": { "pv": "3503(W)" } });
        assert!(build_point("sems", &MetricSpec::builtin()?, &document).is_err());
        Ok(())
    }
}
