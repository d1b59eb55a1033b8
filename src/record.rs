use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Write},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prelude::*;

/// Scalar field value as stored in the time-series database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Convert a JSON scalar, [`None`] for `null`, arrays, and objects.
    ///
    /// Every number becomes a float: SEMS sends `0` and `0.3` for the same reading,
    /// and InfluxDB rejects a field that changes its type.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(value) => Some(Self::Boolean(*value)),
            Value::Number(number) => number.as_f64().map(Self::Float),
            Value::String(value) => Some(Self::String(value.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn write_line_protocol(&self, output: &mut String) -> Result {
        match self {
            Self::Integer(value) => write!(output, "{value}i")?,
            Self::Float(value) => {
                ensure!(value.is_finite(), "`{value}` cannot be written");
                write!(output, "{value}")?;
            }
            Self::Boolean(value) => write!(output, "{value}")?,
            Self::String(value) => {
                output.push('"');
                for char in value.chars() {
                    if matches!(char, '"' | '\\') {
                        output.push('\\');
                    }
                    output.push(char);
                }
                output.push('"');
            }
        }
        Ok(())
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// Field values keyed by the metric name.
#[must_use]
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
    derive_more::Deref,
    derive_more::DerefMut,
    derive_more::IntoIterator,
)]
#[into_iterator(owned, ref)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for Fields {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = self.0.iter().format_with(", ", |(name, value), f| f(&format_args!("{name}: {value}")));
        write!(f, "{{{fields}}}")
    }
}

/// Single measurement point handed over to a sink.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,

    /// Epoch seconds.
    pub timestamp: i64,

    pub fields: Fields,
}

impl Point {
    /// Render the point in [InfluxDB line protocol] with the second precision.
    ///
    /// [InfluxDB line protocol]: https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/
    pub fn to_line_protocol(&self) -> Result<String> {
        ensure!(!self.fields.is_empty(), "point at {} has no fields", self.timestamp);
        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (i, (name, value)) in self.fields.iter().enumerate() {
            line.push(if i == 0 { ' ' } else { ',' });
            escape_into(&mut line, name, &[',', '=', ' ']);
            line.push('=');
            value
                .write_line_protocol(&mut line)
                .with_context(|| format!("invalid value of field `{name}`"))?;
        }
        write!(line, " {}", self.timestamp)?;
        Ok(line)
    }
}

fn escape_into(output: &mut String, text: &str, special: &[char]) {
    for char in text.chars() {
        if char == '\\' || special.contains(&char) {
            output.push('\\');
        }
        output.push(char);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    use super::*;

    fn point(fields: impl IntoIterator<Item = (&'static str, FieldValue)>) -> Point {
        Point {
            measurement: "sems".to_owned(),
            timestamp: 1_710_403_500,
            fields: fields.into_iter().map(|(name, value)| (name.to_owned(), value)).collect(),
        }
    }

    #[test]
    fn from_json_ok() {
        assert_eq!(FieldValue::from_json(&json!(42)), Some(FieldValue::Float(42.0)));
        assert_eq!(FieldValue::from_json(&json!(229.5)), Some(FieldValue::Float(229.5)));
        assert_eq!(FieldValue::from_json(&json!("on")), Some(FieldValue::String("on".to_owned())));
        assert_eq!(FieldValue::from_json(&json!(true)), Some(FieldValue::Boolean(true)));
        assert_eq!(FieldValue::from_json(&json!(null)), None);
        assert_eq!(FieldValue::from_json(&json!([1])), None);
        assert_eq!(FieldValue::from_json(&json!({})), None);
    }

    #[test]
    fn from_json_float_ok() {
        let Some(FieldValue::Float(value)) = FieldValue::from_json(&json!(0.1 + 0.2)) else {
            panic!("expected a float");
        };
        assert_abs_diff_eq!(value, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn from_json_keeps_number_type_stable() -> Result {
        let zero = FieldValue::from_json(&json!(0));
        let fraction = FieldValue::from_json(&json!(0.3));
        assert_eq!(zero, Some(FieldValue::Float(0.0)));
        assert_eq!(fraction, Some(FieldValue::Float(0.3)));

        let line = point([("d_buy", FieldValue::from_json(&json!(0)).context("no value")?)]).to_line_protocol()?;
        assert_eq!(line, "sems d_buy=0 1710403500");
        Ok(())
    }

    #[test]
    fn fields_display_ok() {
        let point = point([("p_pv", FieldValue::Integer(3503)), ("status", FieldValue::String("ok".to_owned()))]);
        assert_eq!(point.fields.to_string(), r#"{p_pv: 3503, status: "ok"}"#);
    }

    #[test]
    fn line_protocol_ok() -> Result {
        let point = point([
            ("p_grid", FieldValue::Integer(-120)),
            ("vac", FieldValue::Float(229.5)),
            ("status", FieldValue::String(r#"say "hi""#.to_owned())),
            ("is_online", FieldValue::Boolean(true)),
        ]);
        assert_eq!(
            point.to_line_protocol()?,
            r#"sems is_online=true,p_grid=-120i,status="say \"hi\"",vac=229.5 1710403500"#,
        );
        Ok(())
    }

    #[test]
    fn line_protocol_escaping_ok() -> Result {
        let mut point = point([("a b,c=d", FieldValue::Integer(1))]);
        point.measurement = "solar plant,1".to_owned();
        assert_eq!(point.to_line_protocol()?, r"solar\ plant\,1 a\ b\,c\=d=1i 1710403500");
        Ok(())
    }

    #[test]
    fn line_protocol_rejects_empty_point() {
        assert!(point([]).to_line_protocol().is_err());
    }

    #[test]
    fn line_protocol_rejects_nan() {
        assert!(point([("vac", FieldValue::Float(f64::NAN))]).to_line_protocol().is_err());
    }

    #[test]
    fn point_json_ok() -> Result {
        let point = point([("p_pv", FieldValue::Integer(3503)), ("vac", FieldValue::Float(229.5))]);
        let json = serde_json::to_string(&point)?;
        assert_eq!(
            json,
            r#"{"measurement":"sems","timestamp":1710403500,"fields":{"p_pv":3503,"vac":229.5}}"#,
        );
        assert_eq!(serde_json::from_str::<Point>(&json)?, point);
        Ok(())
    }
}
