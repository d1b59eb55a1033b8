use std::{
    collections::BTreeMap,
    fmt::Formatter,
    path::Path,
};

use serde::{
    Deserialize,
    Deserializer,
    de::{MapAccess, Visitor},
};
use serde_json::Value;

use crate::{prelude::*, query::Query};

/// Power flow readings live under this prefix and get normalized into signed watts.
const POWER_FLOW_PREFIX: &str = "powerflow";

/// The only power flow which direction is reported separately.
const GRID_POWER_FLOW_PATH: &str = "powerflow.grid";

/// Built-in metric table: `(name, query path)`.
const DEFAULT_METRICS: &[(&str, &str)] = &[
    // Plant statistics for today:
    ("d_pv_sum", "energeStatisticsCharts.sum"),
    ("d_pv_use", "energeStatisticsCharts.selfUseOfPv"),
    ("d_sell", "energeStatisticsCharts.sell"),
    ("d_buy", "energeStatisticsCharts.buy"),
    ("d_use", "energeStatisticsCharts.consumptionOfLoad"),
    // Current power flow:
    ("p_pv", "powerflow.pv"),
    ("p_load", "powerflow.load"),
    ("p_grid", "powerflow.grid"),
    // First inverter. Select a specific one by its serial number when there are more,
    // for example: ``inverter[?sn==`58500MSU123X9876`]|[0].d.vpv1``.
    ("vdc1", "inverter[0].d.vpv1"),
    ("vdc2", "inverter[0].d.vpv2"),
    ("vdc3", "inverter[0].d.vpv3"),
    ("idc1", "inverter[0].d.ipv1"),
    ("idc2", "inverter[0].d.ipv2"),
    ("idc3", "inverter[0].d.ipv3"),
    ("vac", "inverter[0].d.vac1"),
    ("iac", "inverter[0].d.iac1"),
    ("fac", "inverter[0].d.fac1"),
    ("pac", "inverter[0].d.pac"),
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Plain,

    /// Magnitude formatted like `"3503(W)"`.
    PowerFlow,

    /// Power flow magnitude, which sign is stored in the sibling `loadStatus`.
    GridPowerFlow,
}

impl MetricKind {
    fn of(query: &Query) -> Self {
        let path = query.as_str().trim();
        if path == GRID_POWER_FLOW_PATH {
            Self::GridPowerFlow
        } else if path.starts_with(POWER_FLOW_PREFIX) {
            Self::PowerFlow
        } else {
            Self::Plain
        }
    }
}

#[derive(Clone, Debug)]
pub struct Metric {
    pub name: String,
    pub query: Query,
    pub kind: MetricKind,
}

impl Metric {
    pub fn new(name: impl Into<String>, path: &str) -> Result<Self> {
        let name = name.into();
        ensure!(!name.is_empty(), "metric name must not be empty");
        let query: Query =
            path.parse().with_context(|| format!("invalid query path `{path}` of metric `{name}`"))?;
        Ok(Self { kind: MetricKind::of(&query), name, query })
    }
}

/// Ordered table of the metrics to extract from each plant document.
#[must_use]
#[derive(Clone, Debug)]
pub struct MetricSpec(Vec<Metric>);

impl MetricSpec {
    pub fn builtin() -> Result<Self> {
        DEFAULT_METRICS.iter().map(|(name, path)| Metric::new(*name, path)).collect::<Result<_>>().map(Self)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_from(path: &Path) -> Result<Self> {
        #[derive(Deserialize)]
        struct MetricsFile {
            metrics: MetricSpec,
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        Ok(toml::from_str::<MetricsFile>(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?
            .metrics)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.0.iter().find(|metric| metric.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Resolve every metric path against the document.
    ///
    /// Unresolved metrics are omitted. Evaluation errors and non-scalar results are only logged,
    /// they never abort the extraction of the remaining metrics.
    pub fn extract(&self, document: &Value) -> ExtractedRecord {
        let mut record = BTreeMap::new();
        for metric in &self.0 {
            match metric.query.search(document) {
                Ok(None) => {
                    debug!(metric = metric.name.as_str(), path = %metric.query, "no value");
                }
                Ok(Some(Value::Array(array))) if array.is_empty() => {
                    debug!(metric = metric.name.as_str(), path = %metric.query, "filtered out");
                }
                Ok(Some(value @ (Value::Array(_) | Value::Object(_)))) => {
                    warn!(metric = metric.name.as_str(), path = %metric.query, %value, "not a scalar value, skipping");
                }
                Ok(Some(value)) => {
                    record.insert(metric.name.clone(), value);
                }
                Err(error) => {
                    warn!(metric = metric.name.as_str(), path = %metric.query, "failed to evaluate: {error:#}");
                }
            }
        }
        ExtractedRecord(record)
    }
}

impl FromIterator<Metric> for MetricSpec {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for MetricSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetricSpecVisitor;

        impl<'de> Visitor<'de> for MetricSpecVisitor {
            type Value = MetricSpec;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a table of metric names to query paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut metrics = Vec::new();
                while let Some((name, path)) = map.next_entry::<String, String>()? {
                    let metric = Metric::new(name, &path)
                        .map_err(|error| serde::de::Error::custom(format!("{error:#}")))?;
                    metrics.push(metric);
                }
                Ok(MetricSpec(metrics))
            }
        }

        deserializer.deserialize_map(MetricSpecVisitor)
    }
}

/// Raw scalar values keyed by the metric name, as they were found in the document.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, derive_more::Deref, derive_more::IntoIterator)]
#[into_iterator(owned, ref)]
pub struct ExtractedRecord(BTreeMap<String, Value>);

impl FromIterator<(String, Value)> for ExtractedRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtin_ok() -> Result {
        let spec = MetricSpec::builtin()?;
        assert_eq!(spec.get("p_grid").map(|metric| metric.kind), Some(MetricKind::GridPowerFlow));
        assert_eq!(spec.get("p_pv").map(|metric| metric.kind), Some(MetricKind::PowerFlow));
        assert_eq!(spec.get("vac").map(|metric| metric.kind), Some(MetricKind::Plain));
        Ok(())
    }

    #[test]
    fn read_from_keeps_order() -> Result {
        let file = tempfile::NamedTempFile::new()?;
        // language=toml
        std::fs::write(
            file.path(),
            r#"
                [metrics]
                zeta = "powerflow.pv"
                alpha = "inverter[?sn==`58500MSU123X9876`]|[0].d.vpv1"
                "p grid" = "powerflow.grid"
            "#,
        )?;
        let spec = MetricSpec::read_from(file.path())?;
        let names: Vec<_> = spec.iter().map(|metric| metric.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "p grid"]);
        Ok(())
    }

    #[test]
    fn read_from_rejects_invalid_path() -> Result {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "[metrics]\nbroken = \"inverter[0\"\n")?;
        let error = MetricSpec::read_from(file.path()).unwrap_err();
        assert!(format!("{error:#}").contains("broken"), "{error:#}");
        Ok(())
    }

    #[test]
    fn extract_omits_missing_fields() -> Result {
        let spec = MetricSpec::builtin()?;
        // language=json
        let document = json!({
            "powerflow": { "pv": "3503(W)", "load": null },
            "inverter": [{ "d": { "vac1": 229.5, "pac": 1500 } }],
        });
        let record = spec.extract(&document);
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("p_pv"), Some(&json!("3503(W)")));
        assert_eq!(record.get("vac"), Some(&json!(229.5)));
        assert_eq!(record.get("pac"), Some(&json!(1500)));
        assert!(!record.contains_key("p_load"));
        assert!(!record.contains_key("d_sell"));
        Ok(())
    }

    #[test]
    fn extract_survives_structural_errors() -> Result {
        let spec = MetricSpec(vec![
            Metric::new("broken", "info.time.hour")?,
            Metric::new("structured", "inverter[0].d")?,
            Metric::new("filtered", "inverter[?sn=='none'].d.pac")?,
            Metric::new("time", "info.time")?,
        ]);
        let document = json!({ "info": { "time": "03/14/2024 08:05:00" }, "inverter": [{ "sn": "X", "d": {} }] });
        let record = spec.extract(&document);
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("time"), Some(&json!("03/14/2024 08:05:00")));
        Ok(())
    }
}
