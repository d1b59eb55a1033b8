use std::{
    fs::File,
    io::{BufRead, BufReader, stdin},
    path::{Path, PathBuf},
};

use clap::Parser;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    cli::{metrics::MetricsArgs, sink::SinkArgs},
    metrics::MetricSpec,
    pipeline::build_point,
    prelude::*,
    record::{Fields, Point},
    sink::PointSink,
};

#[derive(Parser)]
pub struct ReplayArgs {
    /// JSONL file with captured documents or points, `-` for the standard input.
    #[clap(long, env = "REPLAY_FILE", default_value = "-")]
    pub file: PathBuf,

    #[clap(flatten)]
    pub metrics: MetricsArgs,

    #[clap(flatten)]
    pub sink: SinkArgs,
}

impl ReplayArgs {
    pub async fn run(self) -> Result {
        let metrics = self.metrics.load()?;
        let sink = self.sink.connect().await?;
        let n_records = if self.file == Path::new("-") {
            replay(stdin().lock(), &metrics, &self.sink.measurement, sink.as_ref()).await
        } else {
            let file = File::open(&self.file).with_context(|| format!("failed to open `{}`", self.file.display()))?;
            replay(BufReader::new(file), &metrics, &self.sink.measurement, sink.as_ref()).await
        };
        info!(n_records, "loaded");
        Ok(())
    }
}

/// Point previously extracted and printed in the dry-run mode.
#[derive(Deserialize)]
struct ExtractedPoint {
    timestamp: i64,
    fields: Fields,
}

/// Write every line into the sink and return the number of the loaded records.
///
/// Broken lines are logged and skipped, an input error stops the replay.
pub async fn replay(input: impl BufRead, metrics: &MetricSpec, measurement: &str, sink: &dyn PointSink) -> usize {
    let mut n_records = 0;
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                error!(line_number, "failed to read the input: {error:#}");
                break;
            }
        };
        match replay_line(&line, metrics, measurement, sink).await {
            Ok(true) => {
                n_records += 1;
            }
            Ok(false) => {
                trace!(line_number, "empty, skipped");
            }
            Err(error) => {
                error!(line_number, "failed to load the record: {error:#}");
            }
        }
    }
    n_records
}

/// Returns [`false`] when the line has nothing to load.
async fn replay_line(line: &str, metrics: &MetricSpec, measurement: &str, sink: &dyn PointSink) -> Result<bool> {
    if line.trim().is_empty() {
        return Ok(false);
    }
    let value: Value = serde_json::from_str(line).context("invalid JSON")?;
    if is_empty(&value) {
        return Ok(false);
    }
    let point = if is_extracted_point(&value) {
        let ExtractedPoint { timestamp, fields } = serde_json::from_value(value).context("invalid point")?;
        let fields = fields.into_iter().filter(|(name, _)| metrics.contains(name)).collect();
        Point { measurement: measurement.to_owned(), timestamp, fields }
    } else {
        build_point(measurement, metrics, &value)?
    };
    debug!(point.timestamp, fields = %point.fields, "replaying…");
    sink.write(&point).await?;
    Ok(true)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(value) => !value,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
    }
}

/// Raw SEMS documents have neither of these at the top level.
fn is_extracted_point(value: &Value) -> bool {
    value.get("timestamp").is_some() && value.get("fields").is_some()
}
