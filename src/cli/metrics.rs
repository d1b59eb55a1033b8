use std::path::PathBuf;

use clap::Parser;

use crate::{metrics::MetricSpec, prelude::*};

#[derive(Parser)]
pub struct MetricsArgs {
    /// TOML file with the `[metrics]` table of field names and query paths.
    ///
    /// The built-in metrics are used when omitted.
    #[clap(long = "metrics-file", env = "METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,
}

impl MetricsArgs {
    pub fn load(&self) -> Result<MetricSpec> {
        let spec = match &self.metrics_file {
            Some(path) => MetricSpec::read_from(path)?,
            None => MetricSpec::builtin()?,
        };
        info!(n_metrics = spec.iter().count(), "loaded the metrics");
        Ok(spec)
    }
}
