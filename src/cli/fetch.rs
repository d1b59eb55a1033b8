use clap::Parser;

use crate::{
    cli::{metrics::MetricsArgs, sems::SemsArgs, sink::DEFAULT_MEASUREMENT},
    pipeline::build_point,
    prelude::*,
};

#[derive(Parser)]
pub struct FetchArgs {
    /// Print the extracted point instead of the raw document.
    #[clap(long)]
    pub extract: bool,

    #[clap(long = "influxdb-measurement", env = "INFLUXDB_MEASUREMENT", default_value = DEFAULT_MEASUREMENT)]
    pub measurement: String,

    #[clap(flatten)]
    pub sems: SemsArgs,

    #[clap(flatten)]
    pub metrics: MetricsArgs,
}

impl FetchArgs {
    pub async fn run(self) -> Result {
        let metrics = if self.extract { Some(self.metrics.load()?) } else { None };
        let mut api = self.sems.new_client()?;
        api.login().await?;
        let document = api.get_plant_details(&self.sems.plant_id, self.sems.max_token_retries).await?;
        let output = match metrics {
            Some(metrics) => serde_json::to_string_pretty(&build_point(&self.measurement, &metrics, &document)?)?,
            None => serde_json::to_string_pretty(&document)?,
        };
        println!("{output}");
        Ok(())
    }
}
