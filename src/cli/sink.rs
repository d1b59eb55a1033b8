use clap::{Parser, ValueEnum};
use reqwest::Url;

use crate::{
    prelude::*,
    sink::{
        DryRun,
        PointSink,
        influxdb::{Client, Target},
    },
};

pub const DEFAULT_MEASUREMENT: &str = "sems";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum InfluxApi {
    /// InfluxDB 1.x: database.
    V1,

    /// InfluxDB 2.x: organization, bucket, and token.
    V2,
}

#[derive(Parser)]
pub struct SinkArgs {
    /// Do not write to InfluxDB, print the points as JSON lines instead.
    #[clap(long)]
    pub dry_run: bool,

    #[clap(long = "influxdb-url", env = "INFLUXDB_URL", default_value = "http://localhost:8086")]
    pub url: Url,

    #[clap(long = "influxdb-api", env = "INFLUXDB_API", value_enum, default_value = "v2")]
    pub api: InfluxApi,

    #[clap(long = "influxdb-token", env = "INFLUXDB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[clap(long = "influxdb-organization", env = "INFLUXDB_ORGANIZATION")]
    pub organization: Option<String>,

    #[clap(long = "influxdb-bucket", env = "INFLUXDB_BUCKET")]
    pub bucket: Option<String>,

    #[clap(long = "influxdb-database", env = "INFLUXDB_DATABASE")]
    pub database: Option<String>,

    #[clap(long = "influxdb-measurement", env = "INFLUXDB_MEASUREMENT", default_value = DEFAULT_MEASUREMENT)]
    pub measurement: String,
}

impl SinkArgs {
    /// Connect to the sink, failing when InfluxDB is not reachable.
    pub async fn connect(&self) -> Result<Box<dyn PointSink>> {
        if self.dry_run {
            info!("dry run, the points will be printed");
            return Ok(Box::new(DryRun));
        }
        Ok(Box::new(Client::connect(self.url.clone(), self.target()?).await?))
    }

    fn target(&self) -> Result<Target> {
        let target = match self.api {
            InfluxApi::V1 => Target::V1 {
                database: self.database.clone().context("`--influxdb-database` is required for InfluxDB 1.x")?,
            },
            InfluxApi::V2 => Target::V2 {
                organization: self
                    .organization
                    .clone()
                    .context("`--influxdb-organization` is required for InfluxDB 2.x")?,
                bucket: self.bucket.clone().context("`--influxdb-bucket` is required for InfluxDB 2.x")?,
                token: self.token.clone().context("`--influxdb-token` is required for InfluxDB 2.x")?,
            },
        };
        Ok(target)
    }
}
