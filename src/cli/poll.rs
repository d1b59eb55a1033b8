use std::{path::PathBuf, time::Duration};

use bon::Builder;
use clap::Parser;
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    api::sems,
    capture::Capture,
    cli::{metrics::MetricsArgs, sems::SemsArgs, sink::SinkArgs},
    metrics::MetricSpec,
    pipeline::build_point,
    prelude::*,
    record::Point,
    sink::PointSink,
};

#[derive(Parser)]
pub struct PollArgs {
    #[clap(long, env = "POLLING_INTERVAL", default_value = "5min")]
    pub polling_interval: humantime::Duration,

    /// Append every fetched document to `<capture-dir>/<date>.jsonl`, for a later replay.
    #[clap(long, env = "CAPTURE_DIR")]
    pub capture_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub sems: SemsArgs,

    #[clap(flatten)]
    pub metrics: MetricsArgs,

    #[clap(flatten)]
    pub sink: SinkArgs,
}

impl PollArgs {
    pub async fn run(self) -> Result {
        let metrics = self.metrics.load()?;
        let capture = self.capture_dir.map(Capture::new).transpose()?;
        let sink = self.sink.connect().await?;
        Poller::builder()
            .api(self.sems.new_client()?)
            .plant_id(self.sems.plant_id)
            .max_token_retries(self.sems.max_token_retries)
            .metrics(metrics)
            .measurement(self.sink.measurement)
            .sink(sink)
            .maybe_capture(capture)
            .interval(self.polling_interval)
            .build()
            .run()
            .await
    }
}

#[derive(Builder)]
struct Poller {
    api: sems::Api,

    #[builder(into)]
    plant_id: String,

    max_token_retries: u32,
    metrics: MetricSpec,

    #[builder(into)]
    measurement: String,

    sink: Box<dyn PointSink>,
    capture: Option<Capture>,

    #[builder(into)]
    interval: Duration,
}

impl Poller {
    /// Poll forever, the first tick happens right away.
    async fn run(mut self) -> Result {
        let mut interval = interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(error) = self.tick().await {
                error!("failed to poll: {error:#}");
            }
        }
    }

    #[instrument(skip_all, fields(plant_id = self.plant_id.as_str()))]
    async fn tick(&mut self) -> Result<Point> {
        let document = self
            .api
            .get_plant_details(&self.plant_id, self.max_token_retries)
            .await
            .context("failed to fetch the plant details")?;
        if let Some(capture) = &self.capture
            && let Err(error) = capture.append(&document)
        {
            warn!("failed to capture the document: {error:#}");
        }
        let point = build_point(&self.measurement, &self.metrics, &document)?;
        self.sink.write(&point).await.context("failed to write the point")?;
        info!(point.timestamp, fields = %point.fields, "written");
        Ok(point)
    }
}
