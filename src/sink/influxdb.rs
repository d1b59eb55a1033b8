//! InfluxDB HTTP API client, both 1.x and 2.x.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, Url, header::AUTHORIZATION};
use serde::Deserialize;

use crate::{prelude::*, record::Point, sink::PointSink};

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum Target {
    /// InfluxDB 1.x database, created when missing.
    V1 { database: String },

    /// InfluxDB 2.x bucket.
    V2 { organization: String, bucket: String, token: String },
}

pub struct Client {
    inner: reqwest::Client,
    url: Url,
    target: Target,
}

impl Client {
    /// Connect and make sure the server is ready to accept the points.
    ///
    /// The endpoints are resolved relative to `url`, so InfluxDB may sit behind a path prefix.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(mut url: Url, target: Target) -> Result<Self> {
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        let inner = reqwest::Client::builder().user_agent("sems-influx").timeout(TIMEOUT).build()?;
        let this = Self { inner, url, target };
        this.check_readiness().await.with_context(|| format!("failed to connect to InfluxDB at `{}`", this.url))?;
        Ok(this)
    }

    async fn check_readiness(&self) -> Result {
        match &self.target {
            Target::V1 { database } => {
                let response = self.inner.get(self.endpoint("ping")?).send().await?;
                ensure_success(response).await?;
                let query = format!(r#"CREATE DATABASE "{}""#, database.replace('"', r#"\""#));
                let response = self.inner.post(self.endpoint("query")?).query(&[("q", query)]).send().await?;
                ensure_success(response).await?;
                info!(database = database.as_str(), "connected");
            }
            Target::V2 { .. } => {
                #[derive(Deserialize)]
                struct Readiness {
                    status: String,

                    #[serde(rename = "up")]
                    uptime: Option<String>,
                }

                let response = self.inner.get(self.endpoint("ready")?).send().await?;
                let readiness: Readiness = ensure_success(response).await?.json().await?;
                ensure!(readiness.status == "ready", "InfluxDB is `{}`", readiness.status);
                info!(uptime = readiness.uptime.as_deref(), "connected");
            }
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.url.join(path).with_context(|| format!("invalid InfluxDB URL `{}`", self.url))
    }
}

#[async_trait]
impl PointSink for Client {
    #[instrument(skip_all, fields(timestamp = point.timestamp))]
    async fn write(&self, point: &Point) -> Result {
        let body = point.to_line_protocol()?;
        let request = match &self.target {
            Target::V1 { database } => self
                .inner
                .post(self.endpoint("write")?)
                .query(&[("db", database.as_str()), ("precision", "s")]),
            Target::V2 { organization, bucket, token } => self
                .inner
                .post(self.endpoint("api/v2/write")?)
                .query(&[("org", organization.as_str()), ("bucket", bucket.as_str()), ("precision", "s")])
                .header(AUTHORIZATION, format!("Token {token}")),
        };
        let response = request.body(body).send().await.context("failed to call InfluxDB")?;
        ensure_success(response).await.context("InfluxDB refused the point")?;
        debug!("written");
        Ok(())
    }
}

/// Fail on an unsuccessful status, keeping InfluxDB's error message.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        bail!("`{status}`: {}", body.trim())
    }
}
