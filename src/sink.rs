pub mod influxdb;

use async_trait::async_trait;

use crate::{prelude::*, record::Point};

/// Destination of the measurement points.
#[async_trait]
pub trait PointSink: Send + Sync {
    async fn write(&self, point: &Point) -> Result;
}

/// Prints the points as JSON lines instead of storing them.
///
/// The output is a valid replay input.
pub struct DryRun;

#[async_trait]
impl PointSink for DryRun {
    async fn write(&self, point: &Point) -> Result {
        println!("{}", serde_json::to_string(point)?);
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps the written points in memory.
    #[derive(Default)]
    pub struct Collector(Mutex<Vec<Point>>);

    impl Collector {
        pub fn points(&self) -> Vec<Point> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PointSink for Collector {
        async fn write(&self, point: &Point) -> Result {
            self.0.lock().unwrap().push(point.clone());
            Ok(())
        }
    }

    /// Rejects every point.
    pub struct Failing;

    #[async_trait]
    impl PointSink for Failing {
        async fn write(&self, _point: &Point) -> Result {
            bail!("connection refused")
        }
    }
}
