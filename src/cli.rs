mod fetch;
mod metrics;
mod poll;
mod replay;
mod sems;
mod sink;

use clap::{Parser, Subcommand};

use crate::{
    cli::{fetch::FetchArgs, poll::PollArgs, replay::ReplayArgs},
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// Log the extracted records and the HTTP calls.
    #[clap(long, env = "DEBUG", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: periodically fetch the plant details and write them into InfluxDB.
    #[clap(name = "poll")]
    Poll(Box<PollArgs>),

    /// Load the captured documents or points from a JSONL file into InfluxDB.
    #[clap(name = "replay")]
    Replay(Box<ReplayArgs>),

    /// Fetch the plant details once and print them.
    #[clap(name = "fetch")]
    Fetch(Box<FetchArgs>),
}

impl Command {
    pub async fn run(self) -> Result {
        match self {
            Self::Poll(args) => args.run().await,
            Self::Replay(args) => args.run().await,
            Self::Fetch(args) => args.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use clap::CommandFactory;

    use super::*;
    use crate::{api::sems::LOGIN_URL, cli::sink::InfluxApi};

    const SEMS_ARGS: [&str; 6] = [
        "--sems-username",
        "visitor@example.com",
        "--sems-password",
        "secret",
        "--sems-plant-id",
        "plant-1",
    ];

    fn parse(subcommand: &str, args: &[&str]) -> Result<Command> {
        let command = ["sems-influx", subcommand];
        Ok(Args::try_parse_from(command.iter().chain(args))?.command)
    }

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_replay_defaults_ok() -> Result {
        let Command::Replay(args) = parse("replay", &[])? else {
            panic!("expected `replay`");
        };
        assert_eq!(args.file, Path::new("-"));
        assert_eq!(args.metrics.metrics_file, None);
        assert!(!args.sink.dry_run);
        assert_eq!(args.sink.api, InfluxApi::V2);
        assert_eq!(args.sink.url.as_str(), "http://localhost:8086/");
        assert_eq!(args.sink.measurement, "sems");
        Ok(())
    }

    #[test]
    fn parse_replay_files_ok() -> Result {
        let Command::Replay(args) =
            parse("replay", &["--dry-run", "--metrics-file", "metrics.toml", "--file", "data.jsonl"])?
        else {
            panic!("expected `replay`");
        };
        assert_eq!(args.file, Path::new("data.jsonl"));
        assert_eq!(args.metrics.metrics_file.as_deref(), Some(Path::new("metrics.toml")));
        assert!(args.sink.dry_run);
        Ok(())
    }

    #[test]
    fn parse_poll_defaults_ok() -> Result {
        let Command::Poll(args) = parse("poll", &SEMS_ARGS)? else {
            panic!("expected `poll`");
        };
        assert_eq!(*args.polling_interval, Duration::from_secs(300));
        assert_eq!(args.capture_dir, None);
        assert_eq!(args.sems.username, "visitor@example.com");
        assert_eq!(args.sems.password, "secret");
        assert_eq!(args.sems.plant_id, "plant-1");
        assert_eq!(args.sems.login_url.as_str(), LOGIN_URL);
        assert_eq!(args.sems.max_token_retries, 2);
        assert_eq!(args.sink.api, InfluxApi::V2);
        Ok(())
    }

    #[test]
    fn parse_poll_ok() -> Result {
        let mut args = SEMS_ARGS.to_vec();
        args.extend([
            "--polling-interval",
            "1min 30s",
            "--capture-dir",
            "captures",
            "--metrics-file",
            "metrics.toml",
            "--sems-max-token-retries",
            "0",
            "--influxdb-api",
            "v1",
            "--influxdb-database",
            "solar",
        ]);
        let Command::Poll(args) = parse("poll", &args)? else {
            panic!("expected `poll`");
        };
        assert_eq!(*args.polling_interval, Duration::from_secs(90));
        assert_eq!(args.capture_dir.as_deref(), Some(Path::new("captures")));
        assert_eq!(args.metrics.metrics_file.as_deref(), Some(Path::new("metrics.toml")));
        assert_eq!(args.sems.max_token_retries, 0);
        assert_eq!(args.sink.api, InfluxApi::V1);
        assert_eq!(args.sink.database.as_deref(), Some("solar"));
        Ok(())
    }

    #[test]
    fn parse_poll_requires_credentials() {
        assert!(Args::try_parse_from(["sems-influx", "poll", "--sems-plant-id", "plant-1"]).is_err());
    }

    #[test]
    fn parse_fetch_ok() -> Result {
        let Command::Fetch(args) = parse("fetch", &SEMS_ARGS)? else {
            panic!("expected `fetch`");
        };
        assert!(!args.extract);
        assert_eq!(args.measurement, "sems");
        assert_eq!(args.sems.max_token_retries, 2);
        assert_eq!(args.metrics.metrics_file, None);

        let mut extract_args = SEMS_ARGS.to_vec();
        extract_args.extend(["--extract", "--metrics-file", "metrics.toml"]);
        let Command::Fetch(args) = parse("fetch", &extract_args)? else {
            panic!("expected `fetch`");
        };
        assert!(args.extract);
        assert_eq!(args.metrics.metrics_file.as_deref(), Some(Path::new("metrics.toml")));
        Ok(())
    }

    #[test]
    fn parse_global_debug_ok() -> Result {
        let args = Args::try_parse_from(["sems-influx", "replay", "--debug"])?;
        assert!(args.debug);
        Ok(())
    }
}
