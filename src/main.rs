#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod capture;
mod cli;
mod metrics;
mod normalize;
mod pipeline;
mod prelude;
mod query;
mod record;
mod sink;

use clap::{Parser, crate_version};

use crate::{cli::Args, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_writer(std::io::stderr)
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();
    info!(version = crate_version!(), "starting…");

    args.command.run().await?;

    info!("done!");
    Ok(())
}
