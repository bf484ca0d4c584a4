// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

//! Receives readings POSTed by `sensor-client` and appends them to day logs.
//!
//! ## Environment Variables
//! - `SENSOR_COLLECTOR_BIND`: Address to listen on (default: 127.0.0.1:8080)
//! - `SENSOR_COLLECTOR_DATA`: Directory of the day logs

mod routes;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use home_sensors_common::DataLocation;

#[derive(Parser)]
#[command(name = "sensor-collector")]
#[command(about = "Collects home sensor readings over HTTP", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080", env = "SENSOR_COLLECTOR_BIND")]
    bind: SocketAddr,

    /// Directory the day logs are written to
    #[arg(short, long, env = "SENSOR_COLLECTOR_DATA")]
    data_directory: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let location = DataLocation::new(&args.data_directory);
    let app = routes::create_router(location);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Cannot listen on {}", args.bind))?;
    log::info!(
        "Collecting on http://{}/data into {}",
        args.bind,
        args.data_directory.display()
    );

    axum::serve(listener, app).await?;
    Ok(())
}
