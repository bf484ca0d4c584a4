// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use home_sensors_common::analysis::Report;
use home_sensors_common::clock::SystemClock;
use home_sensors_common::sampler::Sampler;
use home_sensors_common::uploader::{FlushReport, HttpTransport};
use home_sensors_common::{sensor, Config, DataLocation, Recorder};

#[derive(Parser)]
#[command(name = "sensor-client")]
#[command(about = "Samples a home sensor, keeps the readings and uploads them", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Sample the sensor, record the reading and upload everything queued (default)
    Record,
    /// Upload queued readings only
    Flush,
    /// Print the number of readings waiting for upload
    Status,
    /// Print averages, daily ranges and rejected readings
    Report,
    /// Convert the resistance column of day files from Ω to kΩ
    Rescale {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },
}

/// Our App struct holds the configuration and the recorder built from it.
struct App {
    config: Config,
    recorder: Recorder,
}

impl App {
    fn new(config: Config) -> Self {
        let recorder = Recorder::from_config(&config);
        Self { config, recorder }
    }

    fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Record => self.record(),
            Command::Flush => self.flush().map(|_| ()),
            Command::Status => {
                println!("{}", self.recorder.pending()?);
                Ok(())
            }
            Command::Report => {
                let report = Report::build(
                    self.recorder.location(),
                    &self.config,
                    chrono::Local::now().date_naive(),
                )?;
                print!("{report}");
                Ok(())
            }
            Command::Rescale { files } => rescale(&files),
        }
    }

    /// Takes one settled measurement and records it, even a partial one.
    fn record(&self) -> anyhow::Result<()> {
        let mut sensor = sensor::open(&self.config).context("Cannot open the sensor")?;
        let sampler = Sampler::from_config(&self.config);

        let started = chrono::Local::now();
        let measurement = sampler.sample(sensor.as_mut(), &mut SystemClock::new());
        if measurement.sensor_timeout() {
            log::warn!("Sensor timed out, recording the reading without climate values");
        }

        let reading = measurement.into_reading(started, &self.config.location);
        log::info!(
            "Measurements {} {:?}°C {:?}% {:?} hPa {:?} kΩ",
            reading.iso_time_string(),
            reading.temperature,
            reading.humidity,
            reading.pressure,
            reading.resistance
        );
        self.recorder.record(&reading)?;

        self.flush().map(|_| ())
    }

    /// Uploads the queue; an unreachable collector is not an error.
    fn flush(&self) -> anyhow::Result<FlushReport> {
        let Some(url) = &self.config.collector_url else {
            log::info!(
                "No collector configured, {} readings stay queued",
                self.recorder.pending()?
            );
            return Ok(FlushReport {
                pending: self.recorder.pending()?,
                ..Default::default()
            });
        };

        let transport = HttpTransport::new(url.as_str(), self.config.request_timeout());
        let report = self.recorder.flush(&transport)?;
        if let Some(failure) = &report.failure {
            log::warn!("Upload to {url} stopped, {} pending: {failure}", report.pending);
        }

        Ok(report)
    }
}

fn rescale(files: &[PathBuf]) -> anyhow::Result<()> {
    for file in files {
        let lines = DataLocation::rescale_resistance(file)
            .with_context(|| format!("Cannot rescale {}", file.display()))?;
        log::info!("Rewrote {lines} lines of {}", file.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let command = args.command.unwrap_or(Command::Record);
    if let Command::Rescale { files } = &command {
        return rescale(files);
    }

    let config_path = args.config.context("--config is required for this command")?;
    let config = Config::load(&config_path)?;

    App::new(config).run(command)
}
