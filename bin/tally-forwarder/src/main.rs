//! Forwards samples read from standard input to a StatsD endpoint.
//!
//! Each line of input is one JSON-encoded sample, such as `{"metric":"vus","value":10,"kind":"gauge"}`. Samples are
//! buffered and pushed on the configured interval until input ends or the process is interrupted, at which point
//! anything still pending is flushed before exiting.

use std::path::{Path, PathBuf};

use clap::Parser;
use tally_app::prelude::*;
use tally_config::{ConfigurationLoader, GenericConfiguration};
use tally_error::{ErrorContext as _, GenericError};
use tally_statsd::{CollectorHandle, Sample, StatsdCollector, StatsdConfiguration};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt as _, BufReader},
    select,
    sync::oneshot,
};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(about)]
struct Cli {
    /// Path to the YAML configuration file.
    ///
    /// A missing file is not an error. Every setting can also be given through `TALLY_`-prefixed environment
    /// variables, which take precedence over the file.
    #[arg(long, default_value = "tally.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let configuration = match load_configuration(&cli.config) {
        Ok(configuration) => configuration,
        Err(e) => fatal_and_exit(format!("failed to load configuration: {}", e)),
    };

    let logging_config = match LoggingConfiguration::from_configuration(&configuration) {
        Ok(config) => config,
        Err(e) => fatal_and_exit(format!("invalid logging configuration: {}", e)),
    };
    if let Err(e) = initialize_logging(&logging_config) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    match run(&configuration).await {
        Ok(()) => info!("Forwarder stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

fn load_configuration(path: &Path) -> Result<GenericConfiguration, GenericError> {
    let configuration = ConfigurationLoader::default()
        .try_from_yaml(path)
        .from_environment("tally")?
        .into_generic();
    Ok(configuration)
}

async fn run(configuration: &GenericConfiguration) -> Result<(), GenericError> {
    let statsd_config = StatsdConfiguration::from_configuration(configuration)?;

    let mut collector = StatsdCollector::new(statsd_config);
    collector.init().error_context("Failed to initialize StatsD collector.")?;

    info!(link = collector.link(), "Forwarding samples from standard input...");

    let handle = collector.handle();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let collector_task = tokio::spawn(async move {
        collector
            .run(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let input_result = select! {
        result = read_samples(&handle) => {
            info!("Reached end of input. Stopping...");
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Stopping...");
            Ok(())
        }
    };

    // Pending samples are flushed even when reading input failed.
    let _ = shutdown_tx.send(());
    collector_task.await.error_context("Collector task failed.")??;

    input_result.error_context("Failed to read samples from standard input.")
}

async fn read_samples(handle: &CollectorHandle) -> io::Result<()> {
    let accepted = forward_lines(BufReader::new(io::stdin()), |sample| handle.collect([[sample]])).await?;
    debug!(accepted, "Finished reading samples.");
    Ok(())
}

/// Parses each non-blank line of `reader` as a JSON sample and hands it to `submit`, skipping lines that do not parse.
///
/// Returns the number of samples submitted.
async fn forward_lines<R, F>(reader: R, mut submit: F) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(Sample),
{
    let mut accepted = 0;
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Sample>(line) {
            Ok(sample) => {
                submit(sample);
                accepted += 1;
            }
            Err(e) => warn!(error = %e, "Skipping invalid sample."),
        }
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use tally_statsd::MetricKind;

    use super::*;

    #[tokio::test]
    async fn invalid_and_blank_lines_are_skipped() {
        let input = concat!(
            "{\"metric\":\"vus\",\"value\":10,\"kind\":\"gauge\"}\n",
            "\n",
            "not json\n",
            "{\"metric\":\"vus\",\"value\":1,\"kind\":\"histogram\"}\n",
            "  {\"metric\":\"http_req_duration\",\"value\":0.4,\"type\":\"timing\",\"tags\":{\"name\":\"home\"}}  \n",
            "{\"metric\":\"checks\",\"value\":0,\"kind\":\"rate\"}",
        );

        let mut samples = Vec::new();
        let accepted = forward_lines(BufReader::new(input.as_bytes()), |sample| samples.push(sample))
            .await
            .unwrap();

        assert_eq!(accepted, 3);
        assert_eq!(
            samples,
            vec![
                Sample::gauge("vus", 10.0),
                Sample::trend("http_req_duration", 0.4).with_tag("name", "home"),
                Sample::rate("checks", 0.0),
            ]
        );
        assert_eq!(samples[1].kind(), MetricKind::Trend);
    }

    #[tokio::test]
    async fn empty_input_submits_nothing() {
        let accepted = forward_lines(BufReader::new(&b""[..]), |_| panic!("nothing to submit"))
            .await
            .unwrap();
        assert_eq!(accepted, 0);
    }
}
