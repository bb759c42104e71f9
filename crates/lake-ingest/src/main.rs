//! lake-ingest - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use lake_common::logging::{init_logging, LogConfig};
use std::path::Path;
use std::process;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use lake_ingest::arrival::{ArrivalOutcome, S3Event};
use lake_ingest::services::aws::AwsServices;
use lake_ingest::stream::{read_records, ProduceMode};
use lake_ingest::upload::{upload_dataset, UploadOptions};
use lake_ingest::{Cli, Commands, Engine, IngestConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::new("lake-ingest")
        .with_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_directives("aws_config=warn,aws_smithy_runtime=warn,hyper=warn");

    // LAKE_LOG_* variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring LAKE_LOG_* settings: {e:#}");
        log_config
    });

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    };

    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::load(cli.config.as_deref())?;

    if let Commands::Watch { dir, interval } = &cli.command {
        if let Some(dir) = dir {
            config.watch.dir = dir.clone();
        }
        if let Some(interval) = interval {
            config.watch.interval_secs = *interval;
        }
        config.validate()?;
    }

    let services = AwsServices::connect(&config.aws).await.into();
    let cancel = CancellationToken::new();
    let engine = Engine::new(config, services, cancel.clone());

    tokio::spawn(shutdown_signal(cancel.clone()));

    match cli.command {
        Commands::Watch { .. } => {
            info!(dir = %engine.config().watch.dir.display(), "Starting watch loop");
            engine.watcher().start(cancel).await.context("Watch loop task failed")?;
        }

        Commands::Upload {
            path,
            bucket,
            key,
            allow_empty,
        } => {
            let bucket = bucket.unwrap_or_else(|| engine.config().lake.raw_bucket.clone());
            let options = UploadOptions { allow_empty, key };
            let receipt =
                upload_dataset(engine.services().objects.as_ref(), &path, &bucket, &options).await?;
            println!(
                "Uploaded {} ({} bytes) to s3://{}/{}",
                path.display(),
                receipt.size_bytes,
                receipt.bucket,
                receipt.key
            );
        }

        Commands::HandleEvent { file } => {
            let json = read_input(&file).await?;
            let event = S3Event::parse(&json)?;
            let results = engine.arrival_handler().handle_event(&event).await?;

            let mut failed = 0;
            for (key, outcome) in results {
                match outcome {
                    Ok(ArrivalOutcome::Duplicate { original, .. }) => {
                        println!("{key}: duplicate of {original}, removed");
                    }
                    Ok(ArrivalOutcome::Triggered(run)) => {
                        println!("{key}: {}", serde_json::to_string(&run)?);
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{key}: failed: {e}");
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} object(s) could not be processed");
            }
        }

        Commands::Trigger { key } => {
            let run = engine.pipeline().trigger(&key).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }

        Commands::Stream {
            file,
            partition_key,
            batch,
        } => {
            let ingress = engine.stream_ingress();
            let partition_key =
                partition_key.unwrap_or_else(|| engine.config().stream.partition_key.clone());
            let records = read_records(&file, &partition_key)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            ingress.wait_until_ready().await?;

            let mode = if batch { ProduceMode::Batch } else { ProduceMode::Single };
            let report = ingress.produce(&records, mode).await?;
            println!(
                "Sent {} record(s), {} failed, {} resent individually",
                report.sent, report.failed, report.resent
            );
            if report.failed > 0 {
                anyhow::bail!("{} record(s) were not stored", report.failed);
            }
        }

        Commands::WaitActive => {
            let ingress = engine.stream_ingress();
            let stream = ingress.wait_for_stream_active().await?;
            println!(
                "Stream {} is {} after {} poll(s)",
                ingress.settings().stream_name,
                stream.status,
                stream.polls
            );
            if let Some(delivery) = ingress.wait_for_delivery_active().await? {
                println!(
                    "Delivery stream {} is {} after {} poll(s)",
                    ingress.settings().delivery_stream_name.as_deref().unwrap_or_default(),
                    delivery.status,
                    delivery.polls
                );
            }
        }
    }

    Ok(())
}

async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        use tokio::io::AsyncReadExt;
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read stdin")?;
        return Ok(input);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    cancel.cancel();
}
