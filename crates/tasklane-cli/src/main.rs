use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tasklane_core::app::{HandlerRegistry, Runtime, WorkerBuilder, WorkerGroup};
use tasklane_core::config::{QueueConfig, WorkerConfig};
use tasklane_core::impls::{RedisBroker, SimulatedHandler};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tasklane")]
#[command(about = "Consumes tasks from a Redis work queue", long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Redis URL
    #[arg(long)]
    redis_url: Option<String>,

    /// Queue the tasks are taken from
    #[arg(short, long)]
    input_queue: Option<String>,

    /// List holding the tasks in progress (default: <input>/taken)
    #[arg(long)]
    taken_queue: Option<String>,

    /// Queue receiving the completed tasks
    #[arg(short, long)]
    output_queue: Option<String>,

    /// Enable deduplication with this set
    #[arg(long)]
    dedup_set: Option<String>,

    /// Publish lifecycle events on this channel
    #[arg(long)]
    events_channel: Option<String>,

    /// Seconds a poll may block before looping
    #[arg(long)]
    poll_timeout: Option<u64>,

    /// Number of workers, each with its own connection
    #[arg(short, long)]
    workers: Option<usize>,

    /// Pause between two progress steps of the simulated job
    #[arg(long, default_value_t = 1000)]
    step_interval_ms: u64,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(WorkerConfig, Duration)> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => {
                let input = self
                    .input_queue
                    .clone()
                    .context("either --config or --input-queue is required")?;
                WorkerConfig::new(QueueConfig::new(input))
            }
        };

        if let Some(url) = self.redis_url {
            config.redis.url = url;
        }
        if let Some(input) = self.input_queue {
            config.queues.input = input;
        }
        if let Some(taken) = self.taken_queue {
            config.queues.taken = Some(taken);
        }
        if let Some(output) = self.output_queue {
            config.queues.output = output;
        }
        if let Some(set) = self.dedup_set {
            config.dedup.enabled = true;
            config.dedup.set_name = set;
        }
        if let Some(channel) = self.events_channel {
            config.events.enabled = true;
            config.events.channel = channel;
        }
        if let Some(secs) = self.poll_timeout {
            config.poll_timeout_secs = secs;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }

        config.validate()?;
        Ok((config, Duration::from_millis(self.step_interval_ms)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let (config, step_interval) = Args::parse().into_config()?;

    let mut registry = HandlerRegistry::new();
    registry.set_fallback(Arc::new(
        SimulatedHandler::new().step_interval(step_interval),
    ));
    let runtime = Runtime::new(Arc::new(registry));

    let mut workers = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let broker = RedisBroker::connect(&config.redis.url)
            .await
            .with_context(|| format!("connecting to {}", config.redis.url))?;
        let worker = WorkerBuilder::from_config(Arc::new(broker), &config)
            .runtime(runtime.clone())
            .build()?;
        workers.push(worker);
    }

    let group = WorkerGroup::spawn(workers);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, finishing current work (Ctrl-C again to exit now)");
    group.request_shutdown();

    tokio::select! {
        _ = group.join() => info!("all workers stopped"),
        _ = tokio::signal::ctrl_c() => {
            warn!("exiting without waiting for workers");
            std::process::exit(130);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_without_a_file() {
        let args = Args::parse_from([
            "tasklane",
            "--input-queue",
            "trt/plantA/todo",
            "--dedup-set",
            "trt/plantA/todo-set",
            "--workers",
            "2",
        ]);
        let (config, step) = args.into_config().unwrap();

        assert_eq!(config.queues.input, "trt/plantA/todo");
        assert_eq!(config.queues.taken_queue(), "trt/plantA/todo/taken");
        assert_eq!(config.queues.output, "global/done");
        assert!(config.dedup.enabled);
        assert_eq!(config.dedup.set_name, "trt/plantA/todo-set");
        assert_eq!(config.workers, 2);
        assert_eq!(step, Duration::from_secs(1));
    }

    #[test]
    fn input_queue_is_required_without_a_file() {
        let args = Args::parse_from(["tasklane"]);
        assert!(args.into_config().is_err());
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::parse_from([
            "tasklane",
            "--input-queue",
            "todo",
            "--output-queue",
            "todo",
        ]);
        assert!(args.into_config().is_err());
    }
}
