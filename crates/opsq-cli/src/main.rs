mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsq_core::app::{App, AppBuilder};
use opsq_core::config::OpsConfig;
use opsq_core::typed::JobPayload;
use opsq_core::{HealthReport, HealthViews, InMemoryJobStore, JobStore, OpsStore};
use serde_json::json;
use tracing::info;

use handlers::*;

/// opsq - lease-based job queue
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file (defaults apply to missing fields)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker concurrency override
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Lease timeout override (minutes)
    #[arg(long, global = true)]
    lease_minutes: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an in-process engine against the in-memory store and print a health report
    Demo {
        /// Number of jobs to enqueue
        #[arg(short, long, default_value_t = 40)]
        jobs: u64,

        /// Every Nth enrichment job fails once (0 disables)
        #[arg(long, default_value_t = 5)]
        fail_every: u64,

        /// Give up waiting for the queue to drain after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Print the health views as JSON
    #[cfg(feature = "postgres")]
    Health {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Run one reaper sweep
    #[cfg(feature = "postgres")]
    Reap {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Create the ops schema
    #[cfg(feature = "postgres")]
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Enqueue one job
    #[cfg(feature = "postgres")]
    Enqueue {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        #[arg(long)]
        job_type: String,
        /// JSON object
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },

    /// Run workers, heartbeat and reaper until Ctrl-C
    #[cfg(feature = "postgres")]
    Work {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

fn load_config(cli: &Cli) -> Result<OpsConfig> {
    let mut config = match &cli.config {
        Some(path) => OpsConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => OpsConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.worker.concurrency = workers;
    }
    if let Some(minutes) = cli.lease_minutes {
        config.worker.lease_timeout_minutes = minutes;
        config.reaper.lease_timeout_minutes = minutes;
    }
    Ok(config)
}

fn build_app(fail_every: u64) -> Result<App> {
    let app = AppBuilder::new()
        .register::<Ingestion, _>(IngestionHandler)?
        .register::<Enrichment, _>(EnrichmentHandler { fail_every })?
        .register::<Escalation, _>(EscalationHandler)?
        .register::<SkipTrace, _>(SkipTraceHandler)?
        .expect_job_types(&JOB_TYPES)
        .build()?;
    Ok(app)
}

fn print_report(report: &HealthReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn seed(store: &dyn OpsStore, jobs: u64) -> Result<()> {
    for n in 0..jobs {
        let (job_type, payload, priority) = match n % 4 {
            0 => (Ingestion::TYPE, json!({"source": format!("feed-{n}"), "rows": n % 50}), 0),
            1 => (Enrichment::TYPE, json!({"record_id": n}), 0),
            2 => (Escalation::TYPE, json!({"case_id": n, "severity": "high"}), 10),
            _ => {
                let subject = if n % 12 == 3 { "unknown".to_string() } else { format!("subject-{n}") };
                (SkipTrace::TYPE, json!({"subject": subject}), 0)
            }
        };
        store.queue_job(job_type, payload, priority, None).await?;
    }
    Ok(())
}

async fn demo(config: OpsConfig, jobs: u64, fail_every: u64, timeout: Duration) -> Result<()> {
    let store: Arc<dyn OpsStore> = Arc::new(
        InMemoryJobStore::new(config.queue.clone())
            .with_reap_requeue_delay(config.reaper.requeue_delay()),
    );
    let app = build_app(fail_every)?;
    seed(store.as_ref(), jobs).await?;
    info!(jobs, "seeded demo jobs");

    let group = app.spawn(Arc::clone(&store), &config);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let report = store
            .health(config.worker.lease_timeout_minutes, &config.liveness)
            .await?;
        let busy = report
            .depth_by_type
            .values()
            .any(|d| d.pending > 0 || d.processing > 0);
        if !busy || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    group.shutdown_and_join().await;

    let report = store
        .health(config.worker.lease_timeout_minutes, &config.liveness)
        .await?;
    print_report(&report)
}

#[cfg(feature = "postgres")]
async fn connect(database_url: &str, config: &OpsConfig) -> Result<opsq_core::impls::PostgresJobStore> {
    let store = opsq_core::impls::PostgresJobStore::connect(database_url, config.queue.clone())
        .await
        .context("connecting to postgres")?
        .with_reap_requeue_delay(config.reaper.requeue_delay());
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    opsq_core::observability::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Demo {
            jobs,
            fail_every,
            timeout_secs,
        } => demo(config, jobs, fail_every, Duration::from_secs(timeout_secs)).await,

        #[cfg(feature = "postgres")]
        Command::Health { database_url } => {
            let store = connect(&database_url, &config).await?;
            let report = store
                .health(config.reaper.lease_timeout_minutes, &config.liveness)
                .await?;
            print_report(&report)
        }

        #[cfg(feature = "postgres")]
        Command::Reap { database_url } => {
            let store = connect(&database_url, &config).await?;
            let reaped = store.reap_stuck_jobs(config.reaper.lease_timeout_minutes).await?;
            println!("{}", json!({ "reaped": reaped }));
            Ok(())
        }

        #[cfg(feature = "postgres")]
        Command::Migrate { database_url } => {
            connect(&database_url, &config).await?.migrate().await?;
            info!("ops schema is up to date");
            Ok(())
        }

        #[cfg(feature = "postgres")]
        Command::Enqueue {
            database_url,
            job_type,
            payload,
            priority,
        } => {
            let store = connect(&database_url, &config).await?;
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let id = store.queue_job(&job_type, payload, priority, None).await?;
            println!("{}", json!({ "id": id.to_string() }));
            Ok(())
        }

        #[cfg(feature = "postgres")]
        Command::Work { database_url } => {
            let store: Arc<dyn OpsStore> = Arc::new(connect(&database_url, &config).await?);
            let app = build_app(0)?;
            let group = app.spawn(store, &config);
            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            group.shutdown_and_join().await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsq_core::config::QueueConfig;
    use opsq_core::domain::LivenessThresholds;

    #[test]
    fn demo_app_handles_every_job_type() {
        let app = build_app(0).unwrap();
        let mut expected: Vec<String> = JOB_TYPES.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(app.job_types(), expected);
    }

    #[tokio::test]
    async fn seed_spreads_jobs_across_types() {
        let store = InMemoryJobStore::new(QueueConfig::default());
        seed(&store, 8).await.unwrap();

        let report = store.health(5, &LivenessThresholds::default()).await.unwrap();
        for job_type in JOB_TYPES {
            assert_eq!(report.depth_by_type[job_type].pending, 2, "{job_type}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn demo_drains_the_seeded_queue() {
        let mut config = OpsConfig::default();
        config.worker.concurrency = 2;
        config.worker.poll_interval_ms = 10;
        demo(config, 8, 0, Duration::from_secs(20)).await.unwrap();
    }
}
