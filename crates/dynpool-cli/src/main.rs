use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynpool::{CredentialPool, MySqlConnector, PoolConfig};
use dynpool_broker::{Broker, CredentialSource};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dynpool")]
#[command(about = "Credential-rotating connection pool operator tool")]
#[command(author, version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a pool from the environment and lease connections in a loop,
    /// reporting which credential generation served each lease.
    Probe {
        /// Leases per worker.
        #[arg(long, default_value_t = 20)]
        iterations: u64,

        /// Pause between two leases of one worker, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Concurrent workers.
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Perform one broker round trip and report the issued credential.
    Fetch {
        /// Print the issued username instead of its length.
        #[arg(long, default_value_t = false)]
        show_username: bool,
    },
}

#[derive(Default)]
struct Metrics {
    leased: AtomicU64,
    errors: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Probe {
            iterations,
            interval_ms,
            concurrency,
        } => probe(iterations, Duration::from_millis(interval_ms), concurrency).await,
        Command::Fetch { show_username } => fetch(show_username).await,
    }
}

async fn probe(iterations: u64, interval: Duration, concurrency: usize) -> Result<()> {
    let broker = Broker::from_env().context("broker configuration")?;
    let config = PoolConfig::from_env().context("pool configuration")?;
    let pool = CredentialPool::connect(config, Arc::new(broker), MySqlConnector)
        .await
        .context("building credential pool")?;

    println!(
        "Probing: workers={concurrency}, iterations={iterations}, interval={}ms",
        interval.as_millis()
    );

    let metrics = Arc::new(Metrics::default());
    let started = Instant::now();
    let workers = (0..concurrency.max(1)).map(|worker| {
        let pool = pool.clone();
        let metrics = Arc::clone(&metrics);
        async move {
            for i in 0..iterations {
                match pool.acquire().await {
                    Ok(conn) => {
                        info!(worker, iteration = i, generation = conn.generation_id(), "leased connection");
                        metrics.leased.fetch_add(1, Ordering::Relaxed);
                        pool.release(conn).await;
                    }
                    Err(e) => {
                        warn!(worker, iteration = i, error = %e, "acquire failed");
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                tokio::time::sleep(interval).await;
            }
        }
    });
    futures::future::join_all(workers).await;

    let status = pool.status().await;
    println!(
        "Done in {:.1}s: leased={}, errors={}, refreshes={}, generation={}, idle={}",
        started.elapsed().as_secs_f64(),
        metrics.leased.load(Ordering::Relaxed),
        metrics.errors.load(Ordering::Relaxed),
        pool.refresh_count().await,
        status.id,
        status.idle,
    );
    pool.close().await;
    Ok(())
}

async fn fetch(show_username: bool) -> Result<()> {
    let broker = Broker::from_env().context("broker configuration")?;
    let credential = broker
        .fetch_credential()
        .await
        .context("fetching dynamic credential")?;

    if show_username {
        println!("username: {}", credential.username());
    } else {
        println!("username: <{} bytes>", credential.username().len());
    }
    println!("password: <{} bytes>", credential.password().len());
    Ok(())
}
