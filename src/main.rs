use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;

use ticket_enricher::config::{QueueConfig, TransportKind, WorkerConfig};
use ticket_enricher::error::QueueError;
use ticket_enricher::inference::create_providers;
use ticket_enricher::pipeline::processor::EnrichmentPipeline;
use ticket_enricher::queue::{MemoryQueue, RabbitMqSubscription};
use ticket_enricher::store::{LibSqlBackend, PersistenceGateway, TicketStore};
use ticket_enricher::worker::{Consumer, WorkerHealth, health_routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("🎫 Ticket Enricher v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Queue: {} ({:?})", config.queue.queue_name, config.queue.transport);
    eprintln!("   Broker: {}", config.queue.redacted_address());
    eprintln!("   Health: http://0.0.0.0:{}/health", config.health.port);
    eprintln!("   Database: {}", config.store.db_path.display());

    // ── Health endpoint ──────────────────────────────────────────────────
    let health = Arc::new(WorkerHealth::new());
    let app = health_routes(Arc::clone(&health));
    let health_port = config.health.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{health_port}")).await?;
    tokio::spawn(async move {
        tracing::info!(port = health_port, "Health server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn TicketStore> = Arc::new(
        LibSqlBackend::new_local(&config.store.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.store.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── Providers & pipeline ─────────────────────────────────────────────
    let providers = create_providers(&config.providers, &config.pipeline, Arc::clone(&store))?;
    health.set_models_loaded(true);
    tracing::info!("Providers ready");

    let gateway = PersistenceGateway::new(Arc::clone(&store), config.pipeline.call_timeout);
    let pipeline = Arc::new(EnrichmentPipeline::new(
        providers,
        gateway,
        config.pipeline.clone(),
    ));
    let consumer = Consumer::new(pipeline, Arc::clone(&health));

    // ── Shutdown signal ──────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing current job");
            let _ = shutdown_tx.send(true);
        }
    });

    // ── Consumer loop ────────────────────────────────────────────────────
    let queue_config = config.queue.clone();
    let consumer_health = Arc::clone(&health);
    let consumer_task = tokio::spawn(async move {
        match queue_config.transport {
            TransportKind::RabbitMq => {
                run_rabbitmq(&consumer, &queue_config, &consumer_health, shutdown_rx).await
            }
            TransportKind::Memory => {
                run_stdin(&consumer, &queue_config, &consumer_health, shutdown_rx).await
            }
        }
    });

    consumer_task.await?;
    tracing::info!("Worker stopped");
    Ok(())
}

/// Consume from RabbitMQ, reconnecting after every connection or channel failure.
async fn run_rabbitmq(
    consumer: &Consumer,
    config: &QueueConfig,
    health: &WorkerHealth,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match RabbitMqSubscription::connect(config).await {
            Ok(mut subscription) => {
                health.set_queue_connected(true);
                let result = consumer.run(&mut subscription, shutdown.clone()).await;
                health.set_queue_connected(false);
                match result {
                    Ok(()) => {
                        if let Err(e) = subscription.close().await {
                            tracing::warn!(error = %e, "Error closing RabbitMQ connection");
                        }
                        return;
                    }
                    Err(e) => tracing::error!(error = %e, "Consumer lost its subscription"),
                }
            }
            Err(e) => tracing::error!(error = %e, "RabbitMQ connection failed"),
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=500));
        let delay = config.reconnect_delay + jitter;
        tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// Feed newline-delimited JSON jobs from stdin through an in-memory queue.
async fn run_stdin(
    consumer: &Consumer,
    config: &QueueConfig,
    health: &WorkerHealth,
    shutdown: watch::Receiver<bool>,
) {
    let queue = MemoryQueue::new(config.queue_name.clone());
    let feeder = queue.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if let Err(e) = feeder.publish(line).await {
                        tracing::warn!(error = %e, "Dropping stdin job");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
        feeder.close().await;
    });

    let mut subscription = queue.subscribe();
    health.set_queue_connected(true);
    match consumer.run(&mut subscription, shutdown).await {
        Ok(()) | Err(QueueError::Closed(_)) => {}
        Err(e) => tracing::error!(error = %e, "Consumer stopped"),
    }
    health.set_queue_connected(false);
}
