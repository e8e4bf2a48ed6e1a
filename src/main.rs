mod cli;

use auditbox::config::Config;
use auditbox::observability::Metrics;
use auditbox::payload::FilePayload;
use auditbox::queue::{DocumentStore, FjallDocumentStore, TaskDispatcher, TaskQueue};
use auditbox::server::{self, AppState};
use auditbox::source::{HttpClient, HttpConfig};
use auditbox::storage::ObjectStorage;
use auditbox::task::Task;
use auditbox::worker::{Worker, WorkerContext};
use clap::Parser;
use cli::{Cli, Commands, EnqueueArgs, WorkerArgs};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Worker(args) => run_worker(config, args).await?,
        Commands::Enqueue(args) => enqueue(config, args).await?,
    }

    Ok(())
}

async fn enqueue(config: Config, args: EnqueueArgs) -> Result<(), AnyError> {
    let store = Arc::new(FjallDocumentStore::open(&config.queue.fjall_path)?);
    let queue = TaskQueue::new(store.clone(), &config.queue);

    let task = Task::new(args.title, args.url).with_audits(args.audits);
    let id = queue.send_task(task).await?;
    store.close().await?;

    println!("{}", id);
    Ok(())
}

async fn run_worker(config: Config, args: WorkerArgs) -> Result<(), AnyError> {
    info!(path = %config.queue.fjall_path.display(), "Opening task queue");
    let store = Arc::new(FjallDocumentStore::open(&config.queue.fjall_path)?);
    let queue = Arc::new(TaskQueue::new(store.clone(), &config.queue));
    let metrics = Arc::new(Metrics::new());
    let cancel = CancellationToken::new();

    let storage = Arc::new(ObjectStorage::from_config(&config.storage)?);
    let http = HttpClient::new(HttpConfig::from(&config.fetch))?;
    let sender = Arc::new(FilePayload::with_cancellation(cancel.clone()));

    let ctx = Arc::new(
        WorkerContext::new(
            queue.clone(),
            storage,
            sender,
            http,
            config.worker.work_dir.clone(),
            config.payload.destination.clone(),
        )
        .with_metrics(metrics.clone()),
    );

    let (dispatcher, receivers) = TaskDispatcher::new(
        queue,
        config.worker.num_workers,
        config.worker.channel_size,
        config.queue.poll_limit,
        metrics.clone(),
    );
    let dispatcher = Arc::new(dispatcher);

    let mut handles = Vec::with_capacity(receivers.len());
    for (worker_id, rx) in receivers.into_iter().enumerate() {
        let worker = Worker::new(worker_id, ctx.clone());
        handles.push(tokio::spawn(worker.run(rx, cancel.clone())));
    }

    let poller = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        let interval = config.queue.poll_interval();
        tokio::spawn(async move { dispatcher.run(interval, cancel).await })
    };

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let state = AppState {
        store: store.clone(),
        dispatcher,
        metrics,
    };
    let address = args.address.unwrap_or(config.worker.bind_addr);
    server::serve(address, state, cancel.clone()).await?;

    cancel.cancel();
    poller.await?;
    for handle in handles {
        handle.await?;
    }
    store.close().await?;

    info!("Worker pool stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
