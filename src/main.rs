use anyhow::{anyhow, Context};
use objsync::config::{exit_code, FileConfig, Invocation};
use objsync::store::DirObjectStore;
use objsync::transfer::{PooledTransferManager, TransferConfig};
use objsync::ActionArchitecture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let invocation = Invocation::parse();
    init_logging(invocation.cli.debug);

    let file_config = match &invocation.cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let params = invocation.parameters(&file_config)?;

    let store_root = invocation
        .cli
        .store_root
        .clone()
        .or_else(|| file_config.store_root.clone())
        .ok_or_else(|| anyhow!("no object store configured: pass --store-root or set store_root in --config"))?;
    let store = DirObjectStore::new(&store_root)
        .with_context(|| format!("cannot open object store at {}", store_root.display()))?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let transfer_manager = PooledTransferManager::new(TransferConfig {
        max_concurrent_requests: file_config
            .max_concurrent_requests
            .unwrap_or(TransferConfig::default().max_concurrent_requests),
        ..TransferConfig::default()
    })?
    .with_cancellation(Arc::clone(&cancelled));
    watch_ctrl_c(Arc::clone(&cancelled));

    tracing::debug!(command = %params.command, src = %params.src, dest = %params.dest, "starting");
    let result = ActionArchitecture::new(params, Arc::new(store), Arc::new(transfer_manager))
        .with_cancellation(cancelled)
        .run();

    std::process::exit(exit_code(&result));
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("objsync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set `cancelled` on the first ctrl-c; running transfers stop at their next chunk.
fn watch_ctrl_c(cancelled: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("objsync-ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(error = %err, "ctrl-c handler unavailable");
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "ctrl-c handler unavailable");
    }
}
