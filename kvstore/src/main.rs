#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::sync::Arc;

use kvstore::config::ServerConfig;
use kvstore::storage::{BTree, NodeStorage, PageLayout, StorageFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: file_path={}, page_size={}, max_keys={}, listen={}:{}, telnet_mode={}",
        config.file_path.display(),
        config.page_size,
        config.max_keys,
        config.listen_address,
        config.listen_port,
        config.telnet_mode
    );

    let file = StorageFile::open_or_create(&config.file_path).unwrap_or_else(|e| {
        tracing::error!("Failed to open {}: {e}", config.file_path.display());
        std::process::exit(1);
    });

    let layout = PageLayout::new(config.page_size, config.max_keys);
    let node_storage = NodeStorage::open_or_create(file, layout).unwrap_or_else(|e| {
        tracing::error!("Failed to load store: {e}");
        std::process::exit(1);
    });

    let tree = match BTree::new(node_storage, config.max_keys as usize) {
        Ok(tree) => Arc::new(tree),
        Err(e) => {
            tracing::error!("Failed to build tree: {e}");
            std::process::exit(1);
        }
    };

    let addr = SocketAddr::new(config.listen_address, config.listen_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });
    tracing::info!("listening on {}", addr);

    #[allow(clippy::disallowed_methods)] // Arc::clone to keep a handle for close
    let served = kvstore::server::serve(listener, Arc::clone(&tree), config.telnet_mode, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await;

    if let Err(e) = served {
        tracing::error!("Server error: {e}");
    }

    if let Err(e) = tree.close() {
        tracing::error!("Failed to close store: {e}");
        std::process::exit(1);
    }
    tracing::info!("store closed");
}
