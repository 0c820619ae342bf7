//! Accept loop and per-connection handling.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::server::KeyValueStore;
use crate::server::wire::{Decoder, Request, encode_get_response};

/// Bytes read from a socket per call.
const READ_CHUNK_SIZE: usize = 4096;

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each connection runs in its own task. Connections already accepted keep
/// running after shutdown until their client disconnects.
///
/// # Errors
///
/// Currently always returns `Ok`; failed accepts are logged and skipped.
#[allow(clippy::disallowed_methods)] // Arc::clone per connection
pub async fn serve<K, F>(
    listener: TcpListener,
    store: Arc<K>,
    telnet_mode: bool,
    shutdown: F,
) -> std::io::Result<()>
where
    K: KeyValueStore,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("failed to accept connection: {e}");
                        continue;
                    }
                };

                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    tracing::debug!("connection from {}", peer);
                    if let Err(e) = handle_connection(stream, peer, store, telnet_mode).await {
                        tracing::warn!("connection {} failed: {e}", peer);
                    }
                    tracing::debug!("connection {} closed", peer);
                });
            }
        }
    }
}

async fn handle_connection<K: KeyValueStore>(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<K>,
    telnet_mode: bool,
) -> std::io::Result<()> {
    let mut version = [0u8; 1];
    if stream.read(&mut version).await? == 0 {
        return Ok(());
    }
    tracing::debug!("{} speaks protocol version {}", peer, version[0]);

    let mut decoder = Decoder::new(telnet_mode);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        decoder.consume(&chunk[..read]);

        while let Some(message) = decoder.next_message() {
            let request = match message.into_request() {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("invalid message from {}: {e}", peer);
                    continue;
                }
            };

            if let Some(response) = execute(&store, request).await {
                stream.write_all(&response).await?;
            }
        }
    }
}

/// Run one request on the blocking pool. Returns the bytes to send back, if
/// the request has a response.
#[allow(clippy::disallowed_methods)] // Arc::clone into the blocking task
async fn execute<K: KeyValueStore>(store: &Arc<K>, request: Request) -> Option<Vec<u8>> {
    let store = Arc::clone(store);

    match request {
        Request::Get { key } => {
            let value = match tokio::task::spawn_blocking(move || store.get(&key)).await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::error!("get failed: {e}");
                    None
                }
                Err(e) => {
                    tracing::error!("get task failed: {e}");
                    None
                }
            };
            Some(encode_get_response(value.as_deref()))
        }
        Request::Put { key, value } => {
            match tokio::task::spawn_blocking(move || store.put(&key, &value)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("put failed: {e}"),
                Err(e) => tracing::error!("put task failed: {e}"),
            }
            None
        }
    }
}
