//! TCP front end for the command tree.
//!
//! ```text
//!   console ---TCP---> Server (accept loop)
//!                        |  one Client task per connection
//!                        v
//!                      Client --parse/resolve/dispatch--> Module tree
//!                        |
//!                        +--- "<true|false>:<payload>" + LF ---> console
//! ```
//!
//! Every connection dispatches into the same shared root [`Module`];
//! request/response order is strict within a connection and unspecified
//! across connections.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::constants::ACCEPT_RETRY_DELAY;
use crate::module::Module;

pub mod client;

pub use client::Client;

/// TCP server exposing a module tree to remote consoles.
///
/// Binds a listener and spawns an accept loop that creates a [`Client`]
/// for each connection. Connections live until the peer leaves or
/// [`Server::shutdown`] runs; handlers for long-gone peers are reaped
/// lazily on shutdown.
#[derive(Debug)]
pub struct Server {
    /// Address actually bound (resolves port 0 requests).
    local_addr: SocketAddr,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
    /// Every connection accepted so far.
    clients: Arc<Mutex<Vec<Client>>>,
}

impl Server {
    /// Bind `port` on all interfaces and start accepting consoles for the
    /// tree under `root`. Port 0 binds an ephemeral port; the chosen one is
    /// available from [`Server::local_addr`].
    pub async fn start(port: u16, root: Module) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind command server on port {port}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read the bound address")?;
        log::info!("[Server] Command server listening on {local_addr}");

        let clients = Arc::new(Mutex::new(Vec::new()));
        let accept_clients = Arc::clone(&clients);
        let accept_handle = tokio::spawn(Self::accept_loop(listener, root, accept_clients));

        Ok(Self { local_addr, accept_handle, clients })
    }

    /// Accept loop, running as its own tokio task.
    async fn accept_loop(listener: TcpListener, root: Module, clients: Arc<Mutex<Vec<Client>>>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    log::info!("[Server] Client connected: {peer}");
                    let client = Client::spawn(stream, peer, root.clone());
                    clients.lock().expect("Clients mutex poisoned").push(client);
                }
                Err(e) => {
                    log::error!("[Server] Accept error: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.clients.lock().expect("Clients mutex poisoned").len()
    }

    /// Stop accepting and ask every connection handler to end its loop.
    /// Handlers notice within one poll interval; in-flight calls complete.
    pub fn shutdown(self) {
        self.accept_handle.abort();
        let mut clients = self.clients.lock().expect("Clients mutex poisoned");
        for client in clients.drain(..) {
            client.stop();
        }
        log::info!("[Server] Command server stopped");
    }
}
