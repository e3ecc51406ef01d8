//! Per-connection request handler.
//!
//! Each accepted socket gets a `Client` running one task for the connection
//! lifetime: read a request line, dispatch it into the shared module tree,
//! write the response line. The protocol is strictly request/response, so a
//! single task owns both socket halves and at most one call is in flight
//! per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::constants::CLIENT_POLL_INTERVAL;
use crate::dispatch::dispatch_line;
use crate::function::CallOutcome;
use crate::module::Module;
use crate::protocol;

/// Handler for one accepted connection.
///
/// Dropping the handle does not end the connection; call [`Client::stop`]
/// (or shut the owning server down) to end it. The serving task notices a
/// cleared liveness flag within one poll interval, between requests; it
/// never interrupts a call already dispatched.
pub struct Client {
    peer: SocketAddr,
    listening: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Take ownership of an accepted stream and start serving it against
    /// `root`.
    pub(crate) fn spawn(stream: TcpStream, peer: SocketAddr, root: Module) -> Self {
        let listening = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&listening);
        let handle = tokio::spawn(Self::serve_loop(stream, peer, root, flag));
        Self { peer, listening, handle }
    }

    /// Peer address of the connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Ask the serving task to end its loop and close the socket. Takes
    /// effect at the next iteration boundary.
    pub fn stop(&self) {
        self.listening.store(false, Ordering::Relaxed);
    }

    /// Whether the serving task has ended (EOF, error, or a stop).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn serve_loop(
        stream: TcpStream,
        peer: SocketAddr,
        root: Module,
        listening: Arc<AtomicBool>,
    ) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while listening.load(Ordering::Relaxed) {
            // Poll for the next line so the flag is re-checked on idle
            // connections. `next_line` is cancellation safe; a timed-out
            // partial line stays buffered.
            let line = match tokio::time::timeout(CLIENT_POLL_INTERVAL, lines.next_line()).await {
                Err(_) => continue,
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    log::info!("[Server] Client disconnected: {peer}");
                    break;
                }
                Ok(Err(e)) => {
                    log::error!("[Server] Read error for {peer}: {e}");
                    break;
                }
            };

            let response = match respond(&root, &line) {
                Ok(response) => response,
                Err(error) => {
                    log::error!("[Server] Protocol violation from {peer}: {error:#}");
                    break;
                }
            };
            if let Err(e) = write_half.write_all(response.as_bytes()).await {
                log::error!("[Server] Write error for {peer}: {e}");
                break;
            }
        }
        // Dropping the halves closes the socket.
    }
}

/// Handle one request line, returning the full response (terminator
/// included). An error here is a transport-level violation, fatal to the
/// connection; everything at the call level is folded into the response.
fn respond(root: &Module, raw: &str) -> Result<String> {
    let (line, encoded) = protocol::decode_request(raw)?;
    let reply = match dispatch_line(root, &line) {
        CallOutcome::Finished(payload) => Some((true, payload)),
        CallOutcome::Pending(payload) => Some((false, payload)),
        CallOutcome::ModuleNotFound => Some((false, "Module not found".to_owned())),
        CallOutcome::Failed(description) => Some((false, description)),
        // No function produced a result; the response is the bare line
        // terminator.
        CallOutcome::FunctionNotFound { .. } => None,
    };
    let mut response = match reply {
        Some((finished, payload)) => protocol::encode_response(finished, &payload, encoded),
        None => String::new(),
    };
    response.push('\n');
    Ok(response)
}
