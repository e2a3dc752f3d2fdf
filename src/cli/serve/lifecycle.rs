//! Server lifecycle management.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::{Result, anyhow};
use tiny_http::Server;

/// Ports tried above the configured one.
const MAX_PORT_RETRIES: u16 = 10;

/// Ctrl+C received.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Server to unblock on Ctrl+C.
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Bind `addr`, moving up one port at a time while it is taken.
pub fn bind_with_retry(addr: SocketAddr) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    let candidates = (0..MAX_PORT_RETRIES)
        .map_while(|offset| addr.port().checked_add(offset))
        .map(|port| SocketAddr::new(addr.ip(), port));

    for candidate in candidates {
        match Server::http(candidate) {
            Ok(server) => {
                if candidate != addr {
                    log!("serve"; "{} in use, listening on {} instead", addr, candidate);
                }
                return Ok((server, candidate));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow!(
        "no free port in {}..+{}: {}",
        addr,
        MAX_PORT_RETRIES,
        last_error.map_or_else(String::new, |e| e.to_string())
    ))
}

/// Install the Ctrl+C handler. Before a server is registered it exits the
/// process; afterwards it unblocks the request loop.
pub fn setup_shutdown_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);
        if let Some(server) = SERVER.get() {
            log!("serve"; "shutting down...");
            server.unblock();
        } else {
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))
}

pub fn register_server(server: Arc<Server>) {
    let _ = SERVER.set(server);
}

pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_with_retry_skips_taken_port() {
        let first = Server::http("127.0.0.1:0").unwrap();
        let taken = first.server_addr().to_ip().unwrap();

        let (_server, addr) = bind_with_retry(taken).unwrap();
        assert_eq!(addr.ip(), taken.ip());
        assert!(addr.port() > taken.port());
    }

    #[test]
    fn test_shutdown_flag_starts_clear() {
        assert!(!is_shutdown());
    }
}
