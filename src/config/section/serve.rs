//! `[serve]` section configuration.
//!
//! ```toml
//! [serve]
//! interface = "0.0.0.0"   # all interfaces; the default is localhost only
//! port = 8080             # first port tried, up to ten above it on conflict
//! workers = 8             # threads answering requests
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub interface: IpAddr,
    pub port: u16,
    /// Request threads. Each one blocks for the length of a render.
    pub workers: usize,
}

impl ServeConfig {
    pub const WORKERS: FieldPath = FieldPath::new("serve.workers");

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.workers == 0 {
            diag.error_with_hint(
                Self::WORKERS,
                "at least one request worker is required",
                "remove the key to use the default of 4",
            );
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5277,
            workers: 4,
        }
    }
}
