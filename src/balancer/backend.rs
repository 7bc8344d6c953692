//! A single upstream endpoint and its liveness flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

/// One upstream endpoint of a pool.
///
/// The address is normalized to its origin (scheme, host and port); any
/// path, query or fragment in the registered address is discarded. The
/// liveness flag starts alive and is written by the health monitor of the
/// pool generation that currently owns this backend; a successor pool that
/// keeps the same origin shares the `Backend` and its flag.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    origin: String,
    authority: String,
    alive: AtomicBool,
}

impl Backend {
    /// Parse and normalize an absolute `http://` or `https://` endpoint URL.
    pub fn parse(address: &str) -> Result<Self, String> {
        let parsed =
            Url::parse(address.trim()).map_err(|_| format!("'{address}' is not a valid URL"))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(format!(
                "unsupported scheme '{scheme}' (expected http or https)"
            ));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("'{address}' has no host"))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| format!("'{address}' has no port"))?;

        let origin = parsed.origin().ascii_serialization();
        let url = Url::parse(&origin).map_err(|_| format!("'{address}' is not a valid URL"))?;

        Ok(Self {
            url,
            origin,
            authority: format!("{host}:{port}"),
            alive: AtomicBool::new(true),
        })
    }

    /// The normalized endpoint URL (path is always `/`).
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://host[:port]`, without a trailing slash.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `host:port`, the target of the reachability probe.
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record the outcome of a probe. Returns the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin)
    }
}
