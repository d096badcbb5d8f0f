// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;

/// A parsed backend endpoint. Only `ws://` and `wss://` are accepted; the
/// scheme selects plaintext vs. TLS and the default port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    pub use_tls: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl BackendUrl {
    pub fn parse(url: &str) -> anyhow::Result<Self> {
        let (use_tls, rest) = if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else {
            anyhow::bail!("unsupported backend URL scheme: {url}");
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in backend URL: {url}"))?;
                (host, port)
            }
            None => (authority, if use_tls { 443 } else { 80 }),
        };
        anyhow::ensure!(!host.is_empty(), "missing host in backend URL: {url}");

        Ok(Self {
            use_tls,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// The URL handed to the WebSocket connector.
    pub fn request_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}
