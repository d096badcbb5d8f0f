// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! The transport worker: a reconnect loop with bounded exponential backoff
//! wrapped around a register → authenticate → stream session. Runs on its
//! own thread with a current-thread runtime so the host's executor (if any)
//! is never involved.

use super::{frames, ConnectionState, TransportOptions, TransportShared};
use crate::shared::constants::{BACKOFF_CAP_EXPONENT, SERVICE_TICK};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

enum SessionEnd {
    /// Transient failure; reconnect with backoff.
    Disconnected,
    /// Authentication rejected; the worker terminates and never retries.
    Fatal,
    /// Shutdown requested.
    Stopping,
}

enum Inbound {
    Registered,
    AuthRejected,
    Other,
}

/// The service reply grammar is substring matching by contract; see the
/// inbound-frame notes in the backend protocol.
fn classify_inbound(text: &str) -> Inbound {
    if text.contains("\"registered\"") {
        Inbound::Registered
    } else if text.contains("\"error\"")
        && (text.contains("auth_error") || text.contains("invalid_api_key"))
    {
        Inbound::AuthRejected
    } else {
        Inbound::Other
    }
}

pub(super) fn run(
    shared: Arc<TransportShared>,
    cancel: CancellationToken,
    options: TransportOptions,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build transport runtime");
            return;
        }
    };
    runtime.block_on(run_loop(&shared, &cancel, &options));
    shared.set_state(ConnectionState::Disconnected);
}

async fn run_loop(shared: &TransportShared, cancel: &CancellationToken, options: &TransportOptions) {
    let request_url = options.url.request_url();
    let mut attempts: u32 = 0;

    while !cancel.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);
        match tokio_tungstenite::connect_async(&request_url).await {
            Ok((stream, _response)) => {
                shared.set_state(ConnectionState::Connected);
                if options.debug {
                    debug!(url = %request_url, "connected to backend");
                }
                let end = service(shared, cancel, options, stream, &mut attempts).await;
                shared.set_state(ConnectionState::Disconnected);
                match end {
                    SessionEnd::Disconnected => {}
                    SessionEnd::Fatal => return,
                    SessionEnd::Stopping => return,
                }
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                if options.debug {
                    debug!(url = %request_url, error = %e, "connect failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }
        attempts += 1;
        if attempts > options.max_reconnect_attempts {
            warn!(attempts, "max reconnect attempts reached, transport worker stopping");
            return;
        }
        let delay = Duration::from_secs(1u64 << attempts.min(BACKOFF_CAP_EXPONENT));
        if options.debug {
            debug!(attempt = attempts, delay_secs = delay.as_secs(), "reconnecting after backoff");
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Services one established connection until it drops, authentication is
/// rejected, or shutdown is requested. Registration always precedes every
/// other frame; the queue is only drained while authenticated.
async fn service(
    shared: &TransportShared,
    cancel: &CancellationToken,
    options: &TransportOptions,
    stream: WsStream,
    attempts: &mut u32,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    if let Err(e) = write
        .send(Message::Text(options.register_frame.clone().into()))
        .await
    {
        if options.debug {
            debug!(error = %e, "failed to send register frame");
        }
        return SessionEnd::Disconnected;
    }

    let mut authenticated = false;
    let mut last_heartbeat = Instant::now();
    let mut tick = tokio::time::interval(SERVICE_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Stopping;
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match classify_inbound(&text) {
                    Inbound::Registered => {
                        authenticated = true;
                        *attempts = 0;
                        last_heartbeat = Instant::now();
                        shared.set_state(ConnectionState::Authenticated);
                        if options.debug {
                            debug!(
                                queued = shared.queue().len(),
                                evicted = shared.queue().evicted(),
                                "agent registered"
                            );
                        }
                        if drain(shared, &mut write, options).await.is_err() {
                            return SessionEnd::Disconnected;
                        }
                    }
                    Inbound::AuthRejected => {
                        error!("backend rejected the API key, transport worker stopping");
                        return SessionEnd::Fatal;
                    }
                    Inbound::Other => {}
                },
                // Pings are answered by tungstenite itself; binary frames
                // are not part of the protocol.
                Some(Ok(Message::Close(_))) | None => {
                    if options.debug {
                        debug!("connection closed by backend");
                    }
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if options.debug {
                        debug!(error = %e, "socket error");
                    }
                    return SessionEnd::Disconnected;
                }
            },
            _ = tick.tick(), if authenticated => {
                if last_heartbeat.elapsed() >= options.heartbeat_interval {
                    match frames::heartbeat_frame() {
                        Ok(frame) => {
                            if write.send(Message::Text(frame.into())).await.is_err() {
                                return SessionEnd::Disconnected;
                            }
                            last_heartbeat = Instant::now();
                        }
                        Err(e) => warn!(error = %e, "failed to encode heartbeat"),
                    }
                }
                if shared.queue().non_empty() && drain(shared, &mut write, options).await.is_err() {
                    return SessionEnd::Disconnected;
                }
            }
            _ = shared.wake.notified(), if authenticated => {
                if shared.queue().non_empty() && drain(shared, &mut write, options).await.is_err() {
                    return SessionEnd::Disconnected;
                }
            }
        }
    }
}

/// Pops and transmits queued records in FIFO order. A failed write puts the
/// record back at the head so the next session retransmits it first.
async fn drain(
    shared: &TransportShared,
    write: &mut WsSink,
    options: &TransportOptions,
) -> Result<(), ()> {
    while let Some(record) = shared.queue().pop() {
        if let Err(e) = write.send(Message::Text(record.clone().into())).await {
            shared.queue().push_front(record);
            if options.debug {
                debug!(error = %e, "write failed while draining queue");
            }
            return Err(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_inbound() {
        assert!(matches!(
            classify_inbound(r#"{"type":"registered"}"#),
            Inbound::Registered
        ));
        assert!(matches!(
            classify_inbound(r#"{"status":"registered","agent_id":"a"}"#),
            Inbound::Registered
        ));
        assert!(matches!(
            classify_inbound(r#"{"type":"error","code":"invalid_api_key"}"#),
            Inbound::AuthRejected
        ));
        assert!(matches!(
            classify_inbound(r#"{"type":"error","code":"auth_error"}"#),
            Inbound::AuthRejected
        ));
        // A non-auth error is not terminal.
        assert!(matches!(
            classify_inbound(r#"{"type":"error","code":"throttled"}"#),
            Inbound::Other
        ));
        assert!(matches!(classify_inbound("{}"), Inbound::Other));
    }

    #[test]
    fn test_backoff_is_capped() {
        let delays: Vec<u64> = (1..=10u32)
            .map(|attempts| 1u64 << attempts.min(BACKOFF_CAP_EXPONENT))
            .collect();
        assert_eq!(delays[0], 2);
        assert_eq!(delays[5], 64);
        assert!(delays.iter().all(|&d| d <= 64));
    }
}
