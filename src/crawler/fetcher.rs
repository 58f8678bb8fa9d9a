//! Relay fetch client
//!
//! One fetch is one short-lived WebSocket session:
//! - connect (bounded by the connect timeout)
//! - send a single relay-list `REQ`
//! - read until `EOSE`, `CLOSED` or a clean close (bounded by the attempt timeout)
//! - release the connection on every exit path
//!
//! The fetcher holds no shared mutable state, so one instance can serve any
//! number of concurrent attempts.

use super::protocol::{build_close, build_request, parse_message, RelayMessage, SUBSCRIPTION_ID};
use crate::config::CrawlerConfig;
use crate::url::RelayUrl;
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the goodbye exchange after an attempt finishes
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Performs one query attempt against one relay
#[async_trait]
pub trait RelayFetcher: Send + Sync {
    /// Returns every relay URL advertised in the relay's relay-list events
    ///
    /// URLs are returned raw and may repeat; the registry deduplicates them.
    async fn fetch(&self, url: &RelayUrl, attempt_timeout: Duration) -> FetchResult<Vec<String>>;
}

/// Production fetcher speaking the Nostr protocol over WebSockets
#[derive(Debug, Clone)]
pub struct WebSocketFetcher {
    connect_timeout: Duration,
    result_limit: u32,
}

impl WebSocketFetcher {
    pub fn new(connect_timeout: Duration, result_limit: u32) -> Self {
        Self {
            connect_timeout,
            result_limit,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            config.result_limit,
        )
    }

    async fn connect(&self, url: &RelayUrl) -> FetchResult<WsStream> {
        match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(FetchError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(FetchError::Connect {
                url: url.to_string(),
                message: format!("handshake not completed within {:?}", self.connect_timeout),
            }),
        }
    }

    async fn exchange(&self, stream: &mut WsStream, url: &RelayUrl) -> FetchResult<Vec<String>> {
        stream
            .send(Message::Text(build_request(SUBSCRIPTION_ID, self.result_limit)))
            .await
            .map_err(|e| protocol_error(url, e))?;

        let mut discovered = Vec::new();

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) if is_end_of_stream(&e) => break,
                Err(e) => return Err(protocol_error(url, e)),
            };

            match parse_message(&text) {
                Ok(RelayMessage::Event {
                    subscription_id,
                    relay_urls,
                }) if subscription_id == SUBSCRIPTION_ID => {
                    discovered.extend(relay_urls);
                }
                Ok(RelayMessage::Notice(notice)) => {
                    tracing::debug!(relay = %url, notice = %notice, "Relay notice");
                }
                Ok(message) if message.ends_subscription(SUBSCRIPTION_ID) => {
                    if let RelayMessage::Closed { message, .. } = &message {
                        tracing::debug!(
                            relay = %url,
                            reason = %message,
                            "Subscription closed by relay"
                        );
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(relay = %url, error = %e, "Skipping undecodable message");
                }
            }
        }

        Ok(discovered)
    }
}

#[async_trait]
impl RelayFetcher for WebSocketFetcher {
    async fn fetch(&self, url: &RelayUrl, attempt_timeout: Duration) -> FetchResult<Vec<String>> {
        let mut stream = self.connect(url).await?;

        let outcome = match timeout(attempt_timeout, self.exchange(&mut stream, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
        };

        release(&mut stream).await;
        outcome
    }
}

/// Closes the subscription and the socket, best effort
async fn release(stream: &mut WsStream) {
    let goodbye = async {
        if stream
            .send(Message::Text(build_close(SUBSCRIPTION_ID)))
            .await
            .is_ok()
        {
            let _ = stream.close(None).await;
        }
    };
    let _ = timeout(CLOSE_GRACE, goodbye).await;
}

/// Errors that only mean the relay hung up, with or without a close frame
fn is_end_of_stream(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

fn protocol_error(url: &RelayUrl, error: WsError) -> FetchError {
    FetchError::Protocol {
        url: url.to_string(),
        message: error.to_string(),
    }
}
