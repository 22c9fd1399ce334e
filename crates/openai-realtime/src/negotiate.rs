//! Negotiation of the realtime link.
//!
//! The link is a WebSocket to the realtime endpoint. Its three phases map to
//! the classic offer/answer shape: the authorised upgrade request is the local
//! description, the HTTP upgrade is the remote exchange, and the server's
//! `session.created` frame is the remote description.

use crate::credential::EphemeralCredential;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use openai_realtime_types::server::ServerEvent;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;

/// The task that owns the network connection. Dropping it closes the socket.
#[derive(Debug)]
pub struct Connection {
    pump: JoinHandle<()>,
}

impl Connection {
    pub fn new(pump: JoinHandle<()>) -> Self {
        Self { pump }
    }

    pub fn is_finished(&self) -> bool {
        self.pump.is_finished()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// A negotiated, open link: the data channel halves plus the connection.
///
/// `inbound` closes when the remote side goes away.
#[derive(Debug)]
pub struct NegotiatedLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
    pub connection: Connection,
}

#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, credential: &EphemeralCredential) -> Result<NegotiatedLink, TransportError>;
}

pub struct WebSocketNegotiator {
    timeout: Duration,
}

impl WebSocketNegotiator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn negotiation_failed(reason: impl Into<String>) -> TransportError {
    TransportError::NegotiationFailed(reason.into())
}

/// Turns the credential's realtime base URL into the socket URL for `model`.
pub fn realtime_socket_url(base: &str, model: &str) -> Result<String, TransportError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| negotiation_failed(format!("invalid realtime URL '{}': {}", base, e)))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(negotiation_failed(format!("unsupported realtime URL scheme '{}'", other)));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| negotiation_failed(format!("cannot use {} for '{}'", scheme, base)))?;
    url.query_pairs_mut().append_pair("model", model);
    Ok(url.into())
}

#[async_trait]
impl Negotiator for WebSocketNegotiator {
    async fn negotiate(&self, credential: &EphemeralCredential) -> Result<NegotiatedLink, TransportError> {
        let deadline = Instant::now() + self.timeout;

        // Local description.
        let url = realtime_socket_url(&credential.realtime_url, &credential.model)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| negotiation_failed(e.to_string()))?;
        let bearer = format!("Bearer {}", credential.token.expose_secret())
            .parse()
            .map_err(|_| negotiation_failed("credential is not a valid header value"))?;
        request.headers_mut().insert("Authorization", bearer);
        request.headers_mut().insert(
            "OpenAI-Beta",
            "realtime=v1"
                .parse()
                .map_err(|_| negotiation_failed("invalid protocol header"))?,
        );

        // Remote exchange.
        let (ws_stream, _) = tokio::time::timeout_at(deadline, connect_async(request))
            .await
            .map_err(|_| negotiation_failed("timed out waiting for the upgrade"))?
            .map_err(|e| match e {
                tungstenite::Error::Http(response) => {
                    negotiation_failed(format!("upgrade rejected with status {}", response.status()))
                }
                other => negotiation_failed(other.to_string()),
            })?;
        let (mut sink, mut stream) = ws_stream.split();
        debug!("Realtime socket upgraded, awaiting session.created");

        // Remote description.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let first = timeout(remaining, stream.next())
            .await
            .map_err(|_| negotiation_failed("timed out waiting for session.created"))?;
        let text = match first {
            Some(Ok(WsMessage::Text(text))) => text.to_string(),
            Some(Ok(other)) => return Err(negotiation_failed(format!("unexpected first frame: {:?}", other))),
            Some(Err(e)) => return Err(negotiation_failed(e.to_string())),
            None => return Err(negotiation_failed("connection closed during negotiation")),
        };
        check_session_created(&text)?;
        info!(model = %credential.model, "Connected to realtime agent.");

        let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    outgoing = out_rx.recv() => match outgoing {
                        Some(text) => {
                            if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                                warn!(error = %e, "Failed to write to realtime socket");
                                break;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                    incoming = stream.next() => match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            if in_tx.send(text.to_string()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Realtime socket closed by remote");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Realtime socket read failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            debug!("Realtime socket pump finished");
        });

        Ok(NegotiatedLink {
            outbound: out_tx,
            inbound: in_rx,
            connection: Connection::new(pump),
        })
    }
}

fn check_session_created(frame: &str) -> Result<(), TransportError> {
    match serde_json::from_str::<ServerEvent>(frame) {
        Ok(ServerEvent::SessionCreated {}) => Ok(()),
        Ok(ServerEvent::Error { error }) => Err(negotiation_failed(error.message)),
        Ok(_) => Err(negotiation_failed("first frame was not session.created")),
        Err(e) => Err(negotiation_failed(format!("malformed answer: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_url_from_https_base() {
        assert_eq!(
            realtime_socket_url("https://api.openai.com/v1/realtime", "gpt-realtime").unwrap(),
            "wss://api.openai.com/v1/realtime?model=gpt-realtime"
        );
        assert_eq!(
            realtime_socket_url("http://localhost:9000/rt?x=1", "m").unwrap(),
            "ws://localhost:9000/rt?x=1&model=m"
        );
        assert!(realtime_socket_url("ftp://nope", "m").is_err());
        assert!(realtime_socket_url("not a url", "m").is_err());
    }

    #[test]
    fn test_socket_url_encodes_model() {
        assert_eq!(
            realtime_socket_url("https://api.openai.com/v1/realtime", "gpt realtime&x=1").unwrap(),
            "wss://api.openai.com/v1/realtime?model=gpt+realtime%26x%3D1"
        );
    }

    #[test]
    fn test_answer_must_be_session_created() {
        assert!(check_session_created(r#"{"type":"session.created","session":{}}"#).is_ok());
        let err = check_session_created(r#"{"type":"error","error":{"message":"bad token"}}"#).unwrap_err();
        assert_eq!(err, TransportError::NegotiationFailed("bad token".into()));
        assert!(check_session_created(r#"{"type":"session.updated"}"#).is_err());
        assert!(check_session_created("<html>").is_err());
    }

    fn credential(url: String) -> EphemeralCredential {
        EphemeralCredential {
            token: SecretString::from("ek_test".to_string()),
            expires_at: 0,
            realtime_url: url,
            model: "gpt-realtime".into(),
        }
    }

    #[tokio::test]
    async fn test_rejected_upgrade_is_negotiation_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let negotiator = WebSocketNegotiator::new(Duration::from_secs(5));
        let err = negotiator
            .negotiate(&credential(format!("http://{}/v1/realtime", addr)))
            .await
            .unwrap_err();
        match err {
            TransportError::NegotiationFailed(reason) => assert!(reason.contains("401"), "{}", reason),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_and_pump() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"session.created","session":{}}"#.to_string().into()))
                .await
                .unwrap();
            let received = ws.next().await.unwrap().unwrap();
            ws.send(WsMessage::Text(r#"{"type":"session.updated"}"#.to_string().into()))
                .await
                .unwrap();
            received.into_text().unwrap().to_string()
        });

        let negotiator = WebSocketNegotiator::new(Duration::from_secs(5));
        let mut link = negotiator
            .negotiate(&credential(format!("http://{}/v1/realtime", addr)))
            .await
            .unwrap();
        link.outbound.send(r#"{"type":"response.create"}"#.to_string()).await.unwrap();
        let echoed = link.inbound.recv().await.unwrap();
        assert!(echoed.contains("session.updated"));
        assert_eq!(server.await.unwrap(), r#"{"type":"response.create"}"#);
    }
}
