//! Gemini Live API over WebSocket

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::protocol::{
    RealtimeInputMessage, ServerFrame, SetupMessage, ToolResponseMessage, parse_server_frame,
};
use super::{ClientMessage, LiveConnector, LiveSession, SessionEvent, SessionHandle, SessionSetup};
use crate::{Error, Result};

/// Default Live API WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Connector for the Gemini Live API
pub struct GeminiLive {
    endpoint: String,
    api_key: SecretString,
}

impl GeminiLive {
    /// Create a connector for `endpoint`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

impl LiveConnector for GeminiLive {
    fn open(&self, setup: SessionSetup) -> LiveSession {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session_id = uuid::Uuid::new_v4();
        let url = self.url();
        let model = setup.model.clone();

        tokio::spawn(async move {
            tracing::info!(%session_id, model = %model, "opening live session");
            let outcome = match url {
                Ok(url) => drive(url, &setup, command_rx, &event_tx).await,
                Err(e) => Err(e),
            };
            let event = match outcome {
                Ok(Some(reason)) => SessionEvent::Closed(Some(reason)),
                Ok(None) => SessionEvent::Closed(None),
                Err(e) => SessionEvent::Error(e.to_string()),
            };
            tracing::info!(%session_id, ?event, "live session ended");
            // Receiver is gone when the session was closed locally
            let _ = event_tx.send(event);
        });

        LiveSession {
            handle: SessionHandle::new(command_tx),
            events: event_rx,
        }
    }
}

fn text_frame<T: Serialize>(value: &T) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(value)?.into()))
}

fn frame_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

/// Run one session until it closes
///
/// Returns the close reason, if any.
async fn drive(
    url: url::Url,
    setup: &SessionSetup,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<Option<String>> {
    let request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::Transport(format!("failed to create client request: {e}")))?;
    let (stream, _response) = connect_async(request)
        .await
        .map_err(|e| Error::Transport(format!("websocket connect error: {e}")))?;
    let (mut sink, mut source) = stream.split();

    sink.send(text_frame(&SetupMessage::new(setup))?)
        .await
        .map_err(|e| Error::Transport(format!("failed to send setup: {e}")))?;
    tracing::debug!("setup sent, waiting for acknowledgement");

    // Outbound traffic waits for the acknowledgement; only a hang-up is honoured
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ClientMessage::Close) | None => {
                    tracing::debug!("session closed before setup completed");
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "close frame not delivered");
                    }
                    return Ok(None);
                }
                Some(_) => tracing::debug!("dropping outbound message sent before setup completed"),
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(frame.map(|f| f.reason.to_string()));
                }
                Some(Ok(message)) => {
                    let Some(text) = frame_text(message) else {
                        continue;
                    };
                    match parse_server_frame(&text) {
                        Ok(ServerFrame::SetupComplete) => break,
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "unparseable server frame during setup"),
                    }
                }
                Some(Err(e)) => return Err(Error::Protocol(e.to_string())),
                None => return Ok(Some("connection ended during setup".to_string())),
            },
        }
    }

    if events.send(SessionEvent::Opened).is_err() {
        // Nobody is listening any more; hang up politely
        let _ = sink.send(Message::Close(None)).await;
        return Ok(None);
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                let frame = match command {
                    Some(ClientMessage::Audio(packet)) => text_frame(&RealtimeInputMessage::audio(packet)),
                    Some(ClientMessage::ToolResponse(responses)) => {
                        text_frame(&ToolResponseMessage::new(responses))
                    }
                    Some(ClientMessage::Close) | None => {
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            tracing::debug!(error = %e, "close frame not delivered");
                        }
                        return Ok(None);
                    }
                };
                match frame {
                    Ok(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            tracing::warn!(error = %e, "live session send failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to encode outbound frame"),
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Close(frame))) => {
                        return Ok(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(message)) => {
                        let Some(text) = frame_text(message) else {
                            continue;
                        };
                        match parse_server_frame(&text) {
                            Ok(ServerFrame::Message(message)) => {
                                let _ = events.send(SessionEvent::Message(message));
                            }
                            Ok(ServerFrame::GoAway(time_left)) => {
                                tracing::warn!(?time_left, "live session will be closed by server");
                            }
                            Ok(ServerFrame::ToolCallCancellation(ids)) => {
                                tracing::debug!(?ids, "server cancelled tool calls");
                            }
                            Ok(ServerFrame::SetupComplete | ServerFrame::Ignored) => {}
                            Err(e) => tracing::warn!(error = %e, "unparseable server frame"),
                        }
                    }
                    Some(Err(e)) => return Err(Error::Protocol(e.to_string())),
                    None => return Ok(None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn url_carries_api_key() {
        let live = GeminiLive::new(DEFAULT_ENDPOINT, SecretString::from("secret-key".to_string()));
        let url = live.url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert!(url.query().unwrap().contains("key=secret-key"));
    }

    #[test]
    fn bad_endpoint_is_config_error() {
        let live = GeminiLive::new("not a url", SecretString::from("k".to_string()));
        assert!(matches!(live.url(), Err(Error::Config(_))));
    }

    type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one websocket client and hand back the stream after the setup frame
    async fn serve_one(listener: tokio::net::TcpListener) -> ServerSocket {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let setup = ws.next().await.unwrap().unwrap();
        assert!(setup.to_text().unwrap().contains("\"setup\""));
        ws
    }

    /// Read until the client hangs up; true when it sent a close frame
    async fn saw_close_frame(ws: &mut ServerSocket) -> bool {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    }

    async fn open_local() -> (LiveSession, tokio::task::JoinHandle<ServerSocket>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_one(listener));

        let live = GeminiLive::new(format!("ws://{addr}"), SecretString::from("k".to_string()));
        let session = live.open(SessionSetup {
            model: "models/test".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "Be kind.".to_string(),
            tools: Vec::new(),
        });
        (session, server)
    }

    #[tokio::test]
    async fn close_before_setup_complete_hangs_up() {
        let (mut session, server) = open_local().await;
        let mut ws = server.await.unwrap();

        session.handle.close().unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(2), saw_close_frame(&mut ws))
            .await
            .unwrap();
        assert!(closed);

        let event = tokio::time::timeout(Duration::from_secs(2), session.events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(SessionEvent::Closed(None)));
    }

    #[tokio::test]
    async fn garbage_during_setup_is_skipped() {
        let (mut session, server) = open_local().await;
        let mut ws = server.await.unwrap();

        ws.send(Message::Text("{not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"setupComplete": {}}"#.into()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), session.events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(SessionEvent::Opened));

        session.handle.close().unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(2), saw_close_frame(&mut ws))
            .await
            .unwrap();
        assert!(closed);
    }
}
