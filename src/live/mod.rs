//! Remote conversational session
//!
//! A session is a pair of channels: a [`SessionHandle`] for outbound audio,
//! tool responses and close, and a receiver of [`SessionEvent`]s. The
//! transport behind them is owned by a [`LiveConnector`].

mod gemini;
pub mod protocol;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::voice::EncodedAudioPacket;
use crate::{Error, Result};

pub use gemini::{DEFAULT_ENDPOINT, GeminiLive};

/// Declaration of a tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Tool name as the model sees it
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Live model identifier
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// System instruction text
    pub system_instruction: String,
    /// Declared tools
    pub tools: Vec<FunctionDeclaration>,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Call id to echo back in the response
    pub id: Option<String>,
    /// Tool name
    pub name: String,
    /// Arguments object (`Null` when absent)
    pub args: Value,
}

/// Result of one tool call, as sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    /// Id of the call being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name of the call being answered
    pub name: String,
    /// `{ "result": ... }`
    pub response: ToolResult,
}

/// Payload of a function response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    /// Spoken-style result text
    pub result: String,
}

impl FunctionResponse {
    /// Build a response carrying a result string
    #[must_use]
    pub fn new(id: Option<String>, name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            response: ToolResult {
                result: result.into(),
            },
        }
    }
}

/// Content of one inbound server message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMessage {
    /// Transcription delta of the user's speech
    pub input_transcription: Option<String>,
    /// Transcription delta of the model's speech
    pub output_transcription: Option<String>,
    /// The model finished its turn
    pub turn_complete: bool,
    /// The model's turn was cut off by the user
    pub interrupted: bool,
    /// Base64 PCM chunks, in order
    pub audio: Vec<String>,
    /// Tool calls in this message
    pub tool_calls: Vec<FunctionCall>,
}

/// Events delivered by a session, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session is ready for audio
    Opened,
    /// Content from the model
    Message(ServerMessage),
    /// The transport or protocol failed; the session is gone
    Error(String),
    /// The remote side closed the session
    Closed(Option<String>),
}

/// Outbound commands for a session's transport
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// One packet of microphone audio
    Audio(EncodedAudioPacket),
    /// Results of tool calls
    ToolResponse(Vec<FunctionResponse>),
    /// Close the session
    Close,
}

/// Sending side of a session
///
/// Sends are fire-and-forget: nothing waits for the transport to accept a
/// packet and no flow control is applied.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<ClientMessage>,
}

impl SessionHandle {
    /// Wrap a command channel
    #[must_use]
    pub const fn new(commands: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { commands }
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        self.commands
            .send(message)
            .map_err(|_| Error::Transport("session transport has shut down".to_string()))
    }

    /// Queue a microphone packet
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the session task is gone
    pub fn send_audio(&self, packet: EncodedAudioPacket) -> Result<()> {
        self.send(ClientMessage::Audio(packet))
    }

    /// Queue a tool response
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the session task is gone
    pub fn send_tool_response(&self, response: FunctionResponse) -> Result<()> {
        self.send(ClientMessage::ToolResponse(vec![response]))
    }

    /// Ask the transport to close
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session already ended
    pub fn close(&self) -> Result<()> {
        self.commands
            .send(ClientMessage::Close)
            .map_err(|_| Error::SessionClosed)
    }
}

/// An opened (or opening) session
#[derive(Debug)]
pub struct LiveSession {
    /// Outbound side
    pub handle: SessionHandle,
    /// Inbound events
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Opens remote sessions
pub trait LiveConnector: Send + Sync {
    /// Start opening a session
    ///
    /// Returns immediately; [`SessionEvent::Opened`] arrives once the remote
    /// side accepted the setup.
    fn open(&self, setup: SessionSetup) -> LiveSession;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reports_dead_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        drop(rx);

        assert!(matches!(
            handle.send_audio(EncodedAudioPacket::silence()),
            Err(Error::Transport(_))
        ));
        assert!(matches!(handle.close(), Err(Error::SessionClosed)));
    }

    #[test]
    fn handle_queues_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        handle.send_audio(EncodedAudioPacket::silence()).unwrap();
        handle
            .send_tool_response(FunctionResponse::new(None, "stopMusic", "done"))
            .unwrap();
        handle.close().unwrap();

        assert!(matches!(rx.try_recv().unwrap(), ClientMessage::Audio(_)));
        assert!(matches!(rx.try_recv().unwrap(), ClientMessage::ToolResponse(r) if r.len() == 1));
        assert!(matches!(rx.try_recv().unwrap(), ClientMessage::Close));
    }
}
