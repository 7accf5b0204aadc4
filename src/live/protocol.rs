//! Gemini Live wire format
//!
//! Outbound frames are JSON objects with exactly one top-level key
//! (`setup`, `realtimeInput`, `toolResponse`). Inbound frames are parsed
//! leniently: unknown keys are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FunctionCall, FunctionDeclaration, FunctionResponse, ServerMessage, SessionSetup};
use crate::voice::EncodedAudioPacket;

/// First frame sent on a new connection
#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    tools: Vec<ToolSet>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Empty {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoice {
    voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

impl SetupMessage {
    /// Build the setup frame for a session
    #[must_use]
    pub fn new(setup: &SessionSetup) -> Self {
        let model = if setup.model.starts_with("models/") {
            setup.model.clone()
        } else {
            format!("models/{}", setup.model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO"],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoice {
                                voice_name: setup.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![Part {
                        text: Some(setup.system_instruction.clone()),
                        inline_data: None,
                    }],
                },
                tools: vec![ToolSet {
                    function_declarations: setup.tools.clone(),
                }],
                input_audio_transcription: Empty {},
                output_audio_transcription: Empty {},
            },
        }
    }
}

/// Streaming microphone audio
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<EncodedAudioPacket>,
}

impl RealtimeInputMessage {
    /// Wrap one audio packet
    #[must_use]
    pub fn audio(packet: EncodedAudioPacket) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![packet],
            },
        }
    }
}

/// Results of tool calls
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    tool_response: ToolResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

impl ToolResponseMessage {
    /// Wrap function responses
    #[must_use]
    pub const fn new(function_responses: Vec<FunctionResponse>) -> Self {
        Self {
            tool_response: ToolResponse { function_responses },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerFrame {
    setup_complete: Option<Value>,
    server_content: Option<RawServerContent>,
    tool_call: Option<RawToolCall>,
    tool_call_cancellation: Option<RawToolCallCancellation>,
    go_away: Option<RawGoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerContent {
    model_turn: Option<Content>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    input_transcription: Option<RawTranscription>,
    output_transcription: Option<RawTranscription>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTranscription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolCall {
    #[serde(default)]
    function_calls: Vec<RawFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct RawFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawToolCallCancellation {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGoAway {
    time_left: Option<String>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// The setup frame was accepted
    SetupComplete,
    /// Content, transcription or tool calls
    Message(ServerMessage),
    /// The server cancelled pending tool calls
    ToolCallCancellation(Vec<String>),
    /// The server will close the connection soon
    GoAway(Option<String>),
    /// Nothing this client acts on
    Ignored,
}

/// Parse one inbound JSON frame
///
/// # Errors
///
/// Returns error if the frame is not a JSON object
pub fn parse_server_frame(raw: &str) -> crate::Result<ServerFrame> {
    let frame: RawServerFrame = serde_json::from_str(raw)?;

    if frame.setup_complete.is_some() {
        return Ok(ServerFrame::SetupComplete);
    }
    if let Some(cancel) = frame.tool_call_cancellation {
        return Ok(ServerFrame::ToolCallCancellation(cancel.ids));
    }
    if let Some(go_away) = frame.go_away {
        return Ok(ServerFrame::GoAway(go_away.time_left));
    }
    if frame.server_content.is_none() && frame.tool_call.is_none() {
        return Ok(ServerFrame::Ignored);
    }

    let mut message = ServerMessage::default();

    if let Some(content) = frame.server_content {
        message.input_transcription = content.input_transcription.map(|t| t.text);
        message.output_transcription = content.output_transcription.map(|t| t.text);
        message.turn_complete = content.turn_complete;
        message.interrupted = content.interrupted;
        message.audio = content
            .model_turn
            .map(|turn| {
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(|data| data.mime_type.is_empty() || data.mime_type.starts_with("audio/"))
                    .map(|data| data.data)
                    .collect()
            })
            .unwrap_or_default();
    }

    if let Some(tool_call) = frame.tool_call {
        message.tool_calls = tool_call
            .function_calls
            .into_iter()
            .map(|call| FunctionCall {
                id: call.id,
                name: call.name,
                args: call.args,
            })
            .collect();
    }

    Ok(ServerFrame::Message(message))
}
