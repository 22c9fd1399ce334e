//! Events sent from the client to the realtime agent.

use serde::Serialize;
use serde_json::Value;

/// Every outbound message kind we emit on the data channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Declares tools, voice activity detection and transcription settings.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Appends an item (here: a function result) to the conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    /// Asks the agent to produce its next turn.
    #[serde(rename = "response.create")]
    ResponseCreate,
    /// A chunk of base64 PCM16 microphone audio.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

impl ClientEvent {
    /// The wire discriminator, handy for logging without serializing.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate => "response.create",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Session-level configuration sent right after the link opens.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioTranscription {
    pub model: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
}

/// A tool the agent may call, with its JSON-schema parameters.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function {
        name: String,
        description: String,
        parameters: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_create_is_bare_type() {
        let value = serde_json::to_value(ClientEvent::ResponseCreate).unwrap();
        assert_eq!(value, json!({ "type": "response.create" }));
    }

    #[test]
    fn test_function_call_output_shape() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: "call_1".into(),
                output: "Found 3 buildings.".into(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "function_call_output",
                    "call_id": "call_1",
                    "output": "Found 3 buildings."
                }
            })
        );
    }

    #[test]
    fn test_session_update_serializes_tools_and_vad() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: Some("Control the map.".into()),
                voice: Some("alloy".into()),
                modalities: vec!["audio".into(), "text".into()],
                input_audio_transcription: Some(AudioTranscription {
                    model: "whisper-1".into(),
                }),
                turn_detection: Some(TurnDetection::ServerVad {
                    threshold: 0.5,
                    prefix_padding_ms: 300,
                    silence_duration_ms: 500,
                }),
                tools: vec![ToolDefinition::Function {
                    name: "export_data".into(),
                    description: "Export all objects.".into(),
                    parameters: json!({ "type": "object", "properties": {} }),
                }],
                tool_choice: Some("auto".into()),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["turn_detection"]["silence_duration_ms"], 500);
        assert_eq!(value["session"]["tools"][0]["type"], "function");
        assert_eq!(value["session"]["tools"][0]["name"], "export_data");
        assert_eq!(value["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(value["session"]["tool_choice"], "auto");
    }

    #[test]
    fn test_kind_matches_wire_type() {
        let event = ClientEvent::InputAudioBufferAppend { audio: "AAA=".into() };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind());
    }
}
