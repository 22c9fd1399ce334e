//! Turns raw data-channel frames into [`ProtocolEvent`]s and tool results
//! back into the outbound message pair the agent expects.

use crate::client::{ClientEvent, ConversationItem};
use crate::server::{OutputItem, ServerEvent};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed protocol message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// A decoded event from the remote agent. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// The user's speech, transcribed.
    InputTranscribed { text: String },
    /// The assistant's spoken reply, transcribed.
    OutputTranscribed { text: String },
    /// A finished response, with the tool calls it requested in output order.
    ResponseCompleted { invocations: Vec<ToolInvocation> },
    TranscriptionFailed { message: String },
    GenericError { message: String },
}

/// One agent-issued request to run a named tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Parsed arguments. If the agent sent something that is not JSON, the
    /// raw text is kept as a string value and fails schema validation later.
    pub arguments: Value,
}

/// The prose outcome of one invocation, relayed verbatim to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub invocation_id: String,
    pub output: String,
}

impl ToolResult {
    pub fn new(invocation_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            output: output.into(),
        }
    }
}

/// What a single inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ProtocolEvent),
    /// Base64 PCM16 audio for the speaker. Never reaches the event stream.
    Audio(String),
    /// A recognised or unknown kind the session does not act on.
    Ignored,
}

/// Decodes one raw frame.
///
/// Unknown kinds come back as [`Inbound::Ignored`]; only frames that are not
/// valid JSON, or known kinds with a broken shape, are errors.
pub fn decode(raw: &str) -> Result<Inbound, CodecError> {
    let event: ServerEvent = serde_json::from_str(raw)?;
    let inbound = match event {
        ServerEvent::InputTranscriptionCompleted { transcript } => {
            Inbound::Event(ProtocolEvent::InputTranscribed { text: transcript })
        }
        ServerEvent::AudioTranscriptDone { transcript } => {
            Inbound::Event(ProtocolEvent::OutputTranscribed { text: transcript })
        }
        ServerEvent::InputTranscriptionFailed { error } => {
            Inbound::Event(ProtocolEvent::TranscriptionFailed {
                message: error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "transcription failed".to_string()),
            })
        }
        ServerEvent::Error { error } => Inbound::Event(ProtocolEvent::GenericError {
            message: error.message,
        }),
        ServerEvent::ResponseDone { response } => {
            Inbound::Event(ProtocolEvent::ResponseCompleted {
                invocations: invocations_from(response.output),
            })
        }
        ServerEvent::AudioDelta { delta } => Inbound::Audio(delta),
        ServerEvent::SessionCreated {} | ServerEvent::SessionUpdated {} | ServerEvent::Unknown => {
            Inbound::Ignored
        }
    };
    Ok(inbound)
}

fn invocations_from(output: Vec<OutputItem>) -> Vec<ToolInvocation> {
    let mut seen = HashSet::new();
    output
        .into_iter()
        .filter_map(|item| match item {
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => Some((call_id, name, arguments)),
            _ => None,
        })
        .filter(|(call_id, name, _)| {
            let fresh = seen.insert(call_id.clone());
            if !fresh {
                warn!(call_id = %call_id, tool = %name, "Duplicate call id in one response; keeping the first");
            }
            fresh
        })
        .map(|(id, name, arguments)| ToolInvocation {
            id,
            name,
            arguments: parse_arguments(arguments),
        })
        .collect()
}

fn parse_arguments(raw: String) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// The two messages that answer one invocation, in send order: the function
/// result, then the turn trigger. They are never merged.
pub fn reply_sequence(result: &ToolResult) -> [ClientEvent; 2] {
    [
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: result.invocation_id.clone(),
                output: result.output.clone(),
            },
        },
        ClientEvent::ResponseCreate,
    ]
}

pub fn encode(event: &ClientEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|source| CodecError::Encode {
        kind: event.kind(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(raw: &str) -> ProtocolEvent {
        match decode(raw).unwrap() {
            Inbound::Event(e) => e,
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_transcripts() {
        assert_eq!(
            event(r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i","content_index":0,"transcript":"show me buildings"}"#),
            ProtocolEvent::InputTranscribed { text: "show me buildings".into() }
        );
        assert_eq!(
            event(r#"{"type":"response.audio_transcript.done","transcript":"Looking now."}"#),
            ProtocolEvent::OutputTranscribed { text: "Looking now.".into() }
        );
    }

    #[test]
    fn test_decode_transcription_failed_without_detail() {
        assert_eq!(
            event(r#"{"type":"conversation.item.input_audio_transcription.failed","item_id":"i"}"#),
            ProtocolEvent::TranscriptionFailed { message: "transcription failed".into() }
        );
    }

    #[test]
    fn test_decode_response_done_extracts_calls_in_order() {
        let raw = json!({
            "type": "response.done",
            "response": {
                "output": [
                    {"type": "function_call", "call_id": "c1", "name": "zoom_map", "arguments": "{\"action\":\"zoom_in\"}"},
                    {"type": "message", "role": "assistant", "content": []},
                    {"type": "function_call", "call_id": "c2", "name": "extract_objects", "arguments": "{\"object_type\":\"trees\"}"}
                ]
            }
        })
        .to_string();
        let ProtocolEvent::ResponseCompleted { invocations } = event(&raw) else {
            panic!("expected response completed");
        };
        let ids: Vec<_> = invocations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
        assert_eq!(invocations[0].arguments, json!({"action": "zoom_in"}));
        assert_eq!(invocations[1].name, "extract_objects");
    }

    #[test]
    fn test_duplicate_call_ids_keep_first() {
        let raw = json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "call_id": "dup", "name": "zoom_map", "arguments": "{}"},
                {"type": "function_call", "call_id": "dup", "name": "export_data", "arguments": "{}"}
            ]}
        })
        .to_string();
        let ProtocolEvent::ResponseCompleted { invocations } = event(&raw) else {
            panic!("expected response completed");
        };
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "zoom_map");
    }

    #[test]
    fn test_unparseable_arguments_are_kept_raw() {
        let raw = json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "call_id": "c", "name": "locate_place", "arguments": "{not json"},
                {"type": "function_call", "call_id": "d", "name": "export_data", "arguments": ""}
            ]}
        })
        .to_string();
        let ProtocolEvent::ResponseCompleted { invocations } = event(&raw) else {
            panic!("expected response completed");
        };
        assert_eq!(invocations[0].arguments, Value::String("{not json".into()));
        assert_eq!(invocations[1].arguments, json!({}));
    }

    #[test]
    fn test_audio_delta_is_routed_separately() {
        assert_eq!(
            decode(r#"{"type":"response.output_audio.delta","delta":"AAAA"}"#).unwrap(),
            Inbound::Audio("AAAA".into())
        );
    }

    #[test]
    fn test_unknown_and_session_events_are_ignored() {
        assert_eq!(decode(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap(), Inbound::Ignored);
        assert_eq!(decode(r#"{"type":"session.created","session":{"id":"s"}}"#).unwrap(), Inbound::Ignored);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(matches!(decode("not json"), Err(CodecError::Malformed(_))));
        assert!(decode(r#"{"no_type":true}"#).is_err());
        assert!(decode(r#"{"type":"response.audio_transcript.done"}"#).is_err());
    }

    #[test]
    fn test_reply_sequence_is_result_then_trigger() {
        let [first, second] = reply_sequence(&ToolResult::new("call_9", "Zoomed to level 18."));
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            json!({
                "type": "conversation.item.create",
                "item": {"type": "function_call_output", "call_id": "call_9", "output": "Zoomed to level 18."}
            })
        );
        assert_eq!(second, ClientEvent::ResponseCreate);
        assert_eq!(encode(&second).unwrap(), r#"{"type":"response.create"}"#);
    }
}
