//! Events received from the realtime agent, as they appear on the wire.
//!
//! Only the kinds the session acts on are modelled. Everything else lands in
//! [`ServerEvent::Unknown`] so that new protocol events never break decoding.

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    InputTranscriptionFailed {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },
    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone { transcript: String },
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseResource },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

/// One entry of a completed response's `output` array.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    FunctionCall {
        call_id: String,
        name: String,
        /// JSON-encoded arguments, as a string.
        #[serde(default)]
        arguments: String,
    },
    Message {},
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
