//! What the agent is told when a session opens.

use crate::config::Config;
use geovoice_core::MapTools;
use openai_realtime_types::client::{AudioTranscription, SessionConfig, TurnDetection};

const INSTRUCTIONS: &str = "\
You are a voice assistant that controls a satellite map for geospatial analysis. \
Use locate_place to move the map to a place the user names. \
Use extract_objects to detect and outline objects such as buildings, trees, cars or roads in the current view. \
Use zoom_map to zoom in, zoom out or go to a specific zoom level. \
Use export_data when the user wants to download the detected objects. \
Keep spoken replies short and report the outcome of every tool call, including failures.";

/// The `session.update` payload for a new session.
pub fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        instructions: Some(INSTRUCTIONS.to_string()),
        voice: Some(config.realtime_voice.clone()),
        modalities: vec!["audio".to_string(), "text".to_string()],
        input_audio_transcription: Some(AudioTranscription {
            model: config.transcription_model.clone(),
        }),
        turn_detection: Some(TurnDetection::ServerVad {
            threshold: config.vad.threshold,
            prefix_padding_ms: config.vad.prefix_padding_ms,
            silence_duration_ms: config.vad.silence_duration_ms,
        }),
        tools: MapTools::declarations(),
        tool_choice: Some("auto".to_string()),
    }
}
