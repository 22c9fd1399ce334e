//! Fakes shared by the unit tests of this crate.

use crate::config::{Config, VadConfig};
use crate::controller::SessionController;
use async_trait::async_trait;
use geovoice_core::ToolExecutor;
use openai_realtime::audio::{DeviceLease, Playback};
use openai_realtime::negotiate::Connection;
use openai_realtime::{
    AudioDevices, AudioHandle, CredentialSource, EphemeralCredential, NegotiatedLink, Negotiator,
    TransportError, TransportSession, TransportSettings,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;

pub fn test_config() -> Config {
    Config {
        backend_url: "http://localhost:8000".into(),
        realtime_model: "gpt-realtime".into(),
        realtime_voice: "alloy".into(),
        transcription_model: "whisper-1".into(),
        vad: VadConfig {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        },
        move_settle_timeout: Duration::from_millis(3000),
        negotiation_timeout: Duration::from_secs(10),
        geocoder_url: "http://localhost:9/search".into(),
        capture_image_path: None,
        export_dir: PathBuf::from("."),
        input_device: None,
        log_level: Level::INFO,
    }
}

/// Answers every tool call with `ran <name>`.
#[derive(Default)]
pub struct ScriptedTools;

#[async_trait]
impl ToolExecutor for ScriptedTools {
    async fn call(&self, name: &str, _arguments: Value) -> Result<String, String> {
        Ok(format!("ran {}", name))
    }
}

/// The agent's end of one negotiated link.
pub struct FakeLink {
    to_client: mpsc::Sender<String>,
    from_client: mpsc::Receiver<String>,
}

impl FakeLink {
    pub async fn push(&self, frame: &str) {
        self.to_client.send(frame.to_string()).await.unwrap();
    }

    pub async fn next(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("link closed");
        serde_json::from_str(&frame).unwrap()
    }

    pub async fn expect_kind(&mut self, kind: &str) {
        assert_eq!(self.next().await["type"], kind);
    }

    /// A frame already sent by the client, if any.
    pub fn try_next(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

/// Microphone, credential backend and agent in one.
#[derive(Default)]
pub struct FakeBackend {
    microphones: Arc<AtomicUsize>,
    peak_microphones: AtomicUsize,
    fail_credentials: AtomicBool,
    hold_negotiation: AtomicBool,
    links: Mutex<Vec<FakeLink>>,
}

impl FakeBackend {
    pub fn take(&self) -> FakeLink {
        self.links.lock().unwrap().pop().expect("no link negotiated")
    }

    pub fn microphones_held(&self) -> usize {
        self.microphones.load(Ordering::SeqCst)
    }

    /// The most microphones ever held at once.
    pub fn peak_microphones(&self) -> usize {
        self.peak_microphones.load(Ordering::SeqCst)
    }

    pub fn fail_credentials(&self) {
        self.fail_credentials.store(true, Ordering::SeqCst);
    }

    pub fn restore_credentials(&self) {
        self.fail_credentials.store(false, Ordering::SeqCst);
    }

    pub fn hold_negotiation(&self) {
        self.hold_negotiation.store(true, Ordering::SeqCst);
    }
}

impl AudioDevices for FakeBackend {
    fn open(&self, _requested: Option<&str>) -> Result<AudioHandle, TransportError> {
        let now = self.microphones.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_microphones.fetch_max(now, Ordering::SeqCst);
        let held = self.microphones.clone();
        let (_capture_tx, capture_rx) = mpsc::channel(1);
        let (play_tx, _play_rx) = std::sync::mpsc::channel();
        Ok(AudioHandle::new(
            "Fake Mic",
            capture_rx,
            Playback::new(play_tx),
            DeviceLease::new(move || {
                held.fetch_sub(1, Ordering::SeqCst);
            }),
        ))
    }
}

#[async_trait]
impl CredentialSource for FakeBackend {
    async fn fetch(&self) -> Result<EphemeralCredential, TransportError> {
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(TransportError::CredentialError("backend returned 502".into()));
        }
        Ok(EphemeralCredential {
            token: "ek_test".to_string().into(),
            expires_at: 0,
            realtime_url: "https://example.invalid/v1/realtime".into(),
            model: "gpt-realtime".into(),
        })
    }
}

#[async_trait]
impl Negotiator for FakeBackend {
    async fn negotiate(&self, _credential: &EphemeralCredential) -> Result<NegotiatedLink, TransportError> {
        if self.hold_negotiation.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        self.links.lock().unwrap().push(FakeLink {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(NegotiatedLink {
            outbound: out_tx,
            inbound: in_rx,
            connection: Connection::new(tokio::spawn(std::future::pending::<()>())),
        })
    }
}

/// A controller over a fake transport, plus the handle that drives the fake.
pub fn fake_transport() -> (SessionController, Arc<FakeBackend>) {
    fake_transport_with(Arc::new(ScriptedTools))
}

pub fn fake_transport_with(tools: Arc<dyn ToolExecutor>) -> (SessionController, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::default());
    let transport = TransportSession::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        TransportSettings::default(),
    );
    let controller = SessionController::new(Arc::new(transport), tools);
    (controller, backend)
}
