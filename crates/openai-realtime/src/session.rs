//! The transport session: one audio + data-channel connection and its lifecycle.

use crate::audio::{AudioDevices, AudioHandle, Playback};
use crate::credential::CredentialSource;
use crate::error::TransportError;
use crate::negotiate::{Connection, NegotiatedLink, Negotiator};
use openai_realtime_types::client::{ClientEvent, SessionConfig};
use openai_realtime_types::{Inbound, decode, encode};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedMutexGuard, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportSettings {
    /// Case-insensitive name fragment of the preferred microphone.
    pub input_device: Option<String>,
    /// Sent as `session.update` once the link is open.
    pub session: SessionConfig,
}

struct Shared {
    status: watch::Sender<ConnectionStatus>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn set(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    fn last_error(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fail(&self, err: &TransportError) {
        *self.last_error() = Some(format!("{} {}", err, err.guidance()));
        self.set(ConnectionStatus::Error);
    }

    /// `connected → error`. Any other state is left alone.
    fn lose(&self, reason: &str) {
        let lost = self.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Connected {
                *status = ConnectionStatus::Error;
                true
            } else {
                false
            }
        });
        if lost {
            let err = TransportError::ConnectionLost(reason.to_string());
            warn!(error = %err, "Transport session lost");
            *self.last_error() = Some(format!("{} {}", err, err.guidance()));
        }
    }
}

/// The outbound half of the data channel and the tasks feeding it.
struct DataChannel {
    outbound: mpsc::Sender<String>,
    router: JoinHandle<()>,
    forwarder: Option<JoinHandle<()>>,
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        self.router.abort();
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
    }
}

/// Everything an open session holds. Field order is release order.
struct LiveSession {
    channel: DataChannel,
    audio: AudioHandle,
    connection: Connection,
}

/// Owns one realtime connection at a time.
///
/// Frames that are not agent audio are handed to the caller of
/// [`TransportSession::connect`] as raw text; decoding them is the caller's job.
pub struct TransportSession {
    credentials: Arc<dyn CredentialSource>,
    negotiator: Arc<dyn Negotiator>,
    devices: Arc<dyn AudioDevices>,
    settings: TransportSettings,
    shared: Arc<Shared>,
    live: Mutex<Option<LiveSession>>,
    /// Bumped by every `connect` and `disconnect`; an attempt whose number is
    /// no longer current gives up.
    generation: watch::Sender<u64>,
    /// Held by the running attempt until everything it acquired is released.
    attempt_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TransportSession {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        negotiator: Arc<dyn Negotiator>,
        devices: Arc<dyn AudioDevices>,
        settings: TransportSettings,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (generation, _) = watch::channel(0);
        Self {
            credentials,
            negotiator,
            devices,
            settings,
            shared: Arc::new(Shared {
                status,
                last_error: Mutex::new(None),
            }),
            live: Mutex::new(None),
            generation,
            attempt_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error().clone()
    }

    /// Acquires audio, fetches a credential, negotiates the link and sends
    /// the session configuration.
    ///
    /// Returns the stream of inbound non-audio frames. It ends when the
    /// session is disconnected or lost. On failure, everything acquired so
    /// far is released before the error is returned; the same holds when the
    /// returned future is dropped midway.
    ///
    /// A later `connect` or a `disconnect` cancels an attempt still in
    /// progress, which then returns [`TransportError::Superseded`]. A new
    /// attempt only acquires the microphone once the previous one has
    /// released it.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<mpsc::Receiver<String>, TransportError> {
        let attempt = {
            let _live = self.lock_live();
            let attempt = self.next_generation();
            *self.shared.last_error() = None;
            self.shared.set(ConnectionStatus::Connecting);
            attempt
        };
        let mut generation = self.generation.subscribe();
        tokio::select! {
            biased;
            _ = generation.wait_for(|current| *current != attempt) => {
                debug!(attempt, "Connection attempt superseded");
                Err(TransportError::Superseded)
            }
            result = self.run_attempt(attempt) => result,
        }
    }

    async fn run_attempt(&self, attempt: u64) -> Result<mpsc::Receiver<String>, TransportError> {
        let turn = self.attempt_lock.clone().lock_owned().await;
        {
            let mut live = self.lock_live();
            if !self.is_current(attempt) {
                return Err(TransportError::Superseded);
            }
            if let Some(stale) = live.take() {
                warn!("Releasing a previous session before connecting");
                drop(stale);
            }
        }

        let established = self.establish(turn).await;

        let mut live = self.lock_live();
        if !self.is_current(attempt) {
            return Err(TransportError::Superseded);
        }
        match established {
            Ok((session, events, _turn)) => {
                info!(device = %session.audio.device_name(), "Transport session connected");
                *live = Some(session);
                self.shared.set(ConnectionStatus::Connected);
                Ok(events)
            }
            Err(e) => {
                error!(error = %e, "Transport session failed to connect");
                self.shared.fail(&e);
                Err(e)
            }
        }
    }

    /// On success `turn` is handed back with the session. On failure or
    /// cancellation everything acquired here is dropped before it is released.
    async fn establish(
        &self,
        turn: OwnedMutexGuard<()>,
    ) -> Result<(LiveSession, mpsc::Receiver<String>, OwnedMutexGuard<()>), TransportError> {
        let devices = self.devices.clone();
        let requested = self.settings.input_device.clone();
        // A cancelled attempt keeps the guard until the device it opened is closed.
        let (opened, turn) =
            tokio::task::spawn_blocking(move || (devices.open(requested.as_deref()), turn))
                .await
                .map_err(|e| TransportError::PermissionDenied(e.to_string()))?;
        let mut audio = opened?;

        let credential = self.credentials.fetch().await?;
        let NegotiatedLink {
            outbound,
            inbound,
            connection,
        } = self.negotiator.negotiate(&credential).await?;

        let update = encode(&ClientEvent::SessionUpdate {
            session: self.settings.session.clone(),
        })
        .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        outbound.send(update).await.map_err(|_| {
            TransportError::NegotiationFailed("link closed before configuration".to_string())
        })?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let router = tokio::spawn(route_inbound(
            inbound,
            audio.playback(),
            events_tx,
            self.shared.clone(),
        ));
        let forwarder = audio
            .take_capture()
            .map(|capture| tokio::spawn(forward_capture(capture, outbound.clone())));

        let live = LiveSession {
            channel: DataChannel {
                outbound,
                router,
                forwarder,
            },
            audio,
            connection,
        };
        Ok((live, events_rx, turn))
    }

    /// Releases the data channel, the audio devices and the connection, in
    /// that order, and cancels a connection attempt still in progress. Safe
    /// to call in any state.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        let live = {
            let mut live = self.lock_live();
            self.next_generation();
            self.shared.set(ConnectionStatus::Disconnected);
            live.take()
        };
        if let Some(live) = live {
            let LiveSession {
                channel,
                audio,
                connection,
            } = live;
            drop(channel);
            drop(audio);
            drop(connection);
            info!("Transport session closed");
        }
    }

    /// Sends one event over the data channel.
    ///
    /// Dropped without error when the channel is not open; the return value
    /// tells whether it was handed to the connection.
    pub async fn send(&self, event: &ClientEvent) -> bool {
        let outbound = self
            .lock_live()
            .as_ref()
            .map(|live| live.channel.outbound.clone());
        let Some(outbound) = outbound else {
            debug!(kind = event.kind(), "Data channel not open, dropping event");
            return false;
        };
        let text = match encode(event) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode outbound event");
                return false;
            }
        };
        if outbound.send(text).await.is_err() {
            debug!(kind = event.kind(), "Data channel closed, dropping event");
            return false;
        }
        true
    }

    fn next_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        next
    }

    fn is_current(&self, attempt: u64) -> bool {
        *self.generation.borrow() == attempt
    }

    fn lock_live(&self) -> MutexGuard<'_, Option<LiveSession>> {
        self.live.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn route_inbound(
    mut inbound: mpsc::Receiver<String>,
    playback: Playback,
    events: mpsc::Sender<String>,
    shared: Arc<Shared>,
) {
    while let Some(frame) = inbound.recv().await {
        if let Ok(Inbound::Audio(delta)) = decode(&frame) {
            playback.play(delta);
            continue;
        }
        if events.send(frame).await.is_err() {
            debug!("No event consumer, dropping frame");
        }
    }
    shared.lose("connection closed by remote");
}

async fn forward_capture(mut capture: mpsc::Receiver<String>, outbound: mpsc::Sender<String>) {
    while let Some(audio) = capture.recv().await {
        let text = match encode(&ClientEvent::InputAudioBufferAppend { audio }) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode captured audio");
                continue;
            }
        };
        if outbound.send(text).await.is_err() {
            break;
        }
    }
}
