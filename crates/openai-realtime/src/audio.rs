//! Microphone and speaker access.
//!
//! `cpal` streams are not `Send`, so they live on a dedicated thread that the
//! [`AudioHandle`] owns. Captured audio leaves that thread as base64 PCM16
//! chunks ready for `input_audio_buffer.append`; agent audio enters it the
//! same way.

use crate::error::TransportError;
use crate::pcm::{self, REALTIME_SAMPLE_RATE, StreamResampler};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Name fragments of virtual, loopback and monitor devices.
pub const VIRTUAL_DEVICE_PATTERNS: &[&str] = &[
    "virtual",
    "loopback",
    "blackhole",
    "soundflower",
    "stereo mix",
    "vb-audio",
    "cable",
    "monitor of",
];

/// 100 ms of realtime audio per append.
const CAPTURE_CHUNK: usize = (REALTIME_SAMPLE_RATE / 10) as usize;
const RESAMPLER_CHUNK: usize = 480;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn is_virtual_device(name: &str) -> bool {
    let name = name.to_lowercase();
    VIRTUAL_DEVICE_PATTERNS.iter().any(|p| name.contains(p))
}

/// Picks an input device by index.
///
/// An explicitly requested name wins. Otherwise the first physical device is
/// chosen. `None` means "use the platform default".
pub fn select_input_device(available: &[String], requested: Option<&str>) -> Option<usize> {
    if let Some(requested) = requested.map(str::to_lowercase) {
        if let Some(i) = available.iter().position(|n| n.to_lowercase().contains(&requested)) {
            return Some(i);
        }
        warn!(%requested, "Requested input device not found");
    }
    available.iter().position(|n| !is_virtual_device(n))
}

/// Releases a device acquisition exactly once, when dropped.
pub struct DeviceLease(Option<Box<dyn FnOnce() + Send>>);

impl DeviceLease {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Queues base64 PCM16 for the speaker.
#[derive(Clone)]
pub struct Playback(std_mpsc::Sender<String>);

impl Playback {
    pub fn new(sender: std_mpsc::Sender<String>) -> Self {
        Self(sender)
    }

    pub fn play(&self, delta: String) {
        if self.0.send(delta).is_err() {
            debug!("Speaker released, dropping audio");
        }
    }
}

/// An acquired microphone and speaker. Dropping it releases both.
pub struct AudioHandle {
    device_name: String,
    capture: Option<mpsc::Receiver<String>>,
    playback: Playback,
    _lease: DeviceLease,
}

impl AudioHandle {
    pub fn new(
        device_name: impl Into<String>,
        capture: mpsc::Receiver<String>,
        playback: Playback,
        lease: DeviceLease,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            capture: Some(capture),
            playback,
            _lease: lease,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The captured audio stream. Available once.
    pub fn take_capture(&mut self) -> Option<mpsc::Receiver<String>> {
        self.capture.take()
    }

    pub fn playback(&self) -> Playback {
        self.playback.clone()
    }
}

pub trait AudioDevices: Send + Sync {
    /// Acquires the microphone and speaker. Blocks until both are running.
    fn open(&self, requested: Option<&str>) -> Result<AudioHandle, TransportError>;
}

/// Host audio through `cpal`.
#[derive(Default)]
pub struct CpalAudioDevices;

impl AudioDevices for CpalAudioDevices {
    fn open(&self, requested: Option<&str>) -> Result<AudioHandle, TransportError> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (capture_tx, capture_rx) = mpsc::channel::<String>(64);
        let (play_tx, play_rx) = std_mpsc::channel::<String>();
        let requested = requested.map(str::to_string);

        let thread = std::thread::Builder::new()
            .name("audio-io".into())
            .spawn(move || run_device_thread(requested, capture_tx, play_rx, stop_rx, ready_tx))
            .map_err(|e| TransportError::PermissionDenied(e.to_string()))?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(TransportError::PermissionDenied(
                    "audio thread exited during setup".to_string(),
                ));
            }
        };
        info!(device = %device_name, "Microphone acquired");

        let lease = DeviceLease::new(move || {
            let _ = stop_tx.send(());
            let _ = thread.join();
        });
        Ok(AudioHandle::new(device_name, capture_rx, Playback::new(play_tx), lease))
    }
}

struct DeviceStreams {
    device_name: String,
    _input: cpal::Stream,
    _output: Option<cpal::Stream>,
    mic: HeapCons<f32>,
    mic_rate: u32,
    speaker: Option<(HeapProd<f32>, u32)>,
}

fn run_device_thread(
    requested: Option<String>,
    capture_tx: mpsc::Sender<String>,
    play_rx: std_mpsc::Receiver<String>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: std_mpsc::SyncSender<Result<String, TransportError>>,
) {
    let mut streams = match open_streams(requested.as_deref()) {
        Ok(streams) => streams,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let mut capture_resampler = match StreamResampler::new(streams.mic_rate, REALTIME_SAMPLE_RATE, RESAMPLER_CHUNK) {
        Ok(r) => r,
        Err(e) => {
            let _ = ready_tx.send(Err(TransportError::PermissionDenied(e.to_string())));
            return;
        }
    };
    let mut playback_resampler = streams
        .speaker
        .as_ref()
        .and_then(|(_, rate)| StreamResampler::new(REALTIME_SAMPLE_RATE, *rate, RESAMPLER_CHUNK).ok());
    let _ = ready_tx.send(Ok(streams.device_name.clone()));

    let mut captured: Vec<f32> = Vec::with_capacity(CAPTURE_CHUNK * 2);
    let mut scratch = vec![0.0f32; 4096];
    loop {
        match stop_rx.recv_timeout(POLL_INTERVAL) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        loop {
            let n = streams.mic.pop_slice(&mut scratch);
            if n == 0 {
                break;
            }
            captured.extend(capture_resampler.push(&scratch[..n]));
        }
        while captured.len() >= CAPTURE_CHUNK {
            let chunk: Vec<f32> = captured.drain(..CAPTURE_CHUNK).collect();
            match capture_tx.try_send(pcm::encode_f32_to_base64_i16(&chunk)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => warn!("Capture queue full, dropping audio"),
                Err(mpsc::error::TrySendError::Closed(_)) => captured.clear(),
            }
        }

        while let Ok(delta) = play_rx.try_recv() {
            if let (Some((speaker, _)), Some(resampler)) = (streams.speaker.as_mut(), playback_resampler.as_mut()) {
                let samples = resampler.push(&pcm::decode_f32_from_base64_i16(&delta));
                let written = speaker.push_slice(&samples);
                if written < samples.len() {
                    debug!(dropped = samples.len() - written, "Playback buffer full");
                }
            }
        }
    }
    drop(streams);
    info!("Microphone and speaker released");
}

fn device_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::PermissionDenied(e.to_string())
}

fn open_streams(requested: Option<&str>) -> Result<DeviceStreams, TransportError> {
    let host = cpal::default_host();
    let mut devices: Vec<(String, cpal::Device)> = host
        .input_devices()
        .map(|it| it.filter_map(|d| d.name().ok().map(|n| (n, d))).collect())
        .unwrap_or_default();
    let names: Vec<String> = devices.iter().map(|(n, _)| n.clone()).collect();

    let input = match select_input_device(&names, requested) {
        Some(i) => devices.swap_remove(i).1,
        None => host
            .default_input_device()
            .ok_or_else(|| device_error("no audio input device available"))?,
    };
    let device_name = input.name().unwrap_or_else(|_| "unknown".to_string());
    let supported = input.default_input_config().map_err(device_error)?;
    let config = supported.config();
    let channels = config.channels as usize;
    let (mic_prod, mic) = HeapRb::<f32>::new(config.sample_rate.0 as usize * 2).split();
    let input_stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&input, &config, channels, mic_prod),
        cpal::SampleFormat::I16 => build_input::<i16>(&input, &config, channels, mic_prod),
        cpal::SampleFormat::U16 => build_input::<u16>(&input, &config, channels, mic_prod),
        other => return Err(device_error(format!("unsupported input sample format {:?}", other))),
    }
    .map_err(device_error)?;
    input_stream.play().map_err(device_error)?;

    let (output_stream, speaker) = match open_output() {
        Ok((stream, producer, rate)) => (Some(stream), Some((producer, rate))),
        Err(e) => {
            warn!(error = %e, "No speaker available, agent audio will not be played");
            (None, None)
        }
    };

    Ok(DeviceStreams {
        device_name,
        _input: input_stream,
        _output: output_stream,
        mic,
        mic_rate: config.sample_rate.0,
        speaker,
    })
}

fn open_output() -> Result<(cpal::Stream, HeapProd<f32>, u32), TransportError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| device_error("no audio output device available"))?;
    let supported = device.default_output_config().map_err(device_error)?;
    let config = supported.config();
    let (producer, consumer) = HeapRb::<f32>::new(config.sample_rate.0 as usize * 30).split();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, consumer),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, consumer),
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, consumer),
        other => return Err(device_error(format!("unsupported output sample format {:?}", other))),
    }
    .map_err(device_error)?;
    stream.play().map_err(device_error)?;
    Ok((stream, producer, config.sample_rate.0))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut producer: HeapProd<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut interleaved: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            interleaved.clear();
            interleaved.extend(data.iter().map(|s| s.to_sample::<f32>()));
            producer.push_slice(&pcm::downmix(&interleaved, channels));
        },
        |e| warn!(error = %e, "Input stream error"),
        None,
    )
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let value = consumer.try_pop().unwrap_or(0.0);
                for sample in frame.iter_mut() {
                    *sample = T::from_sample(value);
                }
            }
        },
        |e| warn!(error = %e, "Output stream error"),
        None,
    )
}
