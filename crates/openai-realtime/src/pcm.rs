//! PCM16 wire audio helpers.
//!
//! The realtime agent exchanges mono 24 kHz little-endian PCM16, base64
//! encoded. Devices run at whatever rate and channel count they prefer.

use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

pub const REALTIME_SAMPLE_RATE: u32 = 24_000;

/// Creates a mono resampler between two sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Averages interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Decodes base64 PCM16 into samples in `[-1.0, 1.0]`. Invalid input yields nothing.
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16_bytes) => pcm16_bytes
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable audio fragment");
            Vec::new()
        }
    }
}

pub fn encode_f32_to_base64_i16(samples: &[f32]) -> String {
    let pcm16: Vec<u8> = samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Streams audio of arbitrary chunk sizes through a fixed-input resampler.
///
/// Input is buffered until a full resampler chunk is available. Equal rates
/// pass samples through unchanged.
pub struct StreamResampler {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate as f64, out_rate as f64, chunk_size)?)
        };
        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut frames) => out.append(&mut frames[0]),
                Err(e) => {
                    tracing::warn!(error = %e, "Resampling failed, dropping chunk");
                }
            }
        }
        out
    }
}
