//! Local audio output as an explicit, swappable resource.

use tracing::trace;

/// Where remote speech is played.
///
/// `reset` discards everything buffered and leaves the sink detached; audio
/// is only accepted again after `attach`.
pub trait OutputSink: Send {
    fn mute(&mut self);

    fn reset(&mut self);

    fn attach(&mut self);

    fn play(&mut self, samples: &[i16]);

    fn is_muted(&self) -> bool;
}

/// In-memory sink that queues accepted samples.
#[derive(Debug, Default, Clone)]
pub struct PlaybackBuffer {
    queued: Vec<i16>,
    muted: bool,
    detached: bool,
    resets: usize,
    dropped: usize,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> &[i16] {
        &self.queued
    }

    /// Hand queued samples to a consumer.
    pub fn take_queued(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.queued)
    }

    pub fn is_attached(&self) -> bool {
        !self.detached
    }

    /// Number of times the buffer was flushed.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Samples rejected while muted or detached.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn to_wav(&self, sample_rate: u32) -> Vec<u8> {
        pcm_to_wav(&self.queued, sample_rate, 1, 16)
    }
}

impl OutputSink for PlaybackBuffer {
    fn mute(&mut self) {
        self.muted = true;
    }

    fn reset(&mut self) {
        self.dropped += self.queued.len();
        self.queued.clear();
        self.detached = true;
        self.resets += 1;
    }

    fn attach(&mut self) {
        self.detached = false;
        self.muted = false;
    }

    fn play(&mut self, samples: &[i16]) {
        if self.muted || self.detached {
            trace!(samples = samples.len(), "Output inactive, dropping audio");
            self.dropped += samples.len();
            return;
        }
        self.queued.extend_from_slice(samples);
    }

    fn is_muted(&self) -> bool {
        self.muted
    }
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2;
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}
