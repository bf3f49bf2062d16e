//! Energy-based Voice Activity Detection (VAD).

use chalk_core::config::VadConfig;

/// Speech boundary reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechActivity {
    Started,
    Ended,
}

/// Voice Activity Detector using RMS energy threshold on 16-bit PCM.
pub struct VoiceActivityDetector {
    /// RMS threshold for speech detection.
    threshold: f64,
    /// Minimum consecutive silent frames before declaring speech end.
    min_silent_frames: usize,
    speech_active: bool,
    silent_count: usize,
    /// Samples per analysis frame.
    frame_size: usize,
    /// Samples waiting for a full frame.
    pending: Vec<i16>,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f64, min_silent_frames: usize, sample_rate: u32) -> Self {
        Self {
            threshold,
            min_silent_frames: min_silent_frames.max(1),
            speech_active: false,
            silent_count: 0,
            frame_size: (sample_rate as usize / 50).max(1), // 20ms frames
            pending: Vec::new(),
        }
    }

    pub fn from_config(config: &VadConfig, sample_rate: u32) -> Self {
        Self::new(config.threshold, config.min_silent_frames, sample_rate)
    }

    /// Compute RMS energy of a PCM frame.
    pub fn rms(samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    /// Process a single audio frame.
    pub fn process_frame(&mut self, pcm: &[i16]) -> Option<SpeechActivity> {
        let is_speech = Self::rms(pcm) > self.threshold;

        if is_speech {
            self.silent_count = 0;
            if !self.speech_active {
                self.speech_active = true;
                return Some(SpeechActivity::Started);
            }
        } else if self.speech_active {
            self.silent_count += 1;
            if self.silent_count >= self.min_silent_frames {
                self.speech_active = false;
                self.silent_count = 0;
                return Some(SpeechActivity::Ended);
            }
        }

        None
    }

    /// Feed an arbitrarily sized chunk; complete frames are analysed and the
    /// remainder is kept for the next call.
    pub fn process(&mut self, samples: &[i16]) -> Vec<SpeechActivity> {
        self.pending.extend_from_slice(samples);
        let mut changes = Vec::new();
        while self.pending.len() >= self.frame_size {
            let frame: Vec<i16> = self.pending.drain(..self.frame_size).collect();
            if let Some(change) = self.process_frame(&frame) {
                changes.push(change);
            }
        }
        changes
    }

    pub fn is_active(&self) -> bool {
        self.speech_active
    }

    pub fn reset(&mut self) {
        self.speech_active = false;
        self.silent_count = 0;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_calculation() {
        let silence = vec![0i16; 320];
        assert_eq!(VoiceActivityDetector::rms(&silence), 0.0);

        let signal = vec![100i16; 320];
        let rms = VoiceActivityDetector::rms(&signal);
        assert!((rms - 100.0).abs() < 0.01);

        assert_eq!(VoiceActivityDetector::rms(&[]), 0.0);
    }

    #[test]
    fn test_vad_transitions() {
        let mut vad = VoiceActivityDetector::new(50.0, 3, 16_000);

        let silence = vec![0i16; 320];
        assert_eq!(vad.process_frame(&silence), None);

        let speech = vec![500i16; 320];
        assert_eq!(vad.process_frame(&speech), Some(SpeechActivity::Started));
        assert_eq!(vad.process_frame(&speech), None);

        // Speech ends after the third silent frame.
        assert_eq!(vad.process_frame(&silence), None);
        assert_eq!(vad.process_frame(&silence), None);
        assert_eq!(vad.process_frame(&silence), Some(SpeechActivity::Ended));
        assert!(!vad.is_active());
    }

    #[test]
    fn test_chunked_input_is_framed() {
        // 24kHz -> 480 samples per frame.
        let mut vad = VoiceActivityDetector::new(50.0, 2, 24_000);
        assert!(vad.process(&[500i16; 300]).is_empty());
        assert_eq!(vad.process(&[500i16; 300]), vec![SpeechActivity::Started]);
        assert_eq!(vad.process(&[0i16; 960 + 360]), vec![SpeechActivity::Ended]);
    }

    #[test]
    fn test_vad_reset() {
        let mut vad = VoiceActivityDetector::from_config(&VadConfig::default(), 16_000);
        let speech = vec![5000i16; 320];
        vad.process_frame(&speech);
        assert!(vad.is_active());
        vad.reset();
        assert!(!vad.is_active());
    }
}
