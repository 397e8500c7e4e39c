// Tempo change without pitch shift
// WSOLA: overlapping sequences are cut from the input at the speed-scaled
// rate and cross-faded at the offset where the waveforms line up best.

use crate::error::BackendError;

/// Slowest accepted tempo offset in percent (5% of natural speed)
pub const TEMPO_MIN: i32 = -95;
/// Fastest accepted tempo offset in percent (6x natural speed)
pub const TEMPO_MAX: i32 = 500;

const SEQUENCE_MS: usize = 40;
const SEEK_WINDOW_MS: usize = 15;
const OVERLAP_MS: usize = 8;

/// Playback speed ratio for a tempo offset in percent
pub fn tempo_ratio(percent: i32) -> f64 {
    1.0 + percent as f64 / 100.0
}

pub fn check_tempo(percent: i32) -> Result<(), BackendError> {
    if (TEMPO_MIN..=TEMPO_MAX).contains(&percent) {
        Ok(())
    } else {
        Err(BackendError::TempoOutOfRange(percent))
    }
}

pub struct TempoStretcher {
    channels: usize,
    ratio: f64,
    sequence: usize,
    seek_window: usize,
    overlap: usize,
    /// Interleaved input not yet consumed
    input: Vec<f32>,
    /// Tail of the previous sequence, cross-faded into the next one
    mid: Vec<f32>,
    skip_fract: f64,
}

impl TempoStretcher {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let frames = |ms: usize| (sample_rate as usize * ms / 1000).max(1);
        Self {
            channels: channels.max(1),
            ratio: 1.0,
            sequence: frames(SEQUENCE_MS),
            seek_window: frames(SEEK_WINDOW_MS),
            overlap: frames(OVERLAP_MS),
            input: Vec::new(),
            mid: Vec::new(),
            skip_fract: 0.0,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn set_tempo(&mut self, percent: i32) -> Result<(), BackendError> {
        check_tempo(percent)?;
        self.ratio = tempo_ratio(percent);
        Ok(())
    }

    fn is_bypass(&self) -> bool {
        (self.ratio - 1.0).abs() < f64::EPSILON
    }

    /// Input frames held back waiting for a full sequence
    pub fn buffered_frames(&self) -> usize {
        self.input.len() / self.channels
    }

    /// Drop all buffered audio, used after seeks
    pub fn clear(&mut self) {
        self.input.clear();
        self.mid.clear();
        self.skip_fract = 0.0;
    }

    /// Feed interleaved samples, returns whatever output is ready
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.is_bypass() {
            if self.input.is_empty() && self.mid.is_empty() {
                return samples.to_vec();
            }
            // Coming back to natural speed: drain what is held, then bypass
            let mut out = self.flush();
            out.extend_from_slice(samples);
            return out;
        }

        self.input.extend_from_slice(samples);
        let ch = self.channels;
        let nominal_skip = self.ratio * (self.sequence - self.overlap) as f64;
        let required = (nominal_skip.ceil() as usize).max(self.sequence + self.seek_window);

        let mut out = Vec::new();
        while self.buffered_frames() >= required {
            let offset = if self.mid.is_empty() {
                0
            } else {
                self.best_offset()
            };

            let ovl_start = offset * ch;
            let ovl_end = (offset + self.overlap) * ch;
            if self.mid.is_empty() {
                out.extend_from_slice(&self.input[ovl_start..ovl_end]);
            } else {
                for frame in 0..self.overlap {
                    let t = frame as f32 / self.overlap as f32;
                    for c in 0..ch {
                        let a = self.mid[frame * ch + c];
                        let b = self.input[ovl_start + frame * ch + c];
                        out.push(a * (1.0 - t) + b * t);
                    }
                }
            }

            let tail_start = (offset + self.sequence - self.overlap) * ch;
            let tail_end = (offset + self.sequence) * ch;
            out.extend_from_slice(&self.input[ovl_end..tail_start]);
            self.mid.clear();
            self.mid.extend_from_slice(&self.input[tail_start..tail_end]);

            self.skip_fract += nominal_skip;
            let skip = self.skip_fract.floor();
            self.skip_fract -= skip;
            let skip = (skip as usize).min(self.buffered_frames());
            self.input.drain(..skip * ch);
        }
        out
    }

    /// Emit everything still buffered without stretching
    pub fn flush(&mut self) -> Vec<f32> {
        let mut out = std::mem::take(&mut self.mid);
        out.append(&mut self.input);
        self.skip_fract = 0.0;
        out
    }

    /// Offset in `0..seek_window` where the input lines up best with `mid`
    fn best_offset(&self) -> usize {
        let ch = self.channels;
        let mono = |buf: &[f32], frame: usize| -> f32 {
            buf[frame * ch..frame * ch + ch].iter().sum::<f32>()
        };
        let reference: Vec<f32> = (0..self.overlap).map(|i| mono(&self.mid, i)).collect();

        let mut best = 0;
        let mut best_score = f32::MIN;
        for offset in 0..self.seek_window {
            let mut corr = 0.0f32;
            let mut energy = 1e-9f32;
            for (i, r) in reference.iter().enumerate() {
                let s = mono(&self.input, offset + i);
                corr += r * s;
                energy += s * s;
            }
            let score = corr / energy.sqrt();
            if score > best_score {
                best_score = score;
                best = offset;
            }
        }
        best
    }
}
