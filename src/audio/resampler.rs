// Streaming sample rate conversion using rubato
// Converts decoded audio to the output device rate in fixed-size chunks.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::BackendError;

const CHUNK_FRAMES: usize = 1024;

pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    channels: usize,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    /// `None` when no conversion is needed
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Option<Self>, BackendError> {
        if input_rate == output_rate {
            return Ok(None);
        }
        debug!("Resampling {} Hz -> {} Hz ({} ch)", input_rate, output_rate, channels);

        let inner = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| BackendError::Output(format!("failed to create resampler: {}", e)))?;

        Ok(Some(Self {
            inner,
            channels,
            pending: vec![Vec::new(); channels],
        }))
    }

    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, BackendError> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (plane, &sample) in self.pending.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }

        let mut out = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();
            let planar = self
                .inner
                .process(&chunk, None)
                .map_err(|e| BackendError::Output(format!("resampling failed: {}", e)))?;
            interleave_into(&planar, &mut out);
        }
        Ok(out)
    }

    /// Convert whatever is left at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>, BackendError> {
        let mut out = Vec::new();
        if self.pending[0].is_empty() {
            return Ok(out);
        }
        let planar = self
            .inner
            .process_partial(Some(self.pending.as_slice()), None)
            .map_err(|e| BackendError::Output(format!("resampling failed: {}", e)))?;
        for plane in self.pending.iter_mut() {
            plane.clear();
        }
        interleave_into(&planar, &mut out);
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        for plane in self.pending.iter_mut() {
            plane.clear();
        }
    }
}

fn interleave_into(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    let frames = planar.first().map(|p| p.len()).unwrap_or(0);
    out.reserve(frames * planar.len());
    for i in 0..frames {
        for plane in planar {
            out.push(plane[i]);
        }
    }
}

/// Map interleaved audio from `from` channels to `to` channels
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for c in 0..to {
                out.push(frame[c % from]);
            }
        }
    }
    out
}
