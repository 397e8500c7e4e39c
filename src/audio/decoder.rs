// Audio decoder using Symphonia
// Decodes a file into interleaved f32 frames for the tempo stage

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, info, warn};

use crate::audio::format::DecoderKind;
use crate::error::BackendError;

/// Sample layout of an opened stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: usize,
    /// Total length in frames, measured by decoding when the container
    /// does not say
    pub total_frames: u64,
}

impl StreamSpec {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }
}

pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: StreamSpec,
    scratch: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Open `path` with the decoder picked by the format resolver
    pub fn open(path: &Path, kind: DecoderKind) -> Result<Self, BackendError> {
        Self::probe(path, kind)?.with_known_length(path, kind)
    }

    fn probe(path: &Path, kind: DecoderKind) -> Result<Self, BackendError> {
        let file = File::open(path)
            .map_err(|e| BackendError::Decode(format!("failed to open {:?}: {}", path, e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // The hint comes from the sniffed content, not the file name
        let mut hint = Hint::new();
        hint.with_extension(kind.hint_extension());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| BackendError::Decode(format!("failed to probe {:?}: {}", path, e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| BackendError::Decode("no audio track found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| BackendError::Decode("unknown sample rate".to_string()))?;
        let spec = StreamSpec {
            sample_rate,
            channels: track.codec_params.channels.map(|c| c.count()).unwrap_or(2),
            total_frames: track.codec_params.n_frames.unwrap_or(0),
        };
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| BackendError::Decode(format!("failed to create decoder: {}", e)))?;

        debug!(
            "Opened {:?} ({:?}): {} Hz, {} ch, {} frames",
            path, kind, spec.sample_rate, spec.channels, spec.total_frames
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            spec,
            scratch: None,
        })
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Fill in `total_frames` by decoding a second reader to the end when
    /// the container header leaves it out.
    fn with_known_length(mut self, path: &Path, kind: DecoderKind) -> Result<Self, BackendError> {
        if self.spec.total_frames == 0 {
            let counted = Self::probe(path, kind)?.count_frames()?;
            info!("{:?} has no frame count in its header, measured {} frames", path, counted);
            self.spec.total_frames = counted;
        }
        Ok(self)
    }

    /// Decode every remaining packet of the track, counting frames
    fn count_frames(mut self) -> Result<u64, BackendError> {
        let mut frames = 0u64;
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(frames);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(BackendError::Decode(format!("read packet: {}", e))),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => frames += decoded.frames() as u64,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(BackendError::Decode(format!("decode: {}", e))),
            }
        }
    }

    /// Decode the next packet of this track as interleaved samples.
    /// `Ok(None)` marks the end of the stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, BackendError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(BackendError::Decode(format!("read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let frames = decoded.capacity() as u64;
                    let spec = *decoded.spec();
                    let needs_new = self
                        .scratch
                        .as_ref()
                        .map(|buf| buf.capacity() < decoded.capacity() * spec.channels.count())
                        .unwrap_or(true);
                    if needs_new {
                        self.scratch = Some(SampleBuffer::new(frames, spec));
                    }
                    if let Some(buf) = self.scratch.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        return Ok(Some(buf.samples().to_vec()));
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet, keep going
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(BackendError::Decode(format!("decode: {}", e))),
            }
        }
    }

    /// Seek to `seconds` and return the frame actually landed on
    pub fn seek(&mut self, seconds: f64) -> Result<u64, BackendError> {
        let seconds = seconds.max(0.0);
        let time = Time::new(seconds.trunc() as u64, seconds.fract());

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| BackendError::Seek(e.to_string()))?;

        self.decoder.reset();
        Ok(seeked.actual_ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, frames: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as u32 {
            writer.write_sample((i % 64) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn header_length_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        write_wav(&path, 12_000, 2);

        let spec = AudioDecoder::open(&path, DecoderKind::Wav).unwrap().spec();
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.total_frames, 12_000);
        assert!((spec.duration_secs() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn missing_length_is_measured_by_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        write_wav(&path, 20_000, 1);

        let mut decoder = AudioDecoder::probe(&path, DecoderKind::Wav).unwrap();
        decoder.spec.total_frames = 0;
        let decoder = decoder.with_known_length(&path, DecoderKind::Wav).unwrap();

        assert_eq!(decoder.spec().total_frames, 20_000);
        assert!((decoder.spec().duration_secs() - 2.5).abs() < 1e-9);
    }
}
