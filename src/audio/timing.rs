// Time display helpers and byte-unit conversions

/// Bytes per sample in the backend's byte units (16-bit PCM)
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Scale factor of the byte-unit seek compatibility path
pub const BYTE_SEEK_SCALE: i64 = 124_000;

/// Format seconds as `MM:SS`. Minutes are not wrapped at the hour.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn frames_to_bytes(frames: u64, channels: usize) -> u64 {
    frames * channels as u64 * BYTES_PER_SAMPLE
}

pub fn bytes_to_frames(bytes: u64, channels: usize) -> u64 {
    let frame_bytes = (channels as u64 * BYTES_PER_SAMPLE).max(1);
    bytes / frame_bytes
}
