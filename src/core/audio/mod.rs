//! Audio input: fixed-size mono frames pulled from a device or a file

mod capture;
mod wav;

pub use capture::{list_input_devices, CaptureSource};
pub use wav::WavSource;

use anyhow::Result;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_WINDOW_SIZE: usize = 2048;
pub const DEFAULT_HOP_SIZE: usize = DEFAULT_WINDOW_SIZE / 2;

/// Blocking source of mono audio frames
pub trait FrameSource {
    fn sample_rate(&self) -> u32;

    /// Number of samples in every frame returned by `read`
    fn frame_size(&self) -> usize;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` once a finite source is exhausted.
    fn read(&mut self) -> Result<Option<Vec<f32>>>;
}

/// Average interleaved channels down to a single channel
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono_is_unchanged() {
        assert_eq!(downmix(&[0.1, 0.2, 0.3], 1), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_downmix_stereo_averages() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }
}
