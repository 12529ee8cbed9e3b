use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use super::{downmix, FrameSource};

/// Replays a recorded WAV file as if it were live input
pub struct WavSource {
    samples: Vec<f32>,
    position: usize,
    frame_size: usize,
    sample_rate: u32,
}

impl WavSource {
    pub fn open(path: &Path, frame_size: usize) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<f32>, hound::Error>>()
                .context("Failed to decode WAV samples")?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<Result<Vec<f32>, hound::Error>>()
                    .context("Failed to decode WAV samples")?
            }
        };
        let samples = downmix(&interleaved, spec.channels as usize);

        info!(
            "Loaded {} ({} samples, {} channel(s) at {} Hz)",
            path.display(),
            samples.len(),
            spec.channels,
            spec.sample_rate
        );

        Ok(Self::from_samples(samples, spec.sample_rate, frame_size))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, frame_size: usize) -> Self {
        Self {
            samples,
            position: 0,
            frame_size,
            sample_rate,
        }
    }
}

impl FrameSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() || self.frame_size == 0 {
            return Ok(None);
        }

        let end = (self.position + self.frame_size).min(self.samples.len());
        let mut frame = self.samples[self.position..end].to_vec();
        // Pad the tail so every frame has the same length
        frame.resize(self.frame_size, 0.0);
        self.position = end;

        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(name: &str, spec: hound::WavSpec, samples: &[i16]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_frames_are_padded_and_finite() {
        let mut source = WavSource::from_samples(vec![0.5; 5], 8000, 2);

        assert_eq!(source.read().unwrap(), Some(vec![0.5, 0.5]));
        assert_eq!(source.read().unwrap(), Some(vec![0.5, 0.5]));
        assert_eq!(source.read().unwrap(), Some(vec![0.5, 0.0]));
        assert_eq!(source.read().unwrap(), None);
        assert_eq!(source.read().unwrap(), None);
    }

    #[test]
    fn test_reads_16bit_mono() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = write_fixture("instrument2midi_mono.wav", spec, &[0, 16384, -16384, 0]);

        let mut source = WavSource::open(&path, 4).unwrap();
        assert_eq!(source.sample_rate(), 22050);
        assert_eq!(source.read().unwrap(), Some(vec![0.0, 0.5, -0.5, 0.0]));
        assert_eq!(source.read().unwrap(), None);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = write_fixture(
            "instrument2midi_stereo.wav",
            spec,
            &[16384, 0, 16384, 16384],
        );

        let mut source = WavSource::open(&path, 2).unwrap();
        assert_eq!(source.read().unwrap(), Some(vec![0.25, 0.5]));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("instrument2midi_does_not_exist.wav");
        assert!(WavSource::open(&path, 1024).is_err());
    }
}
