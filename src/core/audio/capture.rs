use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};

use super::{downmix, FrameSource};

/// What the realtime callback hands over to the reading thread
enum CaptureMessage {
    Samples(Vec<f32>),
    Error(String),
}

/// Names of all capture devices on the default host
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices().context("Failed to enumerate input devices")? {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Live microphone/line input.
///
/// The device delivers buffers of whatever size it likes on its own thread;
/// they are queued and cut into fixed frames on `read`. Dropping the source
/// stops the stream and releases the device.
pub struct CaptureSource {
    _stream: Stream,
    assembler: FrameAssembler,
    sample_rate: u32,
    device_name: String,
}

impl CaptureSource {
    /// Open `device_name`, or the host's default input device when `None`
    pub fn open(device_name: Option<&str>, sample_rate: u32, frame_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        info!("Using audio host: {}", host.id().name());

        let device = match device_name {
            Some(name) => host
                .input_devices()
                .context("Failed to enumerate input devices")?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("Input device '{}' not found", name))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No input device available"))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!("Using input device: {}", device_name);

        let (config, sample_format) = choose_config(&device, sample_rate)?;
        info!("Input config: {:?} ({:?})", config, sample_format);

        let (sender, receiver) = unbounded();
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sender),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sender),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sender),
            other => bail!("Unsupported sample format {:?}", other),
        }?;

        stream
            .play()
            .with_context(|| format!("Failed to start capture on '{}'", device_name))?;

        Ok(Self {
            _stream: stream,
            assembler: FrameAssembler::new(receiver, frame_size),
            sample_rate: config.sample_rate.0,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl FrameSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.assembler.frame_size
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        let frame = self
            .assembler
            .next_frame()
            .with_context(|| format!("Audio capture failed on '{}'", self.device_name))?;
        Ok(Some(frame))
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        info!("Released input device '{}'", self.device_name);
    }
}

/// Prefer a mono config at the requested rate, otherwise fall back to the
/// device default and downmix in the callback
fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let wanted = cpal::SampleRate(sample_rate);

    let mono = device
        .supported_input_configs()
        .context("Failed to query input configs")?
        .filter(|range| {
            range.channels() == 1
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
        })
        .max_by_key(|range| range.sample_format() == SampleFormat::F32);

    let supported = match mono {
        Some(range) => range.with_sample_rate(wanted),
        None => {
            let default = device
                .default_input_config()
                .context("Failed to get default input config")?;
            warn!(
                "No mono input at {} Hz, using {} channel(s) at {} Hz",
                sample_rate,
                default.channels(),
                default.sample_rate().0
            );
            default
        }
    };

    let sample_format = supported.sample_format();
    Ok((supported.config(), sample_format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sender: Sender<CaptureMessage>,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    let error_sender = sender.clone();
    let err_fn = move |err: cpal::StreamError| {
        error!("an error occurred on the audio stream: {}", err);
        error_sender.send(CaptureMessage::Error(err.to_string())).ok();
    };

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sender
                .send(CaptureMessage::Samples(to_mono(data, channels)))
                .ok();
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Convert one callback buffer to f32 and fold its channels together
fn to_mono<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    let converted: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
    downmix(&converted, channels)
}

/// Cuts the variable-size buffers coming from the callback into frames
struct FrameAssembler {
    receiver: Receiver<CaptureMessage>,
    pending: Vec<f32>,
    frame_size: usize,
}

impl FrameAssembler {
    fn new(receiver: Receiver<CaptureMessage>, frame_size: usize) -> Self {
        Self {
            receiver,
            pending: Vec::with_capacity(frame_size * 2),
            frame_size,
        }
    }

    fn next_frame(&mut self) -> Result<Vec<f32>> {
        while self.pending.len() < self.frame_size {
            match self.receiver.recv() {
                Ok(CaptureMessage::Samples(samples)) => self.pending.extend_from_slice(&samples),
                Ok(CaptureMessage::Error(err)) => bail!("stream error: {}", err),
                Err(_) => bail!("stream closed"),
            }
        }
        Ok(self.pending.drain(..self.frame_size).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_buffers_become_mono_f32() {
        assert_eq!(to_mono(&[0.25f32, -0.25, 0.5], 1), vec![0.25, -0.25, 0.5]);
        assert_eq!(to_mono(&[16384i16, 0, -16384, -16384], 2), vec![0.25, -0.5]);
    }

    #[test]
    fn test_assembler_joins_small_buffers() {
        let (sender, receiver) = unbounded();
        let mut assembler = FrameAssembler::new(receiver, 4);

        sender.send(CaptureMessage::Samples(vec![1.0, 2.0, 3.0])).unwrap();
        sender.send(CaptureMessage::Samples(vec![4.0, 5.0, 6.0])).unwrap();

        assert_eq!(assembler.next_frame().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(assembler.pending, vec![5.0, 6.0]);
    }

    #[test]
    fn test_assembler_splits_large_buffers() {
        let (sender, receiver) = unbounded();
        let mut assembler = FrameAssembler::new(receiver, 2);

        sender
            .send(CaptureMessage::Samples(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();

        assert_eq!(assembler.next_frame().unwrap(), vec![1.0, 2.0]);
        assert_eq!(assembler.next_frame().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_assembler_reports_stream_errors() {
        let (sender, receiver) = unbounded();
        let mut assembler = FrameAssembler::new(receiver, 4);

        sender.send(CaptureMessage::Samples(vec![1.0])).unwrap();
        sender
            .send(CaptureMessage::Error("device unplugged".to_string()))
            .unwrap();

        let err = assembler.next_frame().unwrap_err();
        assert!(err.to_string().contains("device unplugged"));
    }

    #[test]
    fn test_assembler_fails_when_stream_closes() {
        let (sender, receiver) = unbounded();
        let mut assembler = FrameAssembler::new(receiver, 4);
        drop(sender);

        assert!(assembler.next_frame().is_err());
    }
}
