use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, FromSample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use std::{
    error::Error,
    fmt,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};
use tracing::{error, info, warn};

const NUM_CHANNELS: u16 = 2;

#[derive(Debug)]
pub enum OutputError {
    NoDefaultDevice,
    NoDefaultConfig,
    UnsupportedSampleFormat(SampleFormat),
    BuildStream(cpal::BuildStreamError),
    PlayStream(cpal::PlayStreamError),
    ThreadFailed,
}

impl Error for OutputError {}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputError::NoDefaultDevice => "No default output device.".fmt(f),
            OutputError::NoDefaultConfig => "Output device has no default config.".fmt(f),
            OutputError::UnsupportedSampleFormat(s) => write!(f, "Unsupported sample format: {s}"),
            OutputError::BuildStream(e) => write!(f, "Failed to build output stream: {e}"),
            OutputError::PlayStream(e) => write!(f, "Failed to start output stream: {e}"),
            OutputError::ThreadFailed => "Output thread exited early.".fmt(f),
        }
    }
}

/// Anything that can fill a block of stereo samples.
pub trait RenderSource: Send + 'static {
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputParams {
    pub sample_rate: u32,
    pub buffer_size: usize,
}

/// Owns the audio stream. The stream lives on its own thread since cpal
/// streams cannot move between threads on every host.
pub struct OutputThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl OutputThread {
    pub fn start<S: RenderSource>(
        source: Arc<Mutex<S>>,
        params: OutputParams,
    ) -> Result<Self, OutputError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || match connect_to_default_output_device(source, params) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // blocks until stopped or the owner is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|_| OutputError::ThreadFailed)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(OutputError::ThreadFailed),
        }
    }

    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("Audio output thread panicked");
        }
        info!("Audio output stopped");
    }
}

fn connect_to_default_output_device<S: RenderSource>(
    source: Arc<Mutex<S>>,
    params: OutputParams,
) -> Result<Stream, OutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(OutputError::NoDefaultDevice)?;
    info!(
        "Audio output: {} / {}",
        host.id().name(),
        device.name().unwrap_or_else(|_| "unknown".into())
    );
    let sample_format = sample_format(&device)?;
    let cfg = create_stream_config(&params);
    create_stream_dispatched(sample_format, &device, &cfg, source)
}

fn sample_format(device: &Device) -> Result<SampleFormat, OutputError> {
    let config = device
        .default_output_config()
        .map_err(|_| OutputError::NoDefaultConfig)?;
    Ok(config.sample_format())
}

fn create_stream_config(params: &OutputParams) -> StreamConfig {
    StreamConfig {
        channels: NUM_CHANNELS,
        sample_rate: SampleRate(params.sample_rate),
        buffer_size: BufferSize::Fixed(params.buffer_size as u32),
    }
}

fn create_stream_dispatched<S: RenderSource>(
    sample_format: SampleFormat,
    device: &Device,
    cfg: &StreamConfig,
    source: Arc<Mutex<S>>,
) -> Result<Stream, OutputError> {
    match sample_format {
        SampleFormat::I8 => create_stream::<i8, S>(device, cfg, source),
        SampleFormat::I16 => create_stream::<i16, S>(device, cfg, source),
        SampleFormat::I32 => create_stream::<i32, S>(device, cfg, source),
        SampleFormat::I64 => create_stream::<i64, S>(device, cfg, source),
        SampleFormat::U8 => create_stream::<u8, S>(device, cfg, source),
        SampleFormat::U16 => create_stream::<u16, S>(device, cfg, source),
        SampleFormat::U32 => create_stream::<u32, S>(device, cfg, source),
        SampleFormat::U64 => create_stream::<u64, S>(device, cfg, source),
        SampleFormat::F32 => create_stream::<f32, S>(device, cfg, source),
        SampleFormat::F64 => create_stream::<f64, S>(device, cfg, source),
        f => Err(OutputError::UnsupportedSampleFormat(f)),
    }
}

fn create_stream<T, S>(
    device: &Device,
    cfg: &StreamConfig,
    source: Arc<Mutex<S>>,
) -> Result<Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
    S: RenderSource,
{
    let channels = cfg.channels as usize;
    let mut lbuf = Vec::new();
    let mut rbuf = Vec::new();
    let err_fn = |err| warn!("An error occurred on stream: {}", err);

    let stream = device
        .build_output_stream(
            cfg,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| match source.lock() {
                Ok(mut source) => {
                    write_frames(data, channels, &mut *source, &mut lbuf, &mut rbuf)
                }
                Err(_) => data.fill(T::EQUILIBRIUM),
            },
            err_fn,
            None,
        )
        .map_err(OutputError::BuildStream)?;
    stream.play().map_err(OutputError::PlayStream)?;
    Ok(stream)
}

/// Renders one device buffer and interleaves it into `data`.
fn write_frames<T, S>(
    data: &mut [T],
    channels: usize,
    source: &mut S,
    lbuf: &mut Vec<f32>,
    rbuf: &mut Vec<f32>,
) where
    T: SizedSample + FromSample<f32>,
    S: RenderSource + ?Sized,
{
    let num_frames = data.len() / channels;
    lbuf.resize(num_frames, 0.0);
    rbuf.resize(num_frames, 0.0);
    source.render(lbuf, rbuf);

    for (n, frame) in data.chunks_mut(channels).enumerate() {
        let values = [T::from_sample(lbuf[n]), T::from_sample(rbuf[n])];
        for (k, sample) in frame.iter_mut().enumerate() {
            *sample = values[k & 1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(f32);

    impl RenderSource for Ramp {
        fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                *l = self.0;
                *r = -self.0;
                self.0 += 0.25;
            }
        }
    }

    #[test]
    fn interleaves_stereo_frames() {
        let mut data = [0.0f32; 6];
        let (mut l, mut r) = (Vec::new(), Vec::new());
        write_frames(&mut data, 2, &mut Ramp(0.0), &mut l, &mut r);
        assert_eq!(data, [0.0, -0.0, 0.25, -0.25, 0.5, -0.5]);
    }

    #[test]
    fn converts_to_integer_samples() {
        let mut data = [1i16; 4];
        let (mut l, mut r) = (Vec::new(), Vec::new());
        write_frames(&mut data, 2, &mut Ramp(0.0), &mut l, &mut r);
        assert_eq!(data[0], 0);
        assert!(data[2] > 0 && data[3] < 0);
    }
}
