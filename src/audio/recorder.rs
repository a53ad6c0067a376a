//! Microphone capture using CPAL, written to WAV with hound.
//!
//! The AudioRecorder captures from the default input device into a WAV
//! file. cpal streams are not Send, so each recording runs on a dedicated
//! audio thread; the returned RecordingHandle controls it over channels and
//! is safe to hold across tasks. stop() finalizes the file and reports the
//! captured duration (which feeds the too-short-to-transcribe gate).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use hound::{WavSpec, WavWriter};
use uuid::Uuid;

use super::paths::generate_wav_path;

type SharedWriter = Arc<Mutex<Option<WavWriter<std::io::BufWriter<std::fs::File>>>>>;

/// How long stop() waits for the audio thread to finalize the WAV file.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during audio recording.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    FileCreationFailed(String),
    WriteFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::FileCreationFailed(e) => write!(f, "Failed to create WAV file: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to write audio data: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

/// A finished recording: the finalized WAV file and how long it ran.
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub wav_path: PathBuf,
    pub duration: Duration,
}

/// Handle to an active recording. The cpal stream itself lives on a
/// dedicated thread; this handle only holds channel endpoints and is Send.
pub struct RecordingHandle {
    stop_tx: std_mpsc::Sender<()>,
    done_rx: std_mpsc::Receiver<Result<(), AudioError>>,
    is_recording: Arc<AtomicBool>,
    wav_path: PathBuf,
    started_at: Instant,
}

impl RecordingHandle {
    /// Stop recording and finalize the WAV file.
    pub fn stop(self) -> Result<FinishedRecording, AudioError> {
        // Stop accepting samples immediately, then ask the audio thread to
        // tear down the stream and finalize the writer.
        self.is_recording.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(());

        match self.done_rx.recv_timeout(FINALIZE_TIMEOUT) {
            Ok(Ok(())) => {
                let duration = self.started_at.elapsed();
                tracing::info!(path = ?self.wav_path, ?duration, "recording stopped, WAV finalized");
                Ok(FinishedRecording {
                    wav_path: self.wav_path,
                    duration,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::WriteFailed(
                "audio thread did not finalize the recording in time".to_string(),
            )),
        }
    }
}

/// Audio recorder capturing from the default input device.
pub struct AudioRecorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl AudioRecorder {
    /// Create a new AudioRecorder using the default input device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        tracing::info!(device = ?device.name(), "using audio input device");

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;

        tracing::info!(
            sample_rate = supported_config.sample_rate().0,
            channels = supported_config.channels(),
            format = ?supported_config.sample_format(),
            "audio config"
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Start recording to a new WAV file.
    /// Returns a handle that must be used to stop the recording.
    pub fn start(&self, consult_id: Uuid) -> Result<(RecordingHandle, PathBuf), AudioError> {
        let wav_path = generate_wav_path(consult_id)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

        let spec = WavSpec {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate.0,
            bits_per_sample: 16, // Always write as 16-bit
            sample_format: hound::SampleFormat::Int,
        };

        // Create the writer here so file-creation errors surface synchronously.
        let writer = WavWriter::create(&wav_path, spec)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;
        let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));

        let is_recording = Arc::new(AtomicBool::new(true));

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (done_tx, done_rx) = std_mpsc::sync_channel::<Result<(), AudioError>>(1);

        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let thread_writer = writer.clone();
        let thread_is_recording = is_recording.clone();

        std::thread::spawn(move || {
            let stream = match build_stream(
                &device,
                &config,
                sample_format,
                thread_writer.clone(),
                thread_is_recording,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
                    "Failed to start stream: {}",
                    e
                ))));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            // Park until stop is requested (or the handle is dropped).
            let _ = stop_rx.recv();
            drop(stream);

            let result = {
                let mut guard = thread_writer.lock().unwrap();
                match guard.take() {
                    Some(w) => w
                        .finalize()
                        .map_err(|e| AudioError::WriteFailed(e.to_string())),
                    None => Ok(()),
                }
            };
            let _ = done_tx.send(result);
        });

        // Wait for the stream to come up before reporting success.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(AudioError::StreamCreationFailed(
                    "audio thread exited before the stream started".to_string(),
                ))
            }
        }

        tracing::info!(path = ?wav_path, "recording started");

        let handle = RecordingHandle {
            stop_tx,
            done_rx,
            is_recording,
            wav_path: wav_path.clone(),
            started_at: Instant::now(),
        };

        Ok((handle, wav_path))
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    writer: SharedWriter,
    is_recording: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let err_fn = |err| tracing::error!("audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, writer, is_recording, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, writer, is_recording, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, writer, is_recording, err_fn),
        _ => Err(AudioError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    writer: SharedWriter,
    is_recording: Arc<AtomicBool>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !is_recording.load(Ordering::SeqCst) {
                    return;
                }

                let mut guard = writer.lock().unwrap();
                if let Some(ref mut w) = *guard {
                    for &sample in data {
                        let sample_i16 = sample_to_i16(sample);
                        if w.write_sample(sample_i16).is_err() {
                            tracing::error!("failed to write sample");
                            break;
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert any sample type to i16 for WAV writing.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_clamps_and_scales() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Out-of-range values clamp
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn audio_error_display() {
        assert!(AudioError::NoInputDevice
            .to_string()
            .contains("input device"));
        assert!(AudioError::WriteFailed("disk full".to_string())
            .to_string()
            .contains("disk full"));
    }

    #[test]
    fn recording_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RecordingHandle>();
    }
}
