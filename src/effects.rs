//! Effect runner for the consultation workflow.
//!
//! Executes the effects produced by the state machine: microphone capture,
//! the two OpenAI calls (transcription, note generation), archive writes,
//! and clipboard export. Completion is reported back as events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::archive;
use crate::audio::{cleanup_old_recordings, AudioRecorder, RecordingHandle};
use crate::metrics::MetricsCollector;
use crate::notegen;
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event, NoSpeechSource};
use crate::transcription;

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Active recording handle storage.
/// RecordingHandle is Send (the cpal stream lives on a dedicated audio thread).
struct ActiveRecording {
    handle: Option<RecordingHandle>,
}

/// Real effect runner: CPAL capture, OpenAI transcription and note
/// generation, archive writes, arboard clipboard.
pub struct ApiEffectRunner {
    recorder: Arc<Mutex<Option<AudioRecorder>>>,
    active_recordings: Arc<Mutex<HashMap<Uuid, ActiveRecording>>>,
    metrics: Arc<Mutex<MetricsCollector>>,
    settings: Arc<AppSettings>,
}

impl ApiEffectRunner {
    /// Create a new runner. Returns Ok even if the audio device isn't
    /// available - errors happen at record time.
    pub fn new(metrics: Arc<Mutex<MetricsCollector>>, settings: Arc<AppSettings>) -> Arc<Self> {
        let recorder = match AudioRecorder::new() {
            Ok(r) => {
                tracing::info!("audio recorder initialized");
                Some(r)
            }
            Err(e) => {
                tracing::warn!("audio recorder init failed (will retry on record): {}", e);
                None
            }
        };

        Arc::new(Self {
            recorder: Arc::new(Mutex::new(recorder)),
            active_recordings: Arc::new(Mutex::new(HashMap::new())),
            metrics,
            settings,
        })
    }
}

impl EffectRunner for ApiEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartAudio { id } => {
                let recorder = self.recorder.clone();
                let active = self.active_recordings.clone();
                let metrics = self.metrics.clone();

                tokio::spawn(async move {
                    {
                        let mut m = metrics.lock().await;
                        m.start_cycle(id);
                    }

                    // Get or create the recorder and start while holding the
                    // lock; capture the result and drop the guard before any
                    // awaits (never hold the mutex across an await point).
                    let start_result = {
                        let mut recorder_guard = recorder.lock().await;
                        let init_result = if recorder_guard.is_none() {
                            match AudioRecorder::new() {
                                Ok(r) => {
                                    *recorder_guard = Some(r);
                                    Ok(())
                                }
                                Err(e) => {
                                    tracing::error!("failed to initialize audio recorder: {}", e);
                                    Err(e.to_string())
                                }
                            }
                        } else {
                            Ok(())
                        };
                        init_result.and_then(|_| match recorder_guard.as_ref() {
                            Some(rec) => rec.start(id).map_err(|e| e.to_string()),
                            None => Err("Audio recorder unavailable".to_string()),
                        })
                    }; // recorder_guard dropped here

                    match start_result {
                        Ok((handle, wav_path)) => {
                            tracing::info!(?wav_path, "audio recording started");

                            {
                                let mut m = metrics.lock().await;
                                m.recording_started();
                            }

                            let mut active_guard = active.lock().await;
                            active_guard.insert(
                                id,
                                ActiveRecording {
                                    handle: Some(handle),
                                },
                            );
                            drop(active_guard);

                            let _ = tx.send(Event::AudioStartOk { id, wav_path }).await;
                        }
                        Err(err) => {
                            tracing::error!("failed to start audio recording: {}", err);
                            {
                                let mut m = metrics.lock().await;
                                m.cycle_failed(err.clone());
                            }
                            let _ = tx.send(Event::AudioStartFail { id, err }).await;
                        }
                    }
                });
            }

            Effect::StopAudio { id } => {
                let active = self.active_recordings.clone();
                let metrics = self.metrics.clone();
                let settings = self.settings.clone();

                tokio::spawn(async move {
                    let handle = {
                        let mut active_guard = active.lock().await;
                        active_guard
                            .remove(&id)
                            .and_then(|mut recording| recording.handle.take())
                    };

                    let Some(handle) = handle else {
                        tracing::warn!("StopAudio: no active handle for id={}", id);
                        let _ = tx.send(Event::AudioStopOk { id }).await;
                        return;
                    };

                    // stop() blocks on the audio thread finalizing the WAV
                    let stop_result = tokio::task::spawn_blocking(move || handle.stop()).await;

                    let finished = match stop_result {
                        Ok(Ok(finished)) => finished,
                        Ok(Err(e)) => {
                            tracing::error!("failed to stop audio recording: {}", e);
                            {
                                let mut m = metrics.lock().await;
                                m.cycle_failed(e.to_string());
                            }
                            let _ = tx
                                .send(Event::AudioStopFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        Err(e) => {
                            tracing::error!("audio stop task failed: {}", e);
                            let _ = tx
                                .send(Event::AudioStopFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    };

                    let file_size = match tokio::fs::metadata(&finished.wav_path).await {
                        Ok(m) => m.len(),
                        Err(e) => {
                            tracing::warn!(
                                "failed to get file size for {:?}: {}",
                                finished.wav_path,
                                e
                            );
                            0
                        }
                    };

                    {
                        let mut m = metrics.lock().await;
                        m.recording_stopped(file_size);
                    }

                    let duration_ms = finished.duration.as_millis() as u64;
                    tracing::info!(duration_ms, file_size, "recording stopped");

                    // Recordings below the threshold never reach the API.
                    if duration_ms < settings.min_transcribe_ms {
                        tracing::info!(
                            "skipping transcription: recording too short ({}ms < {}ms)",
                            duration_ms,
                            settings.min_transcribe_ms
                        );
                        let _ = tx
                            .send(Event::NoSpeechDetected {
                                id,
                                source: NoSpeechSource::DurationThreshold,
                                message: format!(
                                    "Recording too short: {}ms (< {}ms). Skipped transcription.",
                                    duration_ms, settings.min_transcribe_ms
                                ),
                            })
                            .await;
                        return;
                    }

                    let _ = tx.send(Event::AudioStopOk { id }).await;
                });
            }

            Effect::StartTranscription { id, wav_path } => {
                let metrics = self.metrics.clone();
                let settings = self.settings.clone();

                tokio::spawn(async move {
                    tracing::info!("starting transcription for {:?}", wav_path);

                    {
                        let mut m = metrics.lock().await;
                        // Loaded audio files start here without a recording phase.
                        if !m.is_active_cycle(id) {
                            m.start_cycle(id);
                        }
                        m.transcription_started();
                    }

                    let start_time = Instant::now();

                    match transcription::transcribe_audio(&wav_path, &settings.whisper_model).await
                    {
                        Ok(text) => {
                            let duration = start_time.elapsed();
                            tracing::info!(
                                chars = text.len(),
                                ?duration,
                                "transcription successful for {:?}",
                                wav_path
                            );

                            {
                                let mut m = metrics.lock().await;
                                m.transcription_completed(text.len());
                            }

                            // Whisper returns empty or whitespace text for
                            // silent audio; treat that as no speech.
                            if text.trim().is_empty() {
                                tracing::info!("transcription came back empty, treating as no speech");
                                let _ = tx
                                    .send(Event::NoSpeechDetected {
                                        id,
                                        source: NoSpeechSource::EmptyTranscription,
                                        message:
                                            "Transcription returned no text (no speech detected)."
                                                .to_string(),
                                    })
                                    .await;
                                return;
                            }

                            let _ = tx.send(Event::TranscribeOk { id, text }).await;
                        }
                        Err(e) => {
                            tracing::error!("transcription failed: {}", e);
                            {
                                let mut m = metrics.lock().await;
                                m.cycle_failed(e.to_string());
                            }
                            let _ = tx
                                .send(Event::TranscribeFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::StartNoteGeneration { id, transcript } => {
                let metrics = self.metrics.clone();
                let settings = self.settings.clone();

                tokio::spawn(async move {
                    tracing::info!(transcript_chars = transcript.len(), "generating SOAP note");
                    let start_time = Instant::now();

                    match notegen::generate_note(&transcript, &settings).await {
                        Ok(note) => {
                            {
                                let mut m = metrics.lock().await;
                                m.note_generation_completed(start_time.elapsed(), note.len());
                            }
                            let _ = tx.send(Event::NoteOk { id, note }).await;
                        }
                        Err(e) => {
                            {
                                let mut m = metrics.lock().await;
                                m.note_generation_failed(e.to_string(), Some(id.to_string()));
                            }
                            let _ = tx
                                .send(Event::NoteFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::ArchiveTranscript { id, text } => {
                let metrics = self.metrics.clone();
                let settings = self.settings.clone();

                tokio::spawn(async move {
                    let result =
                        tokio::task::spawn_blocking(move || archive::save_transcript(&settings, &text))
                            .await;

                    let mut m = metrics.lock().await;
                    match result {
                        Ok(Ok(path)) => {
                            println!("Transcript archived to {}", path.display());
                            m.cycle_completed();
                        }
                        Ok(Err(e)) => {
                            eprintln!("Failed to archive transcript: {}", e);
                            m.record_error(
                                "archive".to_string(),
                                e.to_string(),
                                Some(id.to_string()),
                            );
                            // The transcript still lives in the session; the
                            // cycle itself succeeded.
                            m.cycle_completed();
                        }
                        Err(e) => {
                            tracing::error!("archive task failed: {}", e);
                            m.record_error("archive".to_string(), e.to_string(), None);
                        }
                    }
                });
            }

            Effect::SaveToDisk { transcript, note } => {
                let settings = self.settings.clone();

                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || match note {
                        Some(note) => archive::save_note(&settings, &note),
                        None => archive::save_transcript(&settings, &transcript),
                    })
                    .await;

                    match result {
                        Ok(Ok(path)) => println!("Saved to {}", path.display()),
                        Ok(Err(e)) => eprintln!("Save failed: {}", e),
                        Err(e) => tracing::error!("save task failed: {}", e),
                    }
                });
            }

            Effect::CopyToClipboard { text } => {
                // arboard::Clipboard is not Send, so use a plain thread.
                // On Linux/X11 the clipboard must stay alive for other apps
                // to read from it, so the thread lingers until ownership
                // transfers or a timeout passes.
                std::thread::spawn(move || {
                    let result = (|| {
                        let mut clipboard = arboard::Clipboard::new()
                            .map_err(|e| format!("Clipboard access failed: {}", e))?;

                        clipboard
                            .set_text(&text)
                            .map_err(|e| format!("Clipboard set failed: {}", e))?;

                        println!("Copied {} chars to clipboard", text.len());

                        #[cfg(target_os = "linux")]
                        {
                            use std::time::{Duration, Instant};
                            let start = Instant::now();
                            let timeout = Duration::from_secs(30);

                            while start.elapsed() < timeout {
                                std::thread::sleep(Duration::from_millis(100));
                                match clipboard.get_text() {
                                    Ok(current) if current == text => {}
                                    _ => {
                                        tracing::debug!("clipboard ownership transferred");
                                        break;
                                    }
                                }
                            }
                        }

                        Ok::<(), String>(())
                    })();

                    if let Err(e) = result {
                        eprintln!("{}", e);
                    }
                });
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active_recordings.clone();
                tokio::spawn(async move {
                    // Send tick events every second while the recording is active
                    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
                    loop {
                        interval.tick().await;
                        let is_active = {
                            let guard = active.lock().await;
                            guard.contains_key(&id)
                        };
                        if !is_active {
                            tracing::debug!("recording tick stopping - {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            tracing::debug!("recording tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::Cleanup { id, wav_path } => {
                let metrics = self.metrics.clone();

                tokio::spawn(async move {
                    // Mark cycle as cancelled in metrics (if still active)
                    {
                        let mut m = metrics.lock().await;
                        if m.is_active_cycle(id) {
                            m.cycle_cancelled();
                        }
                    }

                    // Cleanup old recordings (keep last N)
                    match cleanup_old_recordings() {
                        Ok(count) if count > 0 => {
                            tracing::info!("cleaned up {} old recordings", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("failed to cleanup old recordings: {}", e);
                        }
                    }

                    // The specific wav file is retained for debugging;
                    // cleanup_old_recordings enforces the retention limit.
                    if let Some(path) = wav_path {
                        tracing::debug!("recording file retained: {:?}", path);
                    }
                });
            }

            Effect::Render => {
                // Handled in the session loop, not here
                unreachable!("Render should be handled in the session loop");
            }
        }
    }
}

/// Stub effect runner for tests: completes every effect instantly with
/// canned results, no devices or network.
pub struct StubEffectRunner;

impl StubEffectRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Default for StubEffectRunner {
    fn default() -> Self {
        Self
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartAudio { id } => {
                tokio::spawn(async move {
                    let wav_path = std::env::temp_dir().join(format!("dentascribe_{}.wav", id));
                    let _ = tx.send(Event::AudioStartOk { id, wav_path }).await;
                });
            }

            Effect::StopAudio { id } => {
                tokio::spawn(async move {
                    let _ = tx.send(Event::AudioStopOk { id }).await;
                });
            }

            Effect::StartTranscription { id, wav_path } => {
                tokio::spawn(async move {
                    let text = format!("[simulated transcript of {}]", wav_path.display());
                    let _ = tx.send(Event::TranscribeOk { id, text }).await;
                });
            }

            Effect::StartNoteGeneration { id, .. } => {
                tokio::spawn(async move {
                    let note = "### Subjective:\n- simulated note".to_string();
                    let _ = tx.send(Event::NoteOk { id, note }).await;
                });
            }

            Effect::ArchiveTranscript { text, .. } => {
                tracing::debug!("stub: would archive {} chars", text.len());
            }

            Effect::SaveToDisk { .. } => {
                tracing::debug!("stub: would save session");
            }

            Effect::CopyToClipboard { text } => {
                tracing::debug!("stub: would copy {} chars to clipboard", text.len());
            }

            Effect::StartRecordingTick { id } => {
                tracing::debug!("stub: skipping tick loop for {}", id);
            }

            Effect::Cleanup { wav_path, .. } => {
                if let Some(path) = wav_path {
                    tracing::debug!("stub: would cleanup {}", path.display());
                }
            }

            Effect::Render => {
                unreachable!("Render should be handled in the session loop");
            }
        }
    }
}
