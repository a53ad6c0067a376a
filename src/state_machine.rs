//! State machine for the consultation workflow.
//!
//! This module implements the core state machine using a single-writer
//! pattern. All state transitions go through the `reduce()` function, which
//! returns a new state and a list of effects to execute.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Hard cap on a single recording. Consultations are long, but a forgotten
/// microphone should not fill the disk.
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub enum NoSpeechSource {
    DurationThreshold,
    EmptyTranscription,
}

impl NoSpeechSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoSpeechSource::DurationThreshold => "duration",
            NoSpeechSource::EmptyTranscription => "empty",
        }
    }
}

/// Internal state of the consultation workflow.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    Arming {
        consult_id: Uuid,
    },
    Recording {
        consult_id: Uuid,
        wav_path: PathBuf,
        started_at: Instant,
    },
    Stopping {
        consult_id: Uuid,
        wav_path: PathBuf,
    },
    Transcribing {
        consult_id: Uuid,
        wav_path: PathBuf,
    },
    /// A transcript is held in the session, optionally with a generated note.
    Review {
        consult_id: Uuid,
        transcript: String,
        note: Option<String>,
    },
    Generating {
        consult_id: Uuid,
        transcript: String,
    },
    NoSpeech {
        consult_id: Uuid,
        source: NoSpeechSource,
        message: String,
    },
    Error {
        message: String,
        last_transcript: Option<String>,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that can trigger state transitions. They come from two places:
/// console commands typed by the user, and completion reports from the
/// effect runner (audio service, transcription call, note generation call).
#[derive(Debug, Clone)]
pub enum Event {
    // Console commands
    StartRecording,
    StopRecording,
    Cancel,
    LoadAudio { path: PathBuf },
    /// Transcript text entered directly (paste mode) or returned by $EDITOR.
    SetTranscript { text: String },
    GenerateNote,
    SaveSession,
    CopySession,
    Show,
    ClearSession,
    Exit,

    // Recording timer (includes id to prevent stale ticks)
    RecordingTick { id: Uuid },

    // Audio events
    AudioStartOk { id: Uuid, wav_path: PathBuf },
    AudioStartFail { id: Uuid, err: String },
    AudioStopOk { id: Uuid },
    AudioStopFail { id: Uuid, err: String },

    // No-speech detection events
    NoSpeechDetected {
        id: Uuid,
        source: NoSpeechSource,
        message: String,
    },

    // Transcription events
    TranscribeOk { id: Uuid, text: String },
    TranscribeFail { id: Uuid, err: String },

    // Note generation events
    NoteOk { id: Uuid, note: String },
    NoteFail { id: Uuid, err: String },
}

impl Event {
    /// Whether this event originated from a typed console command.
    /// The session loop uses this to print a hint when a command does not
    /// apply in the current state (the reducer drops it silently).
    pub fn is_console_command(&self) -> bool {
        matches!(
            self,
            Event::StartRecording
                | Event::StopRecording
                | Event::Cancel
                | Event::LoadAudio { .. }
                | Event::SetTranscript { .. }
                | Event::GenerateNote
                | Event::SaveSession
                | Event::CopySession
                | Event::Show
        )
    }
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    StartAudio {
        id: Uuid,
    },
    StopAudio {
        id: Uuid,
    },
    StartTranscription {
        id: Uuid,
        wav_path: PathBuf,
    },
    StartNoteGeneration {
        id: Uuid,
        transcript: String,
    },
    /// Write the transcript to a timestamped file as soon as it exists.
    ArchiveTranscript {
        id: Uuid,
        text: String,
    },
    /// Save the session's note (or transcript when no note exists) on demand.
    SaveToDisk {
        transcript: String,
        note: Option<String>,
    },
    CopyToClipboard {
        text: String,
    },
    /// Start sending RecordingTick events every second while recording
    StartRecordingTick {
        id: Uuid,
    },
    Cleanup {
        id: Uuid,
        wav_path: Option<PathBuf>,
    },
    /// Signal to re-render the console view of the current state
    Render,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale consultation IDs
/// - Always emit Render after state changes
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    // Helper: extract current consultation id (if any)
    let current_id: Option<Uuid> = match state {
        Idle => None,
        Arming { consult_id } => Some(*consult_id),
        Recording { consult_id, .. } => Some(*consult_id),
        Stopping { consult_id, .. } => Some(*consult_id),
        Transcribing { consult_id, .. } => Some(*consult_id),
        Review { consult_id, .. } => Some(*consult_id),
        Generating { consult_id, .. } => Some(*consult_id),
        NoSpeech { consult_id, .. } => Some(*consult_id),
        Error { .. } => None,
    };

    // Helper: check if an event's id belongs to a superseded workflow
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Starting a consultation (recording)
        // -----------------
        // A new recording can begin from any settled state; an existing
        // transcript is discarded (use `clear` for the explicit version).
        (Idle, StartRecording)
        | (Review { .. }, StartRecording)
        | (NoSpeech { .. }, StartRecording)
        | (Error { .. }, StartRecording) => {
            let id = Uuid::new_v4();
            (Arming { consult_id: id }, vec![StartAudio { id }, Render])
        }

        // -----------------
        // Starting a consultation (audio file)
        // -----------------
        (Idle, LoadAudio { path })
        | (Review { .. }, LoadAudio { path })
        | (NoSpeech { .. }, LoadAudio { path })
        | (Error { .. }, LoadAudio { path }) => {
            let id = Uuid::new_v4();
            (
                Transcribing {
                    consult_id: id,
                    wav_path: path.clone(),
                },
                vec![
                    StartTranscription {
                        id,
                        wav_path: path,
                    },
                    Render,
                ],
            )
        }

        // -----------------
        // Starting a consultation (pasted or edited text)
        // -----------------
        // Replacing the transcript in review also discards any stale note.
        (Idle, SetTranscript { text })
        | (Review { .. }, SetTranscript { text })
        | (NoSpeech { .. }, SetTranscript { text })
        | (Error { .. }, SetTranscript { text }) => (
            Review {
                consult_id: Uuid::new_v4(),
                transcript: text,
                note: None,
            },
            vec![Render],
        ),

        // -----------------
        // Arming
        // -----------------
        (Arming { consult_id }, AudioStartOk { id, wav_path }) if *consult_id == id => (
            Recording {
                consult_id: id,
                wav_path,
                started_at: Instant::now(),
            },
            vec![StartRecordingTick { id }, Render],
        ),
        (Arming { consult_id }, AudioStartFail { id, err }) if *consult_id == id => (
            Error {
                message: err,
                last_transcript: None,
            },
            vec![Cleanup { id, wav_path: None }, Render],
        ),
        (Arming { consult_id }, Cancel) => (
            Idle,
            vec![
                // Stop audio in case it started between cancel and AudioStartOk
                StopAudio { id: *consult_id },
                Cleanup {
                    id: *consult_id,
                    wav_path: None,
                },
                Render,
            ],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                consult_id,
                wav_path,
                ..
            },
            StopRecording,
        ) => (
            Stopping {
                consult_id: *consult_id,
                wav_path: wav_path.clone(),
            },
            vec![StopAudio { id: *consult_id }, Render],
        ),
        // Cancel during recording aborts without transcription
        (
            Recording {
                consult_id,
                wav_path,
                ..
            },
            Cancel,
        ) => (
            Idle,
            vec![
                StopAudio { id: *consult_id },
                Cleanup {
                    id: *consult_id,
                    wav_path: Some(wav_path.clone()),
                },
                Render,
            ],
        ),
        // Tick during recording - enforce the maximum duration
        (
            Recording {
                consult_id,
                wav_path,
                started_at,
            },
            RecordingTick { id },
        ) if *consult_id == id => {
            let elapsed = started_at.elapsed();
            if elapsed >= MAX_RECORDING_DURATION {
                tracing::warn!(
                    consult_id = %consult_id,
                    ?elapsed,
                    "recording auto-stopped (max duration reached)"
                );
                (
                    Stopping {
                        consult_id: id,
                        wav_path: wav_path.clone(),
                    },
                    vec![StopAudio { id }, Render],
                )
            } else {
                (state.clone(), vec![])
            }
        }

        // -----------------
        // Stopping
        // -----------------
        (
            Stopping {
                consult_id,
                wav_path,
            },
            AudioStopOk { id },
        ) if *consult_id == id => (
            Transcribing {
                consult_id: id,
                wav_path: wav_path.clone(),
            },
            vec![
                StartTranscription {
                    id,
                    wav_path: wav_path.clone(),
                },
                Render,
            ],
        ),
        (
            Stopping { consult_id, .. },
            NoSpeechDetected {
                id,
                source,
                message,
            },
        ) if *consult_id == id => (
            NoSpeech {
                consult_id: id,
                source,
                message,
            },
            vec![Render],
        ),
        (
            Stopping {
                consult_id,
                wav_path,
            },
            AudioStopFail { id, err },
        ) if *consult_id == id => (
            Error {
                message: err,
                last_transcript: None,
            },
            vec![
                Cleanup {
                    id,
                    wav_path: Some(wav_path.clone()),
                },
                Render,
            ],
        ),

        // -----------------
        // Transcribing
        // -----------------
        (Transcribing { consult_id, .. }, TranscribeOk { id, text }) if *consult_id == id => (
            Review {
                consult_id: id,
                transcript: text.clone(),
                note: None,
            },
            vec![ArchiveTranscript { id, text }, Render],
        ),
        (
            Transcribing { consult_id, .. },
            NoSpeechDetected {
                id,
                source,
                message,
            },
        ) if *consult_id == id => (
            NoSpeech {
                consult_id: id,
                source,
                message,
            },
            vec![Render],
        ),
        (
            Transcribing {
                consult_id,
                wav_path,
            },
            TranscribeFail { id, err },
        ) if *consult_id == id => (
            Error {
                message: err,
                last_transcript: None,
            },
            vec![
                Cleanup {
                    id,
                    wav_path: Some(wav_path.clone()),
                },
                Render,
            ],
        ),
        (
            Transcribing {
                consult_id,
                wav_path,
            },
            Cancel,
        ) => (
            Idle,
            vec![
                Cleanup {
                    id: *consult_id,
                    wav_path: Some(wav_path.clone()),
                },
                Render,
            ],
        ),

        // -----------------
        // Review (transcript held)
        // -----------------
        (
            Review {
                consult_id,
                transcript,
                ..
            },
            GenerateNote,
        ) => (
            Generating {
                consult_id: *consult_id,
                transcript: transcript.clone(),
            },
            vec![
                StartNoteGeneration {
                    id: *consult_id,
                    transcript: transcript.clone(),
                },
                Render,
            ],
        ),
        (
            Review {
                transcript, note, ..
            },
            SaveSession,
        ) => (
            state.clone(),
            vec![SaveToDisk {
                transcript: transcript.clone(),
                note: note.clone(),
            }],
        ),
        (
            Review {
                transcript, note, ..
            },
            CopySession,
        ) => {
            // Prefer the note; fall back to the transcript before one exists.
            let text = note.clone().unwrap_or_else(|| transcript.clone());
            (state.clone(), vec![CopyToClipboard { text }])
        }

        // -----------------
        // Generating
        // -----------------
        (
            Generating {
                consult_id,
                transcript,
            },
            NoteOk { id, note },
        ) if *consult_id == id => (
            Review {
                consult_id: id,
                transcript: transcript.clone(),
                note: Some(note),
            },
            vec![Render],
        ),
        (Generating { consult_id, transcript }, NoteFail { id, err }) if *consult_id == id => (
            Error {
                message: err,
                last_transcript: Some(transcript.clone()),
            },
            vec![Render],
        ),
        // Cancel note generation: back to review. A fresh consultation id
        // stales out the in-flight completion.
        (Generating { transcript, .. }, Cancel) => (
            Review {
                consult_id: Uuid::new_v4(),
                transcript: transcript.clone(),
                note: None,
            },
            vec![Render],
        ),

        // -----------------
        // NoSpeech / Error recovery
        // -----------------
        (NoSpeech { .. }, Cancel) => (Idle, vec![Render]),
        // Cancel from Error restores the transcript when one survived
        // (a failed note generation keeps its transcript).
        (
            Error {
                last_transcript: Some(transcript),
                ..
            },
            Cancel,
        ) => (
            Review {
                consult_id: Uuid::new_v4(),
                transcript: transcript.clone(),
                note: None,
            },
            vec![Render],
        ),
        (Error { .. }, Cancel) => (Idle, vec![Render]),

        // -----------------
        // Session-wide commands
        // -----------------
        (_, Show) => (state.clone(), vec![Render]),
        (_, ClearSession) => {
            let wav_path = match state {
                Recording { wav_path, .. }
                | Stopping { wav_path, .. }
                | Transcribing { wav_path, .. } => Some(wav_path.clone()),
                _ => None,
            };
            let effects = match current_id {
                Some(id) => vec![StopAudio { id }, Cleanup { id, wav_path }, Render],
                None => vec![Render],
            };
            (Idle, effects)
        }

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, AudioStartOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStartFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStopOk { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStopFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, NoSpeechDetected { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscribeOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscribeFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, NoteOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, NoteFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
