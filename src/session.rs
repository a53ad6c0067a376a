//! Interactive consultation session.
//!
//! Wires the console thread, the state loop, and the effect runner together.
//! The state loop is the single writer of the workflow `State`; the console
//! observes it through a watch channel and feeds events in through mpsc.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};

use crate::console;
use crate::effects::{ApiEffectRunner, EffectRunner};
use crate::metrics::MetricsCollector;
use crate::settings::AppSettings;
use crate::state_machine::{reduce, Effect, Event, State};

/// Short, content-free labels for logging. Transcripts and notes are
/// clinical text and must never end up in the log output.
fn state_label(state: &State) -> &'static str {
    match state {
        State::Idle => "idle",
        State::Arming { .. } => "arming",
        State::Recording { .. } => "recording",
        State::Stopping { .. } => "stopping",
        State::Transcribing { .. } => "transcribing",
        State::Review { .. } => "review",
        State::Generating { .. } => "generating",
        State::NoSpeech { .. } => "no_speech",
        State::Error { .. } => "error",
    }
}

fn event_label(event: &Event) -> &'static str {
    match event {
        Event::StartRecording => "start_recording",
        Event::StopRecording => "stop_recording",
        Event::Cancel => "cancel",
        Event::LoadAudio { .. } => "load_audio",
        Event::SetTranscript { .. } => "set_transcript",
        Event::GenerateNote => "generate_note",
        Event::SaveSession => "save_session",
        Event::CopySession => "copy_session",
        Event::Show => "show",
        Event::ClearSession => "clear_session",
        Event::Exit => "exit",
        Event::RecordingTick { .. } => "recording_tick",
        Event::AudioStartOk { .. } => "audio_start_ok",
        Event::AudioStartFail { .. } => "audio_start_fail",
        Event::AudioStopOk { .. } => "audio_stop_ok",
        Event::AudioStopFail { .. } => "audio_stop_fail",
        Event::NoSpeechDetected { .. } => "no_speech_detected",
        Event::TranscribeOk { .. } => "transcribe_ok",
        Event::TranscribeFail { .. } => "transcribe_fail",
        Event::NoteOk { .. } => "note_ok",
        Event::NoteFail { .. } => "note_fail",
    }
}

/// Run the interactive session until the user quits.
pub async fn run_session(settings: AppSettings) {
    let settings = Arc::new(settings);
    let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
    let runner: Arc<dyn EffectRunner> = ApiEffectRunner::new(metrics.clone(), settings.clone());

    let (tx, rx) = mpsc::channel::<Event>(32);
    let (state_tx, state_rx) = watch::channel(State::default());

    println!("{}", console::WELCOME);
    console::render(&State::default());

    // The console thread owns stdin (so $EDITOR and paste mode can take the
    // terminal) and talks to the state loop over channels.
    {
        let tx = tx.clone();
        let metrics = metrics.clone();
        let settings = settings.clone();
        std::thread::spawn(move || console::run_console(tx, state_rx, metrics, settings));
    }

    run_state_loop(rx, tx, state_tx, runner).await;
}

/// The single-writer state loop: receives events, reduces, executes effects.
pub async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    state_tx: watch::Sender<State>,
    runner: Arc<dyn EffectRunner>,
) {
    let mut state = State::default();
    tracing::info!("session loop started");

    while let Some(event) = rx.recv().await {
        tracing::debug!(event = event_label(&event), "received event");

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            tracing::info!("exit requested, shutting down session loop");
            break;
        }

        let from_console = event.is_console_command();
        let (next, effects) = reduce(&state, event);

        if std::mem::discriminant(&state) != std::mem::discriminant(&next) {
            tracing::info!(
                from = state_label(&state),
                to = state_label(&next),
                "state transition"
            );
        }

        state = next;
        let _ = state_tx.send(state.clone());

        // A console command the reducer dropped deserves a hint instead of
        // silence.
        if from_console && effects.is_empty() {
            println!("That command isn't available right now (type 'help').");
        }

        for eff in effects {
            match eff {
                Effect::Render => console::render(&state),
                other => runner.spawn(other, tx.clone()),
            }
        }
    }

    tracing::info!("session loop ended");
}
