//! Console front end for the interactive session.
//!
//! The console thread owns stdin: it parses typed commands into events for
//! the state loop, and handles the two interactions that need the whole
//! terminal ($EDITOR and paste mode) inline before handing the result back
//! as an event. Rendering of state changes happens on the session loop side
//! via `render()`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::api_key;
use crate::metrics::MetricsCollector;
use crate::settings::AppSettings;
use crate::state_machine::{Event, State};

pub const WELCOME: &str = "dentascribe - dental consultation transcription and SOAP notes\nType 'help' for commands.";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Record,
    Stop,
    Cancel,
    Load(PathBuf),
    Paste,
    Edit,
    Note,
    Save,
    Copy,
    Show,
    Status,
    Clear,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

/// Parse one input line into a command.
pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleCommand::Empty;
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "record" | "rec" => ConsoleCommand::Record,
        "stop" => ConsoleCommand::Stop,
        "cancel" => ConsoleCommand::Cancel,
        // `transcribe <file>` is an alias: loading a file transcribes it
        "load" | "transcribe" if !rest.is_empty() => ConsoleCommand::Load(PathBuf::from(rest)),
        "load" | "transcribe" => {
            ConsoleCommand::Unknown("load requires a file path: load <audio file>".to_string())
        }
        "paste" | "text" => ConsoleCommand::Paste,
        "edit" => ConsoleCommand::Edit,
        "note" | "generate" | "soap" => ConsoleCommand::Note,
        "save" | "download" => ConsoleCommand::Save,
        "copy" => ConsoleCommand::Copy,
        "show" => ConsoleCommand::Show,
        "status" => ConsoleCommand::Status,
        "clear" => ConsoleCommand::Clear,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => ConsoleCommand::Unknown(format!("unknown command '{}'", other)),
    }
}

pub fn help_text() -> &'static str {
    "Commands:\n\
     \x20 record           start recording the consultation microphone\n\
     \x20 stop             stop recording and transcribe\n\
     \x20 load <file>      transcribe an audio file (wav, mp3, m4a, ogg)\n\
     \x20 paste            type or paste a transcript (finish with a lone '.')\n\
     \x20 edit             open the transcript in $EDITOR\n\
     \x20 note             generate the SOAP note from the transcript\n\
     \x20 show             print the transcript and note\n\
     \x20 save             save the note (or transcript) to a timestamped file\n\
     \x20 copy             copy the note (or transcript) to the clipboard\n\
     \x20 status           session metrics and API key status\n\
     \x20 cancel           abort the operation in progress\n\
     \x20 clear            discard transcript and note, reset the session\n\
     \x20 quit             exit"
}

/// Render the current workflow state to the terminal.
pub fn render(state: &State) {
    match state {
        State::Idle => {
            println!("Session idle. 'record' to capture audio, 'load <file>' for an audio file, 'paste' for text.");
        }
        State::Arming { .. } => {
            println!("Starting microphone...");
        }
        State::Recording { .. } => {
            println!("Recording. 'stop' to finish and transcribe, 'cancel' to discard.");
        }
        State::Stopping { .. } => {
            println!("Finishing recording...");
        }
        State::Transcribing { .. } => {
            println!("Transcribing audio...");
        }
        State::Review {
            transcript, note, ..
        } => {
            println!("--- Transcript ---");
            println!("{}", transcript);
            println!("------------------");
            if let Some(note) = note {
                println!("--- SOAP note ---");
                println!("{}", note);
                println!("-----------------");
                println!("'save' to write the note, 'copy' for the clipboard, 'note' to regenerate.");
            } else {
                println!("'edit' to revise, 'note' to generate the SOAP note.");
            }
        }
        State::Generating { .. } => {
            println!("Generating SOAP note...");
        }
        State::NoSpeech {
            message, source, ..
        } => {
            println!("No speech ({}): {}", source.as_str(), message);
        }
        State::Error { message, .. } => {
            println!("Error: {}", message);
            println!("'cancel' to go back, 'record' to try again.");
        }
    }
}

fn print_status(metrics: &MetricsCollector, settings: &AppSettings) {
    let summary = metrics.get_summary();
    println!(
        "Consultations: {} total, {} ok, {} failed",
        summary.total_cycles, summary.successful_cycles, summary.failed_cycles
    );
    if summary.successful_cycles > 0 {
        println!(
            "Averages: recording {}ms, transcription {}ms, full cycle {}ms",
            summary.avg_recording_duration_ms,
            summary.avg_transcription_duration_ms,
            summary.avg_total_cycle_ms
        );
    }
    let notes = &summary.note_generation;
    if notes.attempts > 0 {
        println!(
            "Notes: {}/{} generated, avg {}ms, last {} chars",
            notes.successes,
            notes.attempts,
            notes.avg_duration_ms(),
            notes.last_note_chars
        );
    }
    if let Some(err) = &summary.last_error {
        println!("Last error [{}]: {}", err.error_type, err.message);
    }

    match api_key::resolve_api_key_with_source() {
        Some((key, source)) => println!(
            "API key: {} (from {})",
            api_key::mask_key(&key),
            source.as_str()
        ),
        None => println!("API key: not configured (set OPENAI_API_KEY or run `dentascribe key set`)"),
    }
    println!(
        "Output directory: {}",
        crate::archive::output_dir(settings).display()
    );
}

/// Read lines until a line containing only ".", the paste-mode terminator.
fn read_pasted_transcript(input: &mut impl std::io::BufRead) -> std::io::Result<String> {
    let mut collected: Vec<String> = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let n = input.read_line(&mut line)?;
        if n == 0 {
            break; // EOF ends paste mode too
        }
        if line.trim_end_matches(['\r', '\n']) == "." {
            break;
        }
        collected.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(collected.join("\n"))
}

/// Open the transcript in $VISUAL/$EDITOR via a temp file.
fn edit_transcript(current: &str) -> Result<String, String> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .map_err(|_| "Set $EDITOR (or $VISUAL) to edit the transcript".to_string())?;

    let path = std::env::temp_dir().join(format!("dentascribe_edit_{}.txt", Uuid::new_v4()));
    std::fs::write(&path, current).map_err(|e| format!("Failed to write temp file: {}", e))?;

    let status = std::process::Command::new(&editor)
        .arg(&path)
        .status()
        .map_err(|e| format!("Failed to launch editor '{}': {}", editor, e));

    let result = match status {
        Ok(status) if status.success() => {
            std::fs::read_to_string(&path).map_err(|e| format!("Failed to read edited file: {}", e))
        }
        Ok(status) => Err(format!("Editor exited with {}", status)),
        Err(e) => Err(e),
    };

    let _ = std::fs::remove_file(&path);
    result
}

/// Console input loop. Runs on its own (non-async) thread; it is the only
/// reader of stdin, which lets $EDITOR and paste mode take the terminal.
pub fn run_console(
    tx: mpsc::Sender<Event>,
    state_rx: watch::Receiver<State>,
    metrics: Arc<Mutex<MetricsCollector>>,
    settings: Arc<AppSettings>,
) {
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                // EOF: treat as quit
                let _ = tx.blocking_send(Event::Exit);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("stdin read failed: {}", e);
                let _ = tx.blocking_send(Event::Exit);
                break;
            }
        }

        let event = match parse_line(&line) {
            ConsoleCommand::Empty => continue,
            ConsoleCommand::Help => {
                println!("{}", help_text());
                continue;
            }
            ConsoleCommand::Status => {
                let metrics_guard = metrics.blocking_lock();
                print_status(&metrics_guard, &settings);
                continue;
            }
            ConsoleCommand::Unknown(message) => {
                println!("{} (type 'help' for commands)", message);
                continue;
            }
            ConsoleCommand::Paste => {
                println!("Enter the transcript; finish with a line containing only '.'");
                match read_pasted_transcript(&mut stdin.lock()) {
                    Ok(text) if text.trim().is_empty() => {
                        println!("Nothing entered, transcript unchanged.");
                        continue;
                    }
                    Ok(text) => Event::SetTranscript { text },
                    Err(e) => {
                        println!("Paste failed: {}", e);
                        continue;
                    }
                }
            }
            ConsoleCommand::Edit => {
                // Editing needs the current transcript; take it from the
                // state snapshot the session loop publishes.
                let transcript = match &*state_rx.borrow() {
                    State::Review { transcript, .. } => transcript.clone(),
                    _ => {
                        println!("No transcript to edit yet.");
                        continue;
                    }
                };
                match edit_transcript(&transcript) {
                    Ok(text) if text.trim().is_empty() => {
                        println!("Edited transcript is empty, keeping the previous one.");
                        continue;
                    }
                    Ok(text) => Event::SetTranscript { text },
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                }
            }
            ConsoleCommand::Quit => {
                let _ = tx.blocking_send(Event::Exit);
                break;
            }
            ConsoleCommand::Record => Event::StartRecording,
            ConsoleCommand::Stop => Event::StopRecording,
            ConsoleCommand::Cancel => Event::Cancel,
            ConsoleCommand::Load(path) => Event::LoadAudio { path },
            ConsoleCommand::Note => Event::GenerateNote,
            ConsoleCommand::Save => Event::SaveSession,
            ConsoleCommand::Copy => Event::CopySession,
            ConsoleCommand::Show => Event::Show,
            ConsoleCommand::Clear => Event::ClearSession,
        };

        if tx.blocking_send(event).is_err() {
            // Session loop is gone
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_commands() {
        assert_eq!(parse_line("record"), ConsoleCommand::Record);
        assert_eq!(parse_line("  stop  "), ConsoleCommand::Stop);
        assert_eq!(parse_line("NOTE"), ConsoleCommand::Note);
        assert_eq!(parse_line("q"), ConsoleCommand::Quit);
        assert_eq!(parse_line(""), ConsoleCommand::Empty);
        assert_eq!(parse_line("   "), ConsoleCommand::Empty);
    }

    #[test]
    fn parses_load_with_path() {
        assert_eq!(
            parse_line("load /tmp/consult.mp3"),
            ConsoleCommand::Load(PathBuf::from("/tmp/consult.mp3"))
        );
        // Paths with spaces take the rest of the line
        assert_eq!(
            parse_line("load /tmp/morning consult.wav"),
            ConsoleCommand::Load(PathBuf::from("/tmp/morning consult.wav"))
        );
        // `transcribe` is an alias
        assert_eq!(
            parse_line("transcribe audio.wav"),
            ConsoleCommand::Load(PathBuf::from("audio.wav"))
        );
    }

    #[test]
    fn load_without_path_is_reported() {
        assert!(matches!(parse_line("load"), ConsoleCommand::Unknown(_)));
    }

    #[test]
    fn unknown_commands_are_reported() {
        match parse_line("frobnicate") {
            ConsoleCommand::Unknown(msg) => assert!(msg.contains("frobnicate")),
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn paste_terminator_is_a_lone_dot() {
        let input = "Patient: my tooth hurts.\nDentist: which one?\n.\nignored\n";
        let mut cursor = std::io::Cursor::new(input);
        let text = read_pasted_transcript(&mut cursor).unwrap();
        assert_eq!(text, "Patient: my tooth hurts.\nDentist: which one?");
    }

    #[test]
    fn paste_stops_at_eof_without_terminator() {
        let input = "only line";
        let mut cursor = std::io::Cursor::new(input);
        let text = read_pasted_transcript(&mut cursor).unwrap();
        assert_eq!(text, "only line");
    }
}
