//! One-shot SOAP note generation from a transcript file.

use crate::archive;
use crate::cli::args::NoteArgs;
use crate::cli::transcribe::write_output;
use crate::notegen;
use crate::settings::AppSettings;

/// Run the note command: load the transcript, one API call, print or save.
pub async fn run(args: NoteArgs, settings: &AppSettings) -> Result<(), String> {
    let transcript = archive::load_transcript(&args.transcript).map_err(|e| e.to_string())?;

    let mut settings = settings.clone();
    if let Some(model) = args.model {
        settings.chat_model = model;
    }

    eprintln!(
        "Generating SOAP note from {} ({})...",
        args.transcript.display(),
        settings.chat_model
    );
    let note = notegen::generate_note(&transcript, &settings)
        .await
        .map_err(|e| e.to_string())?;

    write_output(&note, args.output.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_transcript_file_is_a_clean_error() {
        let args = NoteArgs {
            transcript: "/tmp/definitely_missing_dentascribe.txt".into(),
            output: None,
            model: None,
        };
        let err = run(args, &AppSettings::default()).await.unwrap_err();
        assert!(err.contains("not found"));
        assert!(err.contains("definitely_missing_dentascribe.txt"));
    }

    #[tokio::test]
    async fn empty_transcript_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();

        let args = NoteArgs {
            transcript: path,
            output: None,
            model: None,
        };
        let err = run(args, &AppSettings::default()).await.unwrap_err();
        assert!(err.contains("empty"));
    }
}
