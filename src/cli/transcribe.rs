//! One-shot transcription command.

use std::path::Path;

use crate::cli::args::TranscribeArgs;
use crate::settings::AppSettings;
use crate::transcription;

/// Run the transcribe command: one API call, print or save the transcript.
pub async fn run(args: TranscribeArgs, settings: &AppSettings) -> Result<(), String> {
    if !args.input.exists() {
        return Err(format!("Audio file not found: {}", args.input.display()));
    }

    let model = args.model.as_deref().unwrap_or(&settings.whisper_model);

    eprintln!("Transcribing {} ({})...", args.input.display(), model);
    let transcript = transcription::transcribe_audio(&args.input, model)
        .await
        .map_err(|e| e.to_string())?;

    if transcript.trim().is_empty() {
        eprintln!("Warning: transcription returned no text (no speech detected?)");
    }

    write_output(&transcript, args.output.as_deref())
}

pub(crate) fn write_output(text: &str, output: Option<&Path>) -> Result<(), String> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            eprintln!("Saved to {}", path.display());
            Ok(())
        }
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_output_creates_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("transcript.txt");

        write_output("patient reports molar pain", Some(&path)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "patient reports molar pain"
        );
    }

    #[test]
    fn write_output_reports_unwritable_path() {
        let err = write_output("text", Some(Path::new("/nonexistent-dir/out.txt"))).unwrap_err();
        assert!(err.contains("Failed to write"));
    }

    #[tokio::test]
    async fn missing_input_file_is_a_clean_error() {
        let args = TranscribeArgs {
            input: "/tmp/definitely_missing_dentascribe.wav".into(),
            output: None,
            model: None,
        };
        let err = run(args, &AppSettings::default()).await.unwrap_err();
        assert!(err.contains("not found"));
        assert!(err.contains("definitely_missing_dentascribe.wav"));
    }
}
