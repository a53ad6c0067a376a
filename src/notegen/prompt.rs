//! Prompt construction for SOAP note generation.
//!
//! Two fixed pieces of text surround the transcript: a system prompt that
//! pins the note format and forbids fabrication, and a short trailer after
//! the transcript identifying it as a dental consultation. Only the
//! documentation date is substituted at request time.

/// System prompt template. `{date}` is replaced with the documentation date.
const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are an experienced dental assistant responsible for clinical documentation. \
Generate a detailed and accurate SOAP note (Subjective, Objective, Assessment, Plan) \
based strictly on the consultation transcript provided.

- Use only information explicitly present in the transcript. Do not assume or fabricate details.
- Use professional medical and dental terminology appropriate for clinical documentation.
- The note will be included in the patient's official dental record, so keep a formal, clinical tone.
- Format the output as markdown.
- Use {date} as the documentation date.

Do not write a SOAP note on your own; only document what the provided conversation supports.

Required format:

**Date:** {date}
**Patient name:** [patient name, if stated in the transcript]

### Subjective:
- Patient-reported symptoms and concerns, in points.

### Objective:
- Clinical observations and findings from the conversation, in points.

### Assessment:
- Evaluation based on the subjective and objective information, in points.

### Plan:
- Recommended actions, next steps, or treatments, in points.
";

/// Fixed trailer appended after the transcript in the user message.
pub const CONSULTATION_TRAILER: &str = "\n\n=====>\nThis is a dental consultation with a patient. \
Please generate a SOAP (Subjective, Objective, Assessment, Plan) note for this conversation.";

/// Build the system prompt with the documentation date substituted in.
pub fn build_system_prompt(date: &str) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{date}", date)
}

/// Build the user message: the transcript verbatim, then the fixed trailer.
pub fn build_user_message(transcript: &str) -> String {
    format!("{}{}", transcript, CONSULTATION_TRAILER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_contains_exact_transcript_and_trailer() {
        let transcript = "Patient: my lower left molar hurts when I chew.\nDentist: how long?";
        let message = build_user_message(transcript);

        assert!(message.starts_with(transcript));
        assert!(message.ends_with(CONSULTATION_TRAILER));
        assert_eq!(
            message.len(),
            transcript.len() + CONSULTATION_TRAILER.len()
        );
    }

    #[test]
    fn trailer_identifies_the_consultation() {
        assert!(CONSULTATION_TRAILER.contains("dental consultation"));
        assert!(CONSULTATION_TRAILER.contains("SOAP"));
    }

    #[test]
    fn system_prompt_substitutes_the_date() {
        let prompt = build_system_prompt("2026-08-07");
        assert!(prompt.contains("**Date:** 2026-08-07"));
        assert!(prompt.contains("Use 2026-08-07 as the documentation date."));
        assert!(!prompt.contains("{date}"));
    }

    #[test]
    fn system_prompt_pins_the_soap_skeleton() {
        let prompt = build_system_prompt("2026-08-07");
        for section in [
            "### Subjective:",
            "### Objective:",
            "### Assessment:",
            "### Plan:",
        ] {
            assert!(prompt.contains(section), "missing section {}", section);
        }
        assert!(prompt.contains("Do not assume or fabricate"));
    }
}
