//! Rewrite prompt construction.

use std::fmt::Write;

use refresh_shared::truncate_chars;

/// Characters of the original article sent to the model.
pub const MAX_ORIGINAL_CHARS: usize = 6_000;

/// Characters of each reference sent to the model.
pub const MAX_REFERENCE_CHARS: usize = 3_000;

pub const SYSTEM_PROMPT: &str =
    "You are a professional editor rewriting blog articles for clarity and structure.";

const INSTRUCTIONS: &str = "\
TASK:
- Rewrite the original article to improve clarity, structure and depth.
- Preserve the original topic and intent.
- Use the reference articles only as guidance for tone and structure.
- Do NOT copy sentences or phrases from the references.
- Do NOT mention the references or their sources.
- Do NOT open with phrases like \"Based on the article\".

FORMAT:
- Use markdown with ## and ### headings.
- Only add a conclusion section if it fits naturally.
- Keep the length similar to the original.
- Write in a professional, engaging business-blog style.";

/// Build the user prompt for one rewrite.
pub fn build_rewrite_prompt(original: &str, references: &[String]) -> String {
    let mut prompt = String::with_capacity(
        INSTRUCTIONS.len() + MAX_ORIGINAL_CHARS + references.len() * MAX_REFERENCE_CHARS + 256,
    );

    let _ = writeln!(
        prompt,
        "You are given an original blog article and {} reference articles.\n",
        references.len()
    );
    prompt.push_str(INSTRUCTIONS);

    let _ = write!(
        prompt,
        "\n\nOriginal Article:\n{}\n",
        truncate_chars(original, MAX_ORIGINAL_CHARS)
    );
    for (i, reference) in references.iter().enumerate() {
        let _ = write!(
            prompt,
            "\nReference {}:\n{}\n",
            i + 1,
            truncate_chars(reference, MAX_REFERENCE_CHARS)
        );
    }

    prompt.push_str("\nRewrite the original article following the instructions above.");
    prompt
}
