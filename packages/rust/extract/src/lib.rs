//! Readable-text extraction for reference pages.
//!
//! This crate provides:
//! - [`extract_main_text`]: best-guess main text of an HTML document
//! - [`PageFetcher`] / [`HttpFetcher`]: the outbound page fetch seam
//! - [`ReferenceScraper`]: fetch + extract, absorbing every failure into ""

mod fetch;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

pub use fetch::{HttpFetcher, PageFetcher, ReferenceScraper};

/// Candidate content containers. Every selector is tried; the longest text wins.
const CONTENT_SELECTORS: [&str; 5] = [
    "article",
    "main",
    ".post-content",
    ".article-content",
    ".entry-content",
];

/// Paragraphs at or below this many characters are treated as boilerplate.
pub const MIN_PARAGRAPH_CHARS: usize = 50;

/// Hard cap on extracted text, in characters.
pub const MAX_EXTRACT_CHARS: usize = 8_000;

/// Elements whose text never counts as readable content.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

static CONTENT_SEL: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid content selector"))
        .collect()
});

static PARAGRAPH_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid paragraph selector"));

/// Extract the main readable text from `html`.
///
/// Returns an empty string when nothing usable is found.
pub fn extract_main_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let mut content = String::new();
    let mut content_chars = 0;

    for selector in CONTENT_SEL.iter() {
        let text: String = doc.select(selector).map(visible_text).collect();
        let trimmed = text.trim();
        let chars = trimmed.chars().count();
        if chars > content_chars {
            content = trimmed.to_string();
            content_chars = chars;
        }
    }

    if content.is_empty() {
        content = doc
            .select(&PARAGRAPH_SEL)
            .map(visible_text)
            .map(|p| p.trim().to_string())
            .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    refresh_shared::truncate_chars(&content, MAX_EXTRACT_CHARS).to_string()
}

/// Concatenated text nodes under `el`, skipping script-like subtrees.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_sentence(word: &str) -> String {
        format!("{word} ").repeat(20).trim().to_string()
    }

    #[test]
    fn no_selector_and_short_paragraphs_yield_empty() {
        let html = r#"<html><body>
            <div><p>Tiny caption.</p><p>Another short line under fifty chars.</p></div>
            <span>Loose text that is not in a paragraph at all, however long it may be.</span>
        </body></html>"#;
        assert_eq!(extract_main_text(html), "");
    }

    #[test]
    fn longest_candidate_wins_over_earlier_selector() {
        let html = r#"<html><body>
            <article>Short teaser.</article>
            <div class="entry-content">This entry content block is much longer than the teaser
            and carries the full body of the post.</div>
        </body></html>"#;
        let text = extract_main_text(html);
        assert!(text.starts_with("This entry content block"));
        assert!(!text.contains("Short teaser"));
    }

    #[test]
    fn broader_selector_beats_nested_fragment() {
        let html = r#"<html><body><main>
            <h1>Heading</h1>
            <div class="post-content">Inner body.</div>
            <p>Trailing notes live outside the post-content container.</p>
        </main></body></html>"#;
        let text = extract_main_text(html);
        assert!(text.contains("Heading"));
        assert!(text.contains("Inner body."));
        assert!(text.contains("Trailing notes"));
    }

    #[test]
    fn all_matches_of_a_selector_are_concatenated() {
        let html = "<html><body><article>One.</article><article>Two.</article></body></html>";
        assert_eq!(extract_main_text(html), "One.Two.");
    }

    #[test]
    fn paragraph_fallback_filters_and_joins() {
        let first = long_sentence("alpha");
        let second = long_sentence("beta");
        let html = format!(
            "<html><body><div><p>{first}</p><p>Too short.</p><p>  {second}  </p></div></body></html>"
        );
        assert_eq!(extract_main_text(&html), format!("{first}\n\n{second}"));
    }

    #[test]
    fn paragraph_of_exactly_threshold_is_dropped() {
        let exact = "x".repeat(MIN_PARAGRAPH_CHARS);
        let html = format!("<html><body><p>{exact}</p></body></html>");
        assert_eq!(extract_main_text(&html), "");
    }

    #[test]
    fn output_is_capped() {
        let body = "word ".repeat(4_000);
        let html = format!("<html><body><article>{body}</article></body></html>");
        let text = extract_main_text(&html);
        assert_eq!(text.chars().count(), MAX_EXTRACT_CHARS);
    }

    #[test]
    fn multibyte_output_is_capped_by_chars() {
        let body = "é".repeat(MAX_EXTRACT_CHARS + 500);
        let html = format!("<html><body><main>{body}</main></body></html>");
        let text = extract_main_text(&html);
        assert_eq!(text.chars().count(), MAX_EXTRACT_CHARS);
    }

    #[test]
    fn script_and_style_text_is_ignored() {
        let html = r#"<html><body><article>
            <script>window.analytics = { track: function() {} };</script>
            <style>.x { color: red; }</style>
            Visible body.
        </article></body></html>"#;
        assert_eq!(extract_main_text(html), "Visible body.");
    }

    #[test]
    fn garbage_input_does_not_panic() {
        assert_eq!(extract_main_text(""), "");
        assert_eq!(extract_main_text("<<<>>>not html"), "");
    }
}
