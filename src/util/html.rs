use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Converts rich-text fields from the task API into Markdown.
///
/// Conversion is best effort and never fails outward.
pub trait TextConverter: Send + Sync {
    fn convert(&self, text: &str) -> String;
}

/// HTML to Markdown via `htmd`, falling back to tag stripping.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlToMarkdown;

impl TextConverter for HtmlToMarkdown {
    fn convert(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        match htmd::convert(text) {
            Ok(markdown) => tidy(&markdown),
            Err(e) => {
                debug!(error = %e, "HTML conversion failed, falling back to stripped text");
                strip_tags(text)
            }
        }
    }
}

/// Remove anything that looks like a tag and tidy the remaining text.
pub fn strip_tags(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("Valid regex pattern"));
    tidy(&re.replace_all(text, ""))
}

fn tidy(text: &str) -> String {
    textwrap::dedent(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_basic_html() {
        let md = HtmlToMarkdown.convert("<p>Hello <strong>world</strong></p>");
        assert!(md.contains("Hello"));
        assert!(md.contains("**world**"));
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(HtmlToMarkdown.convert(""), "");
        assert_eq!(HtmlToMarkdown.convert("   \n"), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(HtmlToMarkdown.convert("just some text"), "just some text");
    }

    #[test]
    fn strip_tags_fallback() {
        assert_eq!(strip_tags("<p>one <em>two</em></p>\n"), "one two");
        assert_eq!(strip_tags("    indented\n    block  "), "indented\nblock");
    }
}
