use once_cell::sync::Lazy;
use regex::Regex;

// "Page 3 of 12" style headers/footers left behind by exporters
static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bpage\s+\d+\s+of\s+\d+\b").unwrap());

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").unwrap());

/// Normalises extracted text: page markers and non-printable characters removed,
/// whitespace runs collapsed to one space inside a paragraph, paragraphs separated
/// by exactly one blank line.
pub fn clean_text(text: &str) -> String {
    let without_markers = PAGE_MARKER.replace_all(text, "");

    PARAGRAPH_BREAK
        .split(&without_markers)
        .map(|paragraph| {
            paragraph
                .chars()
                .filter(|c| !c.is_control() || c.is_whitespace())
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_spaces() {
        let raw = "This    has   too\nmany\tspaces.";
        assert_eq!(clean_text(raw), "This has too many spaces.");
    }

    #[test]
    fn test_remove_page_markers() {
        let raw = "Content here. Page 1 of 10 More content.";
        assert_eq!(clean_text(raw), "Content here. More content.");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n\n \t "), "");
    }

    #[test]
    fn test_control_characters_removed() {
        let raw = "Hello \u{0} World\u{7}";
        assert_eq!(clean_text(raw), "Hello World");
    }

    #[test]
    fn test_paragraphs_are_kept() {
        let raw = "First   paragraph\nstill first.\n   \n\n\nSecond one.";
        assert_eq!(clean_text(raw), "First paragraph still first.\n\nSecond one.");
    }
}
