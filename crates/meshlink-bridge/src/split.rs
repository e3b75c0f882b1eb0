//! Outbound message splitting
//!
//! Mesh text packets carry at most [`meshlink_meshtastic::MAX_TEXT_PAYLOAD`]
//! bytes. Longer Matrix messages are split on grapheme boundaries (so emoji
//! and combining sequences never straddle packets) and numbered with a
//! trailing ` (n/N)` marker. Concatenating the parts without their markers
//! reproduces the original text exactly.

use unicode_segmentation::UnicodeSegmentation;

/// Byte budget reserved for the ` (n/N)` part marker
const MARKER_RESERVE: usize = 12;

/// Split `text` into mesh-sized parts of at most `max_bytes` each.
///
/// Text that already fits is returned as a single unmarked part.
pub fn split_for_mesh(text: &str, max_bytes: usize) -> Vec<String> {
    if text.len() <= max_bytes {
        return vec![text.to_string()];
    }

    let budget = max_bytes.saturating_sub(MARKER_RESERVE).max(1);
    let mut chunks: Vec<String> = vec![String::new()];
    for grapheme in text.graphemes(true) {
        let current = chunks.last_mut().expect("chunks is never empty");
        if !current.is_empty() && current.len() + grapheme.len() > budget {
            chunks.push(String::new());
        }
        chunks
            .last_mut()
            .expect("chunks is never empty")
            .push_str(grapheme);
    }

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("{} ({}/{})", chunk, i + 1, total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 200;

    fn strip_marker(part: &str) -> &str {
        match part.rfind(" (") {
            Some(idx) => &part[..idx],
            None => part,
        }
    }

    #[test]
    fn test_short_text_is_untouched() {
        let parts = split_for_mesh("hello mesh", MAX);
        assert_eq!(parts, vec!["hello mesh".to_string()]);
    }

    #[test]
    fn test_exact_fit_is_untouched() {
        let text = "x".repeat(MAX);
        assert_eq!(split_for_mesh(&text, MAX), vec![text.clone()]);
    }

    #[test]
    fn test_long_text_parts_fit_and_are_numbered() {
        let text = "a".repeat(450);
        let parts = split_for_mesh(&text, MAX);
        assert_eq!(parts.len(), 3);
        for (i, part) in parts.iter().enumerate() {
            assert!(part.len() <= MAX, "part {} is {} bytes", i, part.len());
            assert!(part.ends_with(&format!("({}/3)", i + 1)));
        }
    }

    #[test]
    fn test_concatenation_reproduces_original() {
        let text = "The quick brown fox 🦊 jumps over the lazy dog 🐶. ".repeat(12);
        let parts = split_for_mesh(&text, MAX);
        assert!(parts.len() > 1);
        let rebuilt: String = parts.iter().map(|p| strip_marker(p)).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_graphemes_never_straddle_parts() {
        // Family emoji is a multi-codepoint ZWJ sequence; every part must
        // still be valid UTF-8 with the sequence intact
        let text = "👨‍👩‍👧‍👦".repeat(40);
        let parts = split_for_mesh(&text, MAX);
        assert!(parts.len() > 1);
        for part in &parts {
            let body = strip_marker(part);
            assert_eq!(body.len() % "👨‍👩‍👧‍👦".len(), 0);
        }
    }

    #[test]
    fn test_multibyte_boundary_safety() {
        let text = "é".repeat(300);
        for part in split_for_mesh(&text, MAX) {
            assert!(part.len() <= MAX);
            assert!(std::str::from_utf8(part.as_bytes()).is_ok());
        }
    }
}
