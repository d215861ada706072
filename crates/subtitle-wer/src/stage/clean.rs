//! Normalization of raw recognizer output before merging.

/// Collapses whitespace runs and trims; returns an empty string when nothing
/// readable is left.
///
/// Text is readable when it contains at least one alphanumeric character;
/// CJK ideographs count as alphabetic. Symbol-only output such as `"•••"`,
/// `"---"` or `"| |"` is a common recognition artifact and is dropped.
pub fn clean_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || !collapsed.chars().any(char::is_alphanumeric) {
        return String::new();
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_newlines() {
        assert_eq!(clean_text("  Hello \n\t world  "), "Hello world");
        assert_eq!(clean_text("第一行\n第二行"), "第一行 第二行");
    }

    #[test]
    fn rejects_symbol_only_output() {
        for noise in ["", "   ", "•••", "---", "| |", "_ _", "。，！", "*#@"] {
            assert_eq!(clean_text(noise), "", "{noise:?}");
        }
    }

    #[test]
    fn keeps_short_but_meaningful_text() {
        assert_eq!(clean_text("A"), "A");
        assert_eq!(clean_text("好"), "好");
        assert_eq!(clean_text("- 42 -"), "- 42 -");
        assert_eq!(clean_text("• Ça va?"), "• Ça va?");
        assert_eq!(clean_text("…\u{3400}…"), "…\u{3400}…");
    }
}
