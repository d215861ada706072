use std::sync::LazyLock;

use regex::Regex;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s\x{4e00}-\x{9fff}]").expect("punctuation pattern is valid")
});

/// CJK Unified Ideographs block, the range that switches a token to
/// per-character comparison.
pub fn is_cjk_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

/// Splits text into comparison tokens.
///
/// Lower-cases, drops everything that is not a word character, whitespace or
/// ideograph, then splits on whitespace. A token containing any ideograph is
/// exploded into one token per character, Latin letters inside it included.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, "");

    let mut tokens = Vec::new();
    for word in cleaned.split_whitespace() {
        if word.chars().any(is_cjk_ideograph) {
            tokens.extend(
                word.chars()
                    .filter(|ch| !ch.is_whitespace())
                    .map(String::from),
            );
        } else {
            tokens.push(word.to_string());
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_splits_into_words() {
        assert_eq!(tokenize("The cat, sat!"), ["the", "cat", "sat"]);
        assert_eq!(tokenize("don't  stop_now"), ["dont", "stop_now"]);
    }

    #[test]
    fn cjk_text_splits_into_characters() {
        assert_eq!(tokenize("今天，天气"), ["今", "天", "天", "气"]);
    }

    #[test]
    fn mixed_token_explodes_every_character() {
        assert_eq!(tokenize("ok 第1集"), ["ok", "第", "1", "集"]);
        assert_eq!(tokenize("hi你好 there"), ["h", "i", "你", "好", "there"]);
    }

    #[test]
    fn empty_and_punctuation_only_input_yield_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" ...!? ").is_empty());
    }
}
