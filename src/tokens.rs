//! Token cost estimation
//!
//! A cheap, tokenizer-free approximation. Word runs of alphanumerics and
//! underscores cost by length; every newline and punctuation or symbol
//! character costs one; other whitespace is free.

/// Estimated token cost of `text`
pub fn estimate_tokens(text: &str) -> usize {
    let mut tokens = 0;
    let mut word_len = 0;

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            word_len += 1;
            continue;
        }
        tokens += word_cost(word_len);
        word_len = 0;
        if c == '\n' || !c.is_whitespace() {
            tokens += 1;
        }
    }
    tokens + word_cost(word_len)
}

fn word_cost(len: usize) -> usize {
    match len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        _ => len.div_ceil(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \t  "), 0);
    }

    #[test]
    fn test_word_lengths() {
        assert_eq!(estimate_tokens("fn"), 1);
        assert_eq!(estimate_tokens("main"), 1);
        assert_eq!(estimate_tokens("helper"), 2);
        assert_eq!(estimate_tokens("function"), 2);
        assert_eq!(estimate_tokens("configure"), 3);
        assert_eq!(estimate_tokens("snake_case_name"), 4);
    }

    #[test]
    fn test_punctuation_and_newlines() {
        // fn(1) main(1) ( ) { } = 6, plus newline
        assert_eq!(estimate_tokens("fn main() {}\n"), 7);
        assert_eq!(estimate_tokens("a.b"), 3);
        assert_eq!(estimate_tokens("\n\n"), 2);
    }

    #[test]
    fn test_unicode_words() {
        assert_eq!(estimate_tokens("héllo wörld"), 4);
    }

    #[test]
    fn test_monotonic_in_appended_text() {
        let base = "let total = items.iter().sum();";
        let more = format!("{}\nprintln!(\"{{}}\", total);", base);
        assert!(estimate_tokens(&more) > estimate_tokens(base));
    }
}
