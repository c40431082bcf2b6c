//! Text normalization shared by every matching step.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lowercases, strips diacritics, and collapses every run of characters outside
/// `[a-z0-9]` into a single space.
///
/// `"Teď NE, díky!"` becomes `"ted ne diky"`.
pub fn normalize(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for character in
        text.nfd().filter(|character| !is_combining_mark(*character)).flat_map(char::to_lowercase)
    {
        if character.is_ascii_lowercase() || character.is_ascii_digit() {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }

    sanitized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when a normalized phrase spans more than one word.
pub fn is_multi_word(normalized: &str) -> bool {
    normalized.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::{is_multi_word, normalize};

    #[test]
    fn strips_czech_diacritics_and_punctuation() {
        assert_eq!(normalize("No, máme na to rozpočet problém"), "no mame na to rozpocet problem");
        assert_eq!(normalize("Teď NE, díky!"), "ted ne diky");
        assert_eq!(normalize("Příliš žluťoučký kůň"), "prilis zlutoucky kun");
    }

    #[test]
    fn collapses_whitespace_and_symbol_runs() {
        assert_eq!(normalize("  GDPR\t&&  ISO-27001 ...\n"), "gdpr iso 27001");
        assert_eq!(normalize("50%/měsíc"), "50 mesic");
    }

    #[test]
    fn empty_and_symbol_only_input_yield_empty_string() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!... « » "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("Pošlete mi to e-mailem, prosím.");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn multi_word_detection_uses_normalized_spacing() {
        assert!(is_multi_word(&normalize("teď ne")));
        assert!(!is_multi_word(&normalize("rozpočet")));
        assert!(!is_multi_word(&normalize("  drahé!  ")));
    }
}
