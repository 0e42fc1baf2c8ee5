// Text canonicalization used before pattern matching.

use deunicode::deunicode_char;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize text for matching: lowercase, transliterate to ASCII, and
/// drop everything outside `[a-z0-9]`.
///
/// Compatibility decomposition strips accents and folds fullwidth and styled
/// forms first; any letter still outside ASCII (Cyrillic, Greek, ligatures)
/// is transliterated. Symbols and emoji are dropped rather than spelled out.
/// The output alphabet is `[a-z0-9]`, so the function is idempotent.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.to_lowercase().nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii() {
            push_ascii(&mut out, c);
        } else if c.is_alphanumeric() {
            if let Some(ascii) = deunicode_char(c) {
                ascii.chars().for_each(|a| push_ascii(&mut out, a));
            }
        }
    }

    out
}

fn push_ascii(out: &mut String, c: char) {
    let c = c.to_ascii_lowercase();
    if c.is_ascii_lowercase() || c.is_ascii_digit() {
        out.push(c);
    }
}
