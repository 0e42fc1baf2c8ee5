// Disallowed-content detection against a configurable, ordered pattern set.
//
// Patterns are data: adding one is a config change, not a code change.

use super::moderation_models::ModerationError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct ContentClassifier {
    patterns: Vec<Regex>,
}

impl ContentClassifier {
    /// Compile the given patterns in order. Any invalid pattern fails the
    /// whole set so a typo never silently disables a rule.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ModerationError> {
        let mut classifier = Self {
            patterns: Vec::with_capacity(patterns.len()),
        };
        for pattern in patterns {
            classifier.add_pattern(pattern.as_ref())?;
        }
        Ok(classifier)
    }

    /// Append a pattern after the existing ones.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), ModerationError> {
        let regex = Regex::new(pattern).map_err(|e| {
            ModerationError::PolicyMisconfiguration(format!(
                "invalid content pattern '{pattern}': {e}"
            ))
        })?;
        self.patterns.push(regex);
        Ok(())
    }

    /// Whether either text matches any pattern.
    ///
    /// `raw` should already be lowercased; `normalized` is the output of
    /// `normalize`. Both are checked because some patterns rely on the
    /// punctuation that normalization removes.
    #[allow(dead_code)]
    pub fn classify(&self, raw: &str, normalized: &str) -> bool {
        self.first_match(raw, normalized).is_some()
    }

    /// The first pattern (in configured order) that matches either text.
    pub fn first_match(&self, raw: &str, normalized: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(raw) || p.is_match(normalized))
            .map(|p| p.as_str())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_config::DEFAULT_CONTENT_PATTERNS;
    use crate::core::moderation::normalizer::normalize;

    const BANNED: &str = r"b+\W*[a@4]+\W*[d]+\W*w+\W*[o0]+\W*r+\W*d+";

    fn check(classifier: &ContentClassifier, text: &str) -> bool {
        let raw = text.to_lowercase();
        classifier.classify(&raw, &normalize(&raw))
    }

    #[test]
    fn test_clean_text_passes() {
        let classifier = ContentClassifier::from_patterns(&[BANNED]).unwrap();
        assert!(!check(&classifier, "have a nice day"));
    }

    #[test]
    fn test_obfuscated_text_matches() {
        let classifier = ContentClassifier::from_patterns(&[BANNED]).unwrap();
        assert!(check(&classifier, "BADWORD"));
        assert!(check(&classifier, "b@d w0rd"));
        assert!(check(&classifier, "b.4.d.w.0.r.d"));
        assert!(check(&classifier, "bbbaaadddwooord"));
        // Accents and emoji spacing only fall away on the normalized path
        assert!(check(&classifier, "bäd 🙂 wörd"));
        // Cyrillic а and о are folded to Latin before matching
        assert!(check(&classifier, "b\u{430}d w\u{43e}rd"));
    }

    #[test]
    fn test_first_match_reports_configured_order() {
        let classifier = ContentClassifier::from_patterns(&["spam", "sp.m"]).unwrap();
        assert_eq!(classifier.first_match("spam", "spam"), Some("spam"));
        assert_eq!(classifier.first_match("sp4m", "sp4m"), Some("sp.m"));
        assert_eq!(classifier.first_match("ham", "ham"), None);
    }

    #[test]
    fn test_add_pattern_extends_without_rebuild() {
        let mut classifier = ContentClassifier::from_patterns::<&str>(&[]).unwrap();
        assert!(classifier.is_empty());
        assert!(!check(&classifier, "forbidden"));

        classifier.add_pattern("forbidden").unwrap();
        assert_eq!(classifier.len(), 1);
        assert!(check(&classifier, "f o r b i d d e n"));
    }

    #[test]
    fn test_invalid_pattern_is_misconfiguration() {
        let err = ContentClassifier::from_patterns(&["ok", "[broken"]).unwrap_err();
        assert!(matches!(err, ModerationError::PolicyMisconfiguration(_)));
    }

    #[test]
    fn test_default_patterns_compile_and_ignore_clean_text() {
        let classifier = ContentClassifier::from_patterns(DEFAULT_CONTENT_PATTERNS).unwrap();
        assert_eq!(classifier.len(), 2);
        assert!(!check(&classifier, "good game everyone"));
    }
}
