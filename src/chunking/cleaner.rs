//! Configurable text cleaning applied before chunking.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::RagError;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://\S+|www\.\S+").expect("url pattern")
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern"));
// Keeps \t, \n, and \r so newline handling stays a separate rule.
static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]").expect("control char pattern")
});
static EXTRA_SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("spaces pattern"));
static MULTI_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));

/// A single cleaning rule. Rules are applied in the order given to
/// [`TextCleaner::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanRule {
    /// Remove `http(s)://...` and `www....` URLs.
    RemoveUrls,
    /// Remove email addresses.
    RemoveEmails,
    /// Remove `<...>` markup tags.
    RemoveHtmlTags,
    /// Remove non-printing control characters (tabs and newlines are kept).
    RemoveControlChars,
    /// Collapse runs of spaces and tabs into a single space.
    NormalizeSpaces,
    /// Collapse runs of three or more newlines into a paragraph break.
    NormalizeNewlines,
    /// Trim leading and trailing whitespace.
    Trim,
}

impl CleanRule {
    fn apply(self, text: &str) -> String {
        match self {
            CleanRule::RemoveUrls => URL_RE.replace_all(text, "").into_owned(),
            CleanRule::RemoveEmails => EMAIL_RE.replace_all(text, "").into_owned(),
            CleanRule::RemoveHtmlTags => HTML_TAG_RE.replace_all(text, "").into_owned(),
            CleanRule::RemoveControlChars => CONTROL_RE.replace_all(text, "").into_owned(),
            CleanRule::NormalizeSpaces => EXTRA_SPACES_RE.replace_all(text, " ").into_owned(),
            CleanRule::NormalizeNewlines => MULTI_NEWLINE_RE.replace_all(text, "\n\n").into_owned(),
            CleanRule::Trim => text.trim().to_string(),
        }
    }
}

/// Domain-agnostic text cleaner with a configurable rule list.
///
/// # Examples
///
/// ```
/// use ragloom::chunking::{CleanRule, TextCleaner};
///
/// let cleaner = TextCleaner::new(vec![
///     CleanRule::RemoveUrls,
///     CleanRule::NormalizeSpaces,
///     CleanRule::Trim,
/// ]);
/// let cleaned = cleaner.clean("See https://example.com   for  details ");
/// assert_eq!(cleaned.as_deref(), Some("See for details"));
/// ```
#[derive(Clone, Debug)]
pub struct TextCleaner {
    rules: Vec<CleanRule>,
    custom_patterns: Vec<Regex>,
    min_length: usize,
}

impl Default for TextCleaner {
    /// The default rule set removes markup and junk while preserving
    /// paragraph structure for the splitter's separator hierarchy.
    fn default() -> Self {
        Self::new(vec![
            CleanRule::RemoveHtmlTags,
            CleanRule::RemoveControlChars,
            CleanRule::NormalizeSpaces,
            CleanRule::NormalizeNewlines,
            CleanRule::Trim,
        ])
    }
}

impl TextCleaner {
    /// Builds a cleaner applying `rules` in order.
    pub fn new(rules: Vec<CleanRule>) -> Self {
        Self {
            rules,
            custom_patterns: Vec::new(),
            min_length: 0,
        }
    }

    /// Adds a caller-supplied removal pattern, applied after the built-in
    /// rules. Fails with [`RagError::Config`] on an invalid pattern.
    pub fn with_custom_pattern(mut self, pattern: &str) -> Result<Self, RagError> {
        let compiled = Regex::new(pattern)
            .map_err(|err| RagError::Config(format!("invalid cleaning pattern: {err}")))?;
        self.custom_patterns.push(compiled);
        Ok(self)
    }

    /// Documents shorter than `min_length` characters after cleaning are
    /// dropped (`clean` returns `None`).
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Cleans one document. Returns `None` when the cleaned text falls below
    /// the configured minimum length.
    pub fn clean(&self, text: &str) -> Option<String> {
        let mut cleaned = text.to_string();
        for rule in &self.rules {
            cleaned = rule.apply(&cleaned);
        }
        for pattern in &self.custom_patterns {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        let length = cleaned.chars().count();
        if length < self.min_length {
            tracing::debug!(length, min_length = self.min_length, "document dropped after cleaning");
            return None;
        }
        Some(cleaned)
    }

    /// Cleans many documents, preserving input order. Dropped documents keep
    /// their slot as `None` so callers can realign with their own metadata.
    pub fn clean_batch(&self, texts: &[String]) -> Vec<Option<String>> {
        texts.iter().map(|text| self.clean(text)).collect()
    }
}
