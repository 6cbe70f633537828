//! Clean model output for speech synthesis.

use std::sync::LazyLock;

use regex::Regex;

static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[*()`#~_|]").expect("markup stripping regex must compile")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

/// Strip formatting punctuation and collapse the whitespace it leaves behind.
///
/// `sanitize(sanitize(s)) == sanitize(s)` for every input.
pub fn sanitize(text: &str) -> String {
    let stripped = MARKUP_RE.replace_all(text, "");
    WHITESPACE_RE
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}
