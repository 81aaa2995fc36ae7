//! Terminal escape-sequence stripping for tailed log text.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex_lite::Regex;

/// CSI sequences (colors, cursor movement), OSC strings terminated by BEL
/// or ST, and two-byte Fe escapes.
const ANSI_PATTERN: &str = r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])";

static ANSI_REGEX: OnceLock<Regex> = OnceLock::new();

fn ansi_regex() -> &'static Regex {
    ANSI_REGEX.get_or_init(|| Regex::new(ANSI_PATTERN).expect("ANSI pattern is valid"))
}

/// Remove terminal escape sequences, leaving the visible text intact.
///
/// Borrows when there is nothing to strip, so clean lines cost no allocation.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    ansi_regex().replace_all(text, "")
}
