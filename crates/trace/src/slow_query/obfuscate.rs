use std::hash::Hasher;
use std::sync::LazyLock;

use fnv::FnvHasher;
use regex::{Captures, Regex};

static LITERALS_AND_COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)'(?:[^']|'')*(?:'|\z)|"(?:[^"]|"")*(?:"|\z)|/\*.*?(?:\*/|\z)|--[^\n]*"#)
        .expect("failed creating regex")
});
static NUMBERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:0x[0-9a-f]+|-?\d+(?:\.\d+)?(?:e[+-]?\d+)?)\b")
        .expect("failed creating regex")
});
static IN_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\?(?:\s*,\s*\?)*\s*\)").expect("failed creating regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("failed creating regex"));

/// Replaces literals with `?` and strips comments in a single left-to-right
/// scan, so comment markers inside quotes stay part of the literal.
/// Double-quoted text is treated as a literal (MySQL), and an unterminated
/// quote masks the rest of the statement.
pub fn obfuscate(sql: &str) -> String {
    let sql = LITERALS_AND_COMMENTS.replace_all(sql, |caps: &Captures| {
        if caps[0].starts_with(['\'', '"']) {
            "?"
        } else {
            ""
        }
    });
    NUMBERS.replace_all(&sql, "?").trim().to_string()
}

pub fn normalize(sql: &str) -> String {
    let obfuscated = obfuscate(sql).to_lowercase();
    let collapsed = WHITESPACE.replace_all(&obfuscated, " ");
    IN_LIST.replace_all(&collapsed, "(?)").into_owned()
}

pub fn fingerprint(normalized: &str) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(normalized.as_bytes());
    let hash = hasher.finish();
    (hash ^ (hash >> 32)) as u32
}
