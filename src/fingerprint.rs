// Query fingerprinting: strip literal values, keep structural shape.
//
// Heuristic key: two different shapes whose first MAX_FINGERPRINT_LEN chars
// coincide after normalization share a fingerprint.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum fingerprint length in characters.
pub const MAX_FINGERPRINT_LEN: usize = 100;

/// Token substituted for every stripped literal.
pub const PLACEHOLDER: &str = "?";

/// A scalar after a key separator: quoted string, or a bare run up to the next
/// `,` `}` `]`. Nested objects/arrays are left for the later passes.
static VALUE_AFTER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#":\s*(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^\s,\}\]\[\{"'][^,\}\]]*)"#)
        .expect("VALUE_AFTER_KEY pattern")
});

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("DIGITS pattern"));

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#)
        .expect("QUOTED pattern")
});

/// Grouping key for a query value. Deterministic for a given input.
pub fn normalize(query: &serde_json::Value) -> String {
    normalize_str(&canonical(query))
}

/// Normalizes an already-serialized query string.
pub fn normalize_str(raw: &str) -> String {
    let stripped = VALUE_AFTER_KEY.replace_all(raw, format!(":{PLACEHOLDER}"));
    let stripped = DIGITS.replace_all(&stripped, PLACEHOLDER);
    let stripped = strip_quoted_literals(&stripped);
    stripped.trim().chars().take(MAX_FINGERPRINT_LEN).collect()
}

/// Strings are used verbatim; other values go through serde_json.
/// Object keys come out sorted, so equal objects give equal strings.
fn canonical(query: &serde_json::Value) -> String {
    match query {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|e| {
            tracing::debug!(error = %e, operation = "normalize", "query serialization failed; using display form");
            other.to_string()
        }),
    }
}

/// Replaces quoted literals, except object keys (a quoted run followed by `:`).
fn strip_quoted_literals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in QUOTED.find_iter(s) {
        out.push_str(&s[last..m.start()]);
        if s[m.end()..].trim_start().starts_with(':') {
            out.push_str(m.as_str());
        } else {
            out.push_str(PLACEHOLDER);
        }
        last = m.end();
    }
    out.push_str(&s[last..]);
    out
}
