use std::sync::OnceLock;

use regex_lite::Regex;

const ELLIPSIS: &str = "...";

/// Entities decoded by [`strip_html`], applied in this order.
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

/// Turns an HTML fragment into plain text.
///
/// Removes anything that looks like a tag, decodes a small fixed set of named entities and trims
/// the result. Malformed markup is never an error: an unterminated `<` is left as is.
pub fn strip_html(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();

    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let mut text = tag.replace_all(html, "").into_owned();

    for (entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }

    text.trim().to_owned()
}

/// Cuts `text` to at most `limit` characters, appending `...` if anything was cut.
pub fn excerpt(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}{ELLIPSIS}", &text[..end]),
        None => text.to_owned(),
    }
}
