use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

const ELLIPSIS: &str = "...";

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<.*?>").expect("valid html tag pattern"));

/// Plain-text rendering of a note body: tags removed, optionally cut to
/// `limit` characters with a trailing ellipsis.
pub fn strip_html(body: &str, limit: Option<usize>) -> String {
    let text = TAG_PATTERN.replace_all(body, "");
    match limit {
        Some(limit) if limit > 0 => cut(&text, limit, text.graphemes(true).count() >= limit),
        _ => text.into_owned(),
    }
}

pub fn truncate_title(title: &str, max: usize) -> String {
    cut(title, max, title.graphemes(true).count() > max)
}

fn cut(text: &str, limit: usize, truncate: bool) -> String {
    if !truncate {
        return text.to_string();
    }
    let mut out: String = text.graphemes(true).take(limit).collect();
    out.push_str(ELLIPSIS);
    out
}
