//! Lenient `Content-Disposition` parsing.
//!
//! The header is advisory: its absence or malformation must never block a
//! fetch, so there is no error path here. Segments without an `=` are
//! dropped silently and whatever parses is returned.

use std::collections::HashMap;

/// Parse a `token; key="value"; key2=value2` header into a key/value map.
///
/// Keys are lower-cased and trimmed; values are trimmed and stripped of
/// surrounding double quotes. Malformed input yields a partial or empty map.
pub fn parse(content_disposition: &str) -> HashMap<String, String> {
    content_disposition
        .split(';')
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            Some((
                key.trim().to_lowercase(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

/// Pull a non-empty `filename` parameter out of the header, if present.
pub fn filename(content_disposition: &str) -> Option<String> {
    parse(content_disposition)
        .remove("filename")
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_and_bare_values() {
        let params = parse(r#"attachment; filename="cat.png"; size=42"#);
        assert_eq!(params.get("filename").map(String::as_str), Some("cat.png"));
        assert_eq!(params.get("size").map(String::as_str), Some("42"));
    }

    #[test]
    fn keys_lowercased_and_trimmed() {
        let params = parse(r#"attachment;  FileName = "A.PNG" "#);
        assert_eq!(params.get("filename").map(String::as_str), Some("A.PNG"));
    }

    #[test]
    fn segments_without_equals_dropped() {
        let params = parse("attachment; filename=a.png");
        // "attachment" has no '=', so only filename survives
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn malformed_input_yields_empty_map() {
        assert!(parse("").is_empty());
        assert!(parse(";;;").is_empty());
        assert!(parse("inline").is_empty());
    }

    #[test]
    fn value_may_contain_equals() {
        let params = parse("x; token=a=b");
        assert_eq!(params.get("token").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn filename_helper_rejects_empty() {
        assert_eq!(filename(r#"attachment; filename="""#), None);
        assert_eq!(
            filename(r#"attachment; filename="doc.zip""#).as_deref(),
            Some("doc.zip")
        );
        assert_eq!(filename("inline"), None);
    }
}
