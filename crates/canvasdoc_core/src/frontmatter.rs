//! YAML frontmatter helpers for markdown-backed documents.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::error::Result;

/// Result of splitting a markdown payload into frontmatter and body.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// The parsed frontmatter as an ordered map.
    pub frontmatter: IndexMap<String, Value>,
    /// The body content after the frontmatter.
    pub body: String,
}

/// Parse frontmatter and body, returning empty frontmatter if none exists.
///
/// A payload without a closing delimiter is treated as having no frontmatter.
pub fn parse_or_empty(content: &str) -> Result<ParsedFile> {
    if !content.starts_with("---\n") && !content.starts_with("---\r\n") {
        return Ok(ParsedFile {
            frontmatter: IndexMap::new(),
            body: content.to_string(),
        });
    }

    let open_len = if content.starts_with("---\r\n") { 5 } else { 4 };
    let rest = &content[open_len..];

    let closing = rest
        .find("\n---\n")
        .map(|idx| (idx, 5))
        .or_else(|| rest.find("\n---\r\n").map(|idx| (idx, 6)));

    match closing {
        Some((idx, delimiter_len)) => {
            let frontmatter_str = &rest[..idx];
            let body = &rest[idx + delimiter_len..];

            // An empty block deserializes to `null`, not a map.
            let frontmatter: IndexMap<String, Value> = if frontmatter_str.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_yaml::from_str(frontmatter_str)?
            };

            Ok(ParsedFile {
                frontmatter,
                body: body.to_string(),
            })
        }
        None => Ok(ParsedFile {
            frontmatter: IndexMap::new(),
            body: content.to_string(),
        }),
    }
}

/// Serialize frontmatter and body back to markdown content.
///
/// Empty frontmatter produces the body alone.
pub fn serialize(frontmatter: &IndexMap<String, Value>, body: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml_str = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{}---\n{}", yaml_str, body))
}

/// Get a boolean property, treating anything but `true` as false.
pub fn get_flag(frontmatter: &IndexMap<String, Value>, key: &str) -> bool {
    matches!(frontmatter.get(key), Some(Value::Bool(true)))
}

/// Set a property in frontmatter (in place).
pub fn set_property(frontmatter: &mut IndexMap<String, Value>, key: &str, value: Value) {
    frontmatter.insert(key.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frontmatter() {
        let content = "---\ntitle: Test\n---\n\nBody content";
        let parsed = parse_or_empty(content).unwrap();
        assert_eq!(
            parsed.frontmatter.get("title").unwrap().as_str().unwrap(),
            "Test"
        );
        assert_eq!(parsed.body.trim(), "Body content");
    }

    #[test]
    fn test_parse_or_empty_no_frontmatter() {
        let content = "Just body content";
        let parsed = parse_or_empty(content).unwrap();
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_parse_unclosed_frontmatter_is_body() {
        let content = "---\ntitle: Test\nno closing";
        let parsed = parse_or_empty(content).unwrap();
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_parse_crlf_frontmatter() {
        let content = "---\r\nflag: true\r\n---\r\nbody";
        let parsed = parse_or_empty(content).unwrap();
        assert!(get_flag(&parsed.frontmatter, "flag"));
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut fm = IndexMap::new();
        set_property(&mut fm, "title", Value::String("Test".to_string()));
        let result = serialize(&fm, "\nBody").unwrap();
        assert!(result.starts_with("---\ntitle: Test\n---\n"));

        let parsed = parse_or_empty(&result).unwrap();
        assert_eq!(parsed.frontmatter, fm);
        assert_eq!(parsed.body, "\nBody");
    }

    #[test]
    fn test_get_flag() {
        let mut fm = IndexMap::new();
        set_property(&mut fm, "yes", Value::Bool(true));
        set_property(&mut fm, "text", Value::String("true".into()));
        assert!(get_flag(&fm, "yes"));
        assert!(!get_flag(&fm, "text"));
        assert!(!get_flag(&fm, "missing"));
    }
}
