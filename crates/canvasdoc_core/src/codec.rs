//! Conversion between backing-document payloads and snapshots.
//!
//! Two on-disk formats are supported, chosen from the document extension:
//!
//! - **Markdown** (`.md`): YAML frontmatter, free markdown text, and one
//!   fenced data block tagged [`DATA_BLOCK_TAG`]. Encoding only rewrites the
//!   data block so hand-written text around it survives every save.
//! - **Tldr** (`.tldr`): the whole payload is the JSON document.
//!
//! Both formats emit JSON with sorted keys, so decoding an encoded payload
//! and encoding it again yields the same text.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DocumentMeta, Snapshot};
use crate::error::{CanvasDocError, Result};
use crate::frontmatter;

/// Info string of the fenced block holding document data in markdown files.
pub const DATA_BLOCK_TAG: &str = "json canvasdoc-data";

/// Frontmatter key marking a markdown file as a canvas document.
pub const FILE_FLAG_KEY: &str = "canvasdoc-file";

/// Frontmatter key that disables the legacy stale-store check for a document.
pub const SKIP_LEGACY_CHECK_KEY: &str = "canvasdoc-skip-legacy-check";

/// On-disk format of a backing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Markdown with an embedded data block.
    Markdown,
    /// Plain JSON document.
    Tldr,
}

impl Format {
    /// Pick the format from the document extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") => Ok(Format::Markdown),
            Some(ext) if ext.eq_ignore_ascii_case("tldr") => Ok(Format::Tldr),
            _ => Err(CanvasDocError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Result of decoding a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDocument {
    /// Document metadata (generated when the payload carried none).
    pub meta: DocumentMeta,
    /// Document records.
    pub snapshot: Snapshot,
    /// Whether the payload opted out of the legacy stale-store check.
    pub skip_legacy_check: bool,
}

/// Bidirectional conversion between payload text and snapshots.
pub trait SnapshotCodec: Send + Sync {
    /// Decode a payload.
    fn decode(&self, payload: &str) -> Result<DecodedDocument>;

    /// Encode a snapshot. `previous` is the payload currently on disk, so
    /// formats that embed data in other content can preserve that content.
    fn encode(&self, previous: &str, meta: &DocumentMeta, snapshot: &Snapshot) -> Result<String>;
}

/// Create the codec for a format.
pub fn codec_for(format: Format, app_version: &str) -> Arc<dyn SnapshotCodec> {
    match format {
        Format::Markdown => Arc::new(MarkdownCodec::new(app_version)),
        Format::Tldr => Arc::new(TldrCodec::new(app_version)),
    }
}

/// Serialized shape shared by both formats.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentData {
    meta: DocumentMeta,
    #[serde(default)]
    records: BTreeMap<String, Value>,
}

fn data_to_json(meta: &DocumentMeta, snapshot: &Snapshot) -> Result<String> {
    let data = DocumentData {
        meta: meta.clone(),
        records: snapshot.records.clone(),
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

fn data_from_json(json: &str) -> Result<(DocumentMeta, Snapshot)> {
    let data: DocumentData = serde_json::from_str(json)
        .map_err(|e| CanvasDocError::Decode(format!("invalid document data: {}", e)))?;
    Ok((
        data.meta,
        Snapshot {
            records: data.records,
        },
    ))
}

/// Codec for `.tldr` files.
#[derive(Debug, Clone)]
pub struct TldrCodec {
    app_version: String,
}

impl TldrCodec {
    /// Create a codec stamping new documents with `app_version`.
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl SnapshotCodec for TldrCodec {
    fn decode(&self, payload: &str) -> Result<DecodedDocument> {
        if payload.trim().is_empty() {
            return Ok(DecodedDocument {
                meta: DocumentMeta::generate(&self.app_version),
                snapshot: Snapshot::default(),
                skip_legacy_check: false,
            });
        }
        let (meta, snapshot) = data_from_json(payload)?;
        Ok(DecodedDocument {
            meta,
            snapshot,
            skip_legacy_check: false,
        })
    }

    fn encode(&self, _previous: &str, meta: &DocumentMeta, snapshot: &Snapshot) -> Result<String> {
        data_to_json(meta, snapshot)
    }
}

/// Codec for markdown files with an embedded data block.
#[derive(Debug, Clone)]
pub struct MarkdownCodec {
    app_version: String,
}

/// Byte range of a data block inside a markdown body.
struct BlockSpan {
    /// Start of the opening fence line.
    start: usize,
    /// Start of the JSON content.
    content_start: usize,
    /// End of the JSON content (start of the closing fence line).
    content_end: usize,
    /// End of the closing fence.
    end: usize,
}

impl MarkdownCodec {
    /// Create a codec stamping new documents with `app_version`.
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }

    /// Locate the data block. A body without an opening fence has no block;
    /// an opening fence that is never closed is corrupt.
    fn find_block(body: &str) -> Result<Option<BlockSpan>> {
        let opening = format!("```{}", DATA_BLOCK_TAG);
        let Some(start) = body.find(&opening) else {
            return Ok(None);
        };
        let after_fence = start + opening.len();
        let content_start = body[after_fence..]
            .find('\n')
            .map(|idx| after_fence + idx + 1)
            .ok_or_else(|| CanvasDocError::Decode("data block has no content".into()))?;
        let close_rel = body[content_start..]
            .match_indices("```")
            .find(|(idx, _)| *idx == 0 || body[content_start..].as_bytes()[idx - 1] == b'\n')
            .map(|(idx, _)| idx)
            .ok_or_else(|| CanvasDocError::Decode("data block is not closed".into()))?;
        let content_end = content_start + close_rel;
        Ok(Some(BlockSpan {
            start,
            content_start,
            content_end,
            end: content_end + 3,
        }))
    }

    fn render_block(json: &str) -> String {
        format!("```{}\n{}\n```", DATA_BLOCK_TAG, json)
    }
}

impl SnapshotCodec for MarkdownCodec {
    fn decode(&self, payload: &str) -> Result<DecodedDocument> {
        let parsed = frontmatter::parse_or_empty(payload)?;
        let skip_legacy_check = frontmatter::get_flag(&parsed.frontmatter, SKIP_LEGACY_CHECK_KEY);

        let (meta, snapshot) = match Self::find_block(&parsed.body)? {
            Some(span) => data_from_json(&parsed.body[span.content_start..span.content_end])?,
            None => (DocumentMeta::generate(&self.app_version), Snapshot::default()),
        };

        Ok(DecodedDocument {
            meta,
            snapshot,
            skip_legacy_check,
        })
    }

    fn encode(&self, previous: &str, meta: &DocumentMeta, snapshot: &Snapshot) -> Result<String> {
        let mut parsed = frontmatter::parse_or_empty(previous)?;
        frontmatter::set_property(
            &mut parsed.frontmatter,
            FILE_FLAG_KEY,
            serde_yaml::Value::Bool(true),
        );

        let block = Self::render_block(&data_to_json(meta, snapshot)?);
        let body = match Self::find_block(&parsed.body)? {
            Some(span) => format!(
                "{}{}{}",
                &parsed.body[..span.start],
                block,
                &parsed.body[span.end..]
            ),
            None => {
                let mut body = parsed.body;
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body.push('\n');
                body.push_str(&block);
                body.push('\n');
                body
            }
        };

        frontmatter::serialize(&parsed.frontmatter, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            uuid: "0b0b".into(),
            app_version: "1.2.0".into(),
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::from_records([
            ("shape:b", json!({ "type": "geo", "x": 2 })),
            ("shape:a", json!({ "type": "text", "text": "hi" })),
        ])
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            Format::from_path(Path::new("a/b.md")).unwrap(),
            Format::Markdown
        );
        assert_eq!(
            Format::from_path(Path::new("a/b.TLDR")).unwrap(),
            Format::Tldr
        );
        let err = Format::from_path(Path::new("a/b.png")).unwrap_err();
        assert!(matches!(err, CanvasDocError::UnsupportedFormat(p) if p == PathBuf::from("a/b.png")));
        assert!(Format::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_tldr_empty_payload_is_new_document() {
        let codec = TldrCodec::new("1.2.0");
        let decoded = codec.decode("").unwrap();
        assert!(decoded.snapshot.is_empty());
        assert_eq!(decoded.meta.app_version, "1.2.0");
        assert!(!decoded.meta.uuid.is_empty());
    }

    #[test]
    fn test_tldr_encode_then_decode() {
        let codec = TldrCodec::new("1.2.0");
        let payload = codec.encode("", &meta(), &snapshot()).unwrap();
        let decoded = codec.decode(&payload).unwrap();
        assert_eq!(decoded.meta, meta());
        assert_eq!(decoded.snapshot, snapshot());
    }

    #[test]
    fn test_tldr_rejects_garbage() {
        let codec = TldrCodec::new("1.2.0");
        assert!(matches!(
            codec.decode("{not json"),
            Err(CanvasDocError::Decode(_))
        ));
    }

    #[test]
    fn test_markdown_preserves_surrounding_text() {
        let codec = MarkdownCodec::new("1.2.0");
        let previous = "---\ntags: [drawing]\n---\n# Notes\n\nSome text.\n";
        let first = codec.encode(previous, &meta(), &snapshot()).unwrap();
        assert!(first.contains("# Notes\n\nSome text.\n"));
        assert!(first.contains("tags:"));
        assert!(first.contains("canvasdoc-file: true"));

        let mut changed = snapshot();
        changed.records.insert("shape:c".into(), json!({ "type": "arrow" }));
        let second = codec.encode(&first, &meta(), &changed).unwrap();
        assert!(second.contains("# Notes\n\nSome text.\n"));
        assert_eq!(second.matches("```json canvasdoc-data").count(), 1);
        assert_eq!(codec.decode(&second).unwrap().snapshot, changed);
    }

    #[test]
    fn test_markdown_without_block_is_new_document() {
        let codec = MarkdownCodec::new("1.2.0");
        let decoded = codec.decode("# Just notes\n").unwrap();
        assert!(decoded.snapshot.is_empty());
        assert!(!decoded.skip_legacy_check);
    }

    #[test]
    fn test_markdown_unclosed_block_is_rejected() {
        let codec = MarkdownCodec::new("1.2.0");
        let unclosed = "# Plan\n\n```json canvasdoc-data\n{\"meta\":{\"uuid\":\"keep-me\",\"app_version\":\"1.0.0\"},\"records\":{\"shape:1\":{}}}\n";
        assert!(matches!(
            codec.decode(unclosed),
            Err(CanvasDocError::Decode(_))
        ));
        assert!(matches!(
            codec.encode(unclosed, &meta(), &snapshot()),
            Err(CanvasDocError::Decode(_))
        ));

        let no_content = "# Plan\n\n```json canvasdoc-data";
        assert!(matches!(
            codec.decode(no_content),
            Err(CanvasDocError::Decode(_))
        ));
    }

    #[test]
    fn test_markdown_skip_legacy_flag() {
        let codec = MarkdownCodec::new("1.2.0");
        let decoded = codec
            .decode("---\ncanvasdoc-skip-legacy-check: true\n---\n")
            .unwrap();
        assert!(decoded.skip_legacy_check);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for (codec, raw) in [
            (
                codec_for(Format::Markdown, "1.2.0"),
                "Intro text without trailing newline",
            ),
            (codec_for(Format::Tldr, "1.2.0"), ""),
        ] {
            let first = codec.decode(raw).unwrap();
            let encoded = codec.encode(raw, &first.meta, &first.snapshot).unwrap();
            let second = codec.decode(&encoded).unwrap();
            let re_encoded = codec.encode(&encoded, &second.meta, &second.snapshot).unwrap();
            let third = codec.decode(&re_encoded).unwrap();

            assert_eq!(second, third);
            assert_eq!(encoded, re_encoded);
        }
    }
}
