//! Template blocks: ordering, drop targets and HTML rendering

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("Block index {index} is out of range for {len} blocks")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Duplicate block id: {0}")]
    DuplicateId(String),

    #[error("Invalid blocks: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Heading,
    Text,
    Image,
    Button,
    Divider,
    Spacer,
    Html,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TemplateBlock {
    #[schema(example = "3f1c2a9e-5d4b-4f7a-9c1e-2b8d6a0e4f11")]
    pub id: String,
    pub kind: BlockKind,
    /// Kind-specific fields, e.g. `{"text": "Hello", "level": 2}` for a heading
    #[serde(default)]
    #[schema(value_type = Object)]
    pub content: Value,
}

impl TemplateBlock {
    pub fn new(kind: BlockKind, content: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content,
        }
    }

    fn text_field(&self, key: &str) -> &str {
        self.content.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// Reads blocks stored as JSON. `null` is an empty template.
pub fn parse_blocks(value: &Value) -> Result<Vec<TemplateBlock>, BlockError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let blocks: Vec<TemplateBlock> =
        serde_json::from_value(value.clone()).map_err(|e| BlockError::Invalid(e.to_string()))?;
    validate_blocks(&blocks)?;
    Ok(blocks)
}

pub fn validate_blocks(blocks: &[TemplateBlock]) -> Result<(), BlockError> {
    let mut seen = HashSet::new();
    for block in blocks {
        if block.id.trim().is_empty() {
            return Err(BlockError::Invalid("block id must not be empty".into()));
        }
        if !seen.insert(block.id.as_str()) {
            return Err(BlockError::DuplicateId(block.id.clone()));
        }
    }
    Ok(())
}

/// Removes the block at `from` and inserts it at `to`
pub fn move_block(
    blocks: &mut Vec<TemplateBlock>,
    from: usize,
    to: usize,
) -> Result<(), BlockError> {
    let len = blocks.len();
    for index in [from, to] {
        if index >= len {
            return Err(BlockError::IndexOutOfRange { index, len });
        }
    }

    let block = blocks.remove(from);
    blocks.insert(to, block);
    Ok(())
}

/// Target index for a block dropped at `pointer_y`, given each block's
/// vertical midpoint in list order
pub fn drop_index(block_midpoints: &[f64], pointer_y: f64) -> usize {
    block_midpoints
        .iter()
        .position(|midpoint| pointer_y < *midpoint)
        .unwrap_or(block_midpoints.len())
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Only http(s) and mailto links survive; anything else becomes `#`
fn safe_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("mailto:") {
        escape_html(url)
    } else {
        "#".to_string()
    }
}

fn render_block(block: &TemplateBlock) -> String {
    match block.kind {
        BlockKind::Heading => {
            let level = block
                .content
                .get("level")
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .clamp(1, 3);
            format!(
                "<h{level} style=\"margin:0 0 16px;font-family:Arial,sans-serif;\">{}</h{level}>",
                escape_html(block.text_field("text"))
            )
        }
        BlockKind::Text => {
            let body = block
                .text_field("text")
                .lines()
                .map(escape_html)
                .collect::<Vec<_>>()
                .join("<br>");
            format!(
                "<p style=\"margin:0 0 16px;font-family:Arial,sans-serif;line-height:1.5;\">{}</p>",
                body
            )
        }
        BlockKind::Image => {
            let src = block.text_field("src");
            if src.is_empty() {
                return String::new();
            }
            let image = format!(
                "<img src=\"{}\" alt=\"{}\" style=\"display:block;max-width:100%;border:0;\">",
                safe_url(src),
                escape_html(block.text_field("alt"))
            );
            match block.text_field("href") {
                "" => image,
                href => format!("<a href=\"{}\">{}</a>", safe_url(href), image),
            }
        }
        BlockKind::Button => format!(
            "<p style=\"margin:0 0 16px;\"><a href=\"{}\" style=\"display:inline-block;padding:12px 24px;background:{};color:#ffffff;text-decoration:none;border-radius:4px;font-family:Arial,sans-serif;\">{}</a></p>",
            safe_url(block.text_field("url")),
            button_color(block.text_field("color")),
            escape_html(block.text_field("text"))
        ),
        BlockKind::Divider => {
            "<hr style=\"border:0;border-top:1px solid #e5e7eb;margin:24px 0;\">".to_string()
        }
        BlockKind::Spacer => {
            let height = block
                .content
                .get("height")
                .and_then(Value::as_u64)
                .unwrap_or(24)
                .min(200);
            format!("<div style=\"height:{}px;line-height:{}px;\">&nbsp;</div>", height, height)
        }
        // Raw markup chosen by the author
        BlockKind::Html => block.text_field("html").to_string(),
    }
}

/// `#rgb` or `#rrggbb`, else the default blue
fn button_color(color: &str) -> &str {
    let valid = color.starts_with('#')
        && matches!(color.len(), 4 | 7)
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        color
    } else {
        "#2563eb"
    }
}

/// Email HTML body for the blocks, in order
pub fn render_html(blocks: &[TemplateBlock]) -> String {
    let body: String = blocks.iter().map(render_block).collect();
    format!(
        "<!DOCTYPE html><html><body style=\"margin:0;padding:0;background:#ffffff;\"><div style=\"max-width:600px;margin:0 auto;padding:24px;\">{}</div></body></html>",
        body
    )
}

/// Plain-text alternative body
pub fn render_text(blocks: &[TemplateBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block.kind {
            BlockKind::Heading | BlockKind::Text => Some(block.text_field("text").to_string()),
            BlockKind::Button => {
                let text = block.text_field("text");
                match block.text_field("url") {
                    "" => Some(text.to_string()),
                    url => Some(format!("{}: {}", text, url)),
                }
            }
            BlockKind::Divider => Some("----".to_string()),
            BlockKind::Image | BlockKind::Spacer | BlockKind::Html => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
