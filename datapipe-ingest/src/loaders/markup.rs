//! JSON, XML and HTML documents, selected by field or tag name.
//!
//! All three walks use an explicit worklist and stop with
//! [`IngestError::LimitExceeded`] past [`MAX_DEPTH`] levels of nesting or
//! [`MAX_NODES`] visited nodes, so hostile input cannot exhaust the stack.
//!
//! - JSON: string values stored under a key listed in `text_fields`, found at
//!   any depth
//! - XML: the direct text of every element whose tag is listed in `text_tags`
//!   (text before the first child, like ElementTree's `.text`)
//! - HTML: the full text of every element whose tag is listed, matched
//!   case-insensitively
//!
//! Matches are trimmed, blank ones are dropped, and a document without any
//! match is a [`IngestError::SchemaMismatch`].

use super::{LoadHints, Loader, extension_of};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

pub const MAX_DEPTH: usize = 256;
pub const MAX_NODES: usize = 1_000_000;

pub struct MarkupLoader;

impl MarkupLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkupLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Loader for MarkupLoader {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn extensions(&self) -> &[&'static str] {
        &["json", "xml", "html"]
    }

    async fn extract(&self, path: &Path, hints: &LoadHints) -> Result<Vec<String>> {
        let ext = extension_of(path);
        let (names, label) = match ext.as_str() {
            "json" => (hints.text_fields.clone(), "fields"),
            _ => (hints.text_tags.clone(), "tags"),
        };
        if names.is_empty() {
            return Err(IngestError::SchemaMismatch(format!(
                "Text {label} are required for .{ext} files"
            )));
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let found = tokio::task::spawn_blocking(move || match ext.as_str() {
            "json" => extract_json(&raw, &names),
            "xml" => extract_xml(&raw, &names),
            _ => extract_html(&raw, &names),
        })
        .await??;

        if found.fragments.is_empty() {
            return Err(IngestError::SchemaMismatch(format!(
                "No text found in {label}: {}",
                python_list(&found.names)
            )));
        }
        tracing::debug!(
            "Matched {} fragments in {}",
            found.fragments.len(),
            path.display()
        );
        Ok(found.fragments)
    }
}

struct Matches {
    names: Vec<String>,
    fragments: Vec<String>,
}

impl Matches {
    fn new(names: Vec<String>) -> Self {
        Self {
            names,
            fragments: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.fragments.push(text.to_string());
        }
    }
}

/// Counts visited nodes and rejects excessive depth.
struct Budget {
    visited: usize,
}

impl Budget {
    fn new() -> Self {
        Self { visited: 0 }
    }

    fn visit(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(IngestError::LimitExceeded(format!(
                "Document nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        self.visited += 1;
        if self.visited > MAX_NODES {
            return Err(IngestError::LimitExceeded(format!(
                "Document has more than {MAX_NODES} nodes"
            )));
        }
        Ok(())
    }
}

fn python_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Deepest container nesting in `raw`, counting only brackets outside strings.
fn json_nesting(raw: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in raw.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn extract_json(raw: &str, fields: &[String]) -> Result<Matches> {
    // serde_json stops at 128 levels on its own; lift that and enforce our bound
    // before parsing so the recursive parser never goes deeper than MAX_DEPTH.
    if json_nesting(raw) > MAX_DEPTH {
        return Err(IngestError::LimitExceeded(format!(
            "Document nesting exceeds {MAX_DEPTH} levels"
        )));
    }
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    deserializer.disable_recursion_limit();
    let root = Value::deserialize(&mut deserializer).map_err(|e| IngestError::parse("JSON", e))?;
    deserializer
        .end()
        .map_err(|e| IngestError::parse("JSON", e))?;
    let mut matches = Matches::new(fields.to_vec());
    let mut budget = Budget::new();

    let mut worklist: Vec<(&Value, usize)> = vec![(&root, 0)];
    while let Some((value, depth)) = worklist.pop() {
        budget.visit(depth)?;
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if let Value::String(text) = child {
                        if fields.iter().any(|f| f == key) {
                            matches.push(text);
                        }
                    }
                }
                // Reversed so that pops follow the map's key order.
                worklist.extend(map.values().rev().map(|child| (child, depth + 1)));
            }
            Value::Array(items) => {
                worklist.extend(items.iter().rev().map(|child| (child, depth + 1)));
            }
            _ => {}
        }
    }
    Ok(matches)
}

#[derive(Debug)]
struct XmlElement {
    name: String,
    /// Text that appears before the first child element
    text: String,
    children: Vec<usize>,
}

/// Parse XML into an arena of elements. Returns the arena and its root indices.
fn parse_xml_tree(raw: &str) -> Result<(Vec<XmlElement>, Vec<usize>)> {
    let mut reader = Reader::from_str(raw);
    let mut arena: Vec<XmlElement> = Vec::new();
    let mut roots = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    let mut attach = |arena: &mut Vec<XmlElement>, open: &[usize], name: String| -> Result<usize> {
        if arena.len() >= MAX_NODES {
            return Err(IngestError::LimitExceeded(format!(
                "Document has more than {MAX_NODES} nodes"
            )));
        }
        if open.len() >= MAX_DEPTH {
            return Err(IngestError::LimitExceeded(format!(
                "Document nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        let index = arena.len();
        arena.push(XmlElement {
            name,
            text: String::new(),
            children: Vec::new(),
        });
        match open.last() {
            Some(&parent) => arena[parent].children.push(index),
            None => roots.push(index),
        }
        Ok(index)
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let index = attach(&mut arena, &open, name)?;
                open.push(index);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                attach(&mut arena, &open, name)?;
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Text(t)) => {
                if let Some(&current) = open.last() {
                    if arena[current].children.is_empty() {
                        let text = t.unescape().map_err(|e| IngestError::parse("XML", e))?;
                        arena[current].text.push_str(&text);
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(&current) = open.last() {
                    if arena[current].children.is_empty() {
                        arena[current].text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(IngestError::parse("XML", e)),
        }
    }

    if !open.is_empty() {
        return Err(IngestError::parse("XML", "unexpected end of document"));
    }
    if roots.is_empty() {
        return Err(IngestError::parse("XML", "no root element"));
    }
    Ok((arena, roots))
}

fn extract_xml(raw: &str, tags: &[String]) -> Result<Matches> {
    let (arena, roots) = parse_xml_tree(raw)?;
    let mut matches = Matches::new(tags.to_vec());

    let mut worklist: Vec<usize> = roots.into_iter().rev().collect();
    while let Some(index) = worklist.pop() {
        let element = &arena[index];
        if tags.iter().any(|t| *t == element.name) {
            matches.push(&element.text);
        }
        worklist.extend(element.children.iter().rev());
    }
    Ok(matches)
}

fn extract_html(raw: &str, tags: &[String]) -> Result<Matches> {
    let document = Html::parse_document(raw);
    let wanted: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let mut matches = Matches::new(tags.to_vec());
    let mut budget = Budget::new();

    let root = document.root_element();
    for element in root.descendants().filter_map(ElementRef::wrap) {
        let depth = element.ancestors().count();
        budget.visit(depth)?;

        let name = element.value().name().to_lowercase();
        if wanted.contains(&name) {
            let text: String = element.text().collect();
            matches.push(&text);
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fields(names: &[&str]) -> LoadHints {
        LoadHints {
            text_fields: names.iter().map(|s| s.to_string()).collect(),
            ..LoadHints::default()
        }
    }

    fn tags(names: &[&str]) -> LoadHints {
        LoadHints {
            text_tags: names.iter().map(|s| s.to_string()).collect(),
            ..LoadHints::default()
        }
    }

    async fn extract(name: &str, contents: &str, hints: &LoadHints) -> Result<Vec<String>> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        MarkupLoader::new().extract(&path, hints).await
    }

    #[tokio::test]
    async fn test_json_top_level_field() {
        let fragments = extract(
            "doc.json",
            r#"{"title": "x", "body": "hello"}"#,
            &fields(&["body"]),
        )
        .await
        .unwrap();
        assert_eq!(fragments, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_json_nested_and_arrays() {
        let raw = r#"{
            "posts": [
                {"body": " first ", "meta": {"body": 42}},
                {"body": "   "},
                {"replies": [{"body": "second"}]}
            ]
        }"#;
        let fragments = extract("doc.json", raw, &fields(&["body"])).await.unwrap();
        assert_eq!(fragments, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_json_no_match_message() {
        let err = extract(
            "doc.json",
            r#"{"title": "x", "body": "hello"}"#,
            &fields(&["missing"]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert_eq!(err.to_string(), "No text found in fields: ['missing']");

        let err = extract("doc.json", "[]", &fields(&["a", "b"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No text found in fields: ['a', 'b']");
    }

    #[tokio::test]
    async fn test_json_requires_fields() {
        let err = extract("doc.json", "{}", &LoadHints::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let err = extract("doc.json", "{not json", &fields(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { format: "JSON", .. }));
    }

    fn nested_json(depth: usize) -> String {
        format!(
            "{}{{\"body\": \"deep\"}}{}",
            "[".repeat(depth),
            "]".repeat(depth)
        )
    }

    #[tokio::test]
    async fn test_json_nesting_below_limit() {
        let fragments = extract("deep.json", &nested_json(150), &fields(&["body"]))
            .await
            .unwrap();
        assert_eq!(fragments, vec!["deep".to_string()]);

        // The innermost object sits at exactly MAX_DEPTH containers.
        let fragments = extract(
            "deep.json",
            &nested_json(MAX_DEPTH - 1),
            &fields(&["body"]),
        )
        .await
        .unwrap();
        assert_eq!(fragments, vec!["deep".to_string()]);
    }

    #[tokio::test]
    async fn test_json_depth_limit() {
        let err = extract(
            "deep.json",
            &nested_json(MAX_DEPTH + 10),
            &fields(&["body"]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_json_nesting_ignores_brackets_in_strings() {
        assert_eq!(json_nesting(r#"{"a": "[[[{{", "b": ["x\"]"]}"#), 2);
        assert_eq!(json_nesting("42"), 0);
    }

    #[tokio::test]
    async fn test_xml_direct_text_in_document_order() {
        let raw = r#"<?xml version="1.0"?>
            <feed>
                <item><title>One &amp; only</title><body>ignored</body></item>
                <item><title><![CDATA[Two]]></title></item>
                <title>outer<sub>inner</sub>tail</title>
                <title/>
            </feed>"#;
        let fragments = extract("feed.xml", raw, &tags(&["title"])).await.unwrap();
        assert_eq!(
            fragments,
            vec![
                "One & only".to_string(),
                "Two".to_string(),
                "outer".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_xml_no_match_message() {
        let err = extract("feed.xml", "<a><b>x</b></a>", &tags(&["c"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No text found in tags: ['c']");
    }

    #[tokio::test]
    async fn test_xml_depth_limit() {
        let depth = MAX_DEPTH + 10;
        let raw = format!("{}x{}", "<n>".repeat(depth), "</n>".repeat(depth));
        let err = extract("deep.xml", &raw, &tags(&["n"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[tokio::test]
    async fn test_malformed_xml() {
        let err = extract("bad.xml", "<a><b>x</a>", &tags(&["b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { format: "XML", .. }));
    }

    #[tokio::test]
    async fn test_html_case_insensitive_tags() {
        let raw = "<html><body><H2>Heading</H2><p>Para <b>bold</b></p><p> </p></body></html>";
        let fragments = extract("page.html", raw, &tags(&["h2", "P"])).await.unwrap();
        assert_eq!(
            fragments,
            vec!["Heading".to_string(), "Para bold".to_string()]
        );
    }

    #[tokio::test]
    async fn test_html_requires_tags() {
        let err = extract("page.html", "<p>x</p>", &fields(&["p"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }
}
