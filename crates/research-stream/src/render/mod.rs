//! Report rendering: markdown-ish report text to display markup.
//!
//! Rendering is a fixed sequence of text passes. The order matters: tables are
//! pulled out before anything touches line structure, bold runs before italic,
//! and fenced code before inline code.
//!
//! Report text comes from a remote service and is treated as untrusted. It is
//! HTML-escaped before the first pass, so the only tags in the output are the
//! ones the passes emit, and link targets with unexpected schemes stay text.

pub mod citation;
pub mod table;

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::model::Source;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,3}) (.+)$").expect("heading regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"));
static ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^\s*](?:[^*\n]*[^\s*])?)\*").expect("italic regex"));
static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[\w+-]*\n?(.*?)```").expect("fenced code regex"));
static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("inline code regex"));
static BULLET_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*] (.+)$").expect("bullet regex"));
static NUMBERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\. (.+)$").expect("numbered regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("link regex"));

const LINK_ATTRS: &str = r#"target="_blank" rel="noopener noreferrer""#;

/// Display markup produced by a renderer. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RenderedMarkup(String);

impl RenderedMarkup {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RenderedMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renderer abstraction so callers can swap the report renderer.
pub trait MarkdownToHtml: Send + Sync {
    /// Renders report text. Must not fail: unknown constructs pass through.
    fn render(&self, markdown: &str) -> RenderedMarkup;

    /// Renders the numbered source list that citation markers point at.
    fn render_citations(&self, sources: &[Source]) -> RenderedMarkup {
        render_citation_list(sources)
    }
}

/// Default renderer: the pass pipeline in [`render`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportMarkdownRenderer;

impl MarkdownToHtml for ReportMarkdownRenderer {
    fn render(&self, markdown: &str) -> RenderedMarkup {
        render(markdown)
    }
}

/// Renders report text to display markup.
pub fn render(text: &str) -> RenderedMarkup {
    let text = escape_html(&text.replace("\r\n", "\n"));
    let text = extract_tables(&text);
    let text = HEADING.replace_all(&text, |caps: &Captures| {
        let level = caps[1].len();
        format!("<h{level}>{}</h{level}>", &caps[2])
    });
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = FENCED_CODE.replace_all(&text, |caps: &Captures| {
        // Backticks inside the block must not reach the inline-code pass.
        let body = caps[1].trim_end_matches('\n').replace('`', "&#96;");
        format!("<pre><code>{body}</code></pre>")
    });
    let text = INLINE_CODE.replace_all(&text, "<code>$1</code>");
    let text = wrap_lists(&text);
    let text = LINK.replace_all(&text, |caps: &Captures| {
        let (label, target) = (&caps[1], &caps[2]);
        if is_safe_link_target(target) {
            // Encoded brackets keep `[n]` in a URL away from the citation pass.
            let href = target.replace('[', "%5B").replace(']', "%5D");
            format!(r#"<a href="{href}" {LINK_ATTRS}>{label}</a>"#)
        } else {
            caps[0].to_string()
        }
    });
    let text = citation::substitute(&text);
    let text = text.replace("\n\n", "</p><p>").replace('\n', "<br>");
    RenderedMarkup(format!("<p>{text}</p>"))
}

/// Renders sources as an ordered list whose items match citation marker ids.
pub fn render_citation_list(sources: &[Source]) -> RenderedMarkup {
    if sources.is_empty() {
        return RenderedMarkup::default();
    }
    let mut out = String::from(r#"<ol class="citations">"#);
    for source in sources {
        let id = source.id;
        out.push_str(&format!(
            r#"<li id="citation-{id}" data-citation-id="{id}">"#
        ));
        let title = if source.title.trim().is_empty() {
            escape_html(&source.url)
        } else {
            escape_html(&source.title)
        };
        let url = escape_html(&source.url);
        if !url.is_empty() && is_safe_link_target(&url) {
            out.push_str(&format!(r#"<a href="{url}" {LINK_ATTRS}>{title}</a>"#));
        } else {
            out.push_str(&title);
        }
        if let Some(tool) = source.origin_tool.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(&format!(
                r#" <span class="citation-tool">{}</span>"#,
                escape_html(tool)
            ));
        }
        if !source.snippet.trim().is_empty() {
            out.push_str(&format!(
                r#"<p class="citation-snippet">{}</p>"#,
                escape_html(source.snippet.trim())
            ));
        }
        out.push_str("</li>");
    }
    out.push_str("</ol>");
    RenderedMarkup(out)
}

/// Escapes the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Relative targets and http(s)/mailto links are allowed; any other scheme
/// (`javascript:`, `data:` ...) is not.
fn is_safe_link_target(target: &str) -> bool {
    match target.find(':') {
        None => true,
        Some(colon) => {
            let scheme = &target[..colon];
            if scheme.contains(['/', '?', '#']) {
                return true;
            }
            matches!(
                scheme.to_ascii_lowercase().as_str(),
                "http" | "https" | "mailto"
            )
        }
    }
}

fn extract_tables(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if table::is_table_line(line) {
            block.push(line);
            continue;
        }
        flush_table(&mut block, &mut out);
        out.push(line.to_string());
    }
    flush_table(&mut block, &mut out);
    out.join("\n")
}

fn flush_table(block: &mut Vec<&str>, out: &mut Vec<String>) {
    if block.is_empty() {
        return;
    }
    match table::build(block.as_slice()) {
        Some(html) => out.push(html),
        // Not a real table: keep the lines for the later passes.
        None => out.extend(block.iter().map(|line| line.to_string())),
    }
    block.clear();
}

fn wrap_lists(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut bullets: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if let Some(caps) = BULLET_ITEM.captures(line) {
            bullets.push(format!("<li>{}</li>", &caps[1]));
            continue;
        }
        if !bullets.is_empty() {
            out.push(format!("<ul>{}</ul>", bullets.concat()));
            bullets.clear();
        }
        match NUMBERED_ITEM.captures(line) {
            // Numbered items are not wrapped in an <ol>.
            Some(caps) => out.push(format!("<li>{}</li>", &caps[1])),
            None => out.push(line.to_string()),
        }
    }
    if !bullets.is_empty() {
        out.push(format!("<ul>{}</ul>", bullets.concat()));
    }
    out.join("\n")
}
