use std::time::Duration;

use crate::domain::{Document, DocumentMetadata, SourceFormat};
use crate::error::{AppError, LOADER_FAILED};

use super::PageFetcher;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];
const BLOCK_ELEMENTS: [&str; 24] = [
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "p", "section", "tr",
];

/// Fetches a page over HTTP(S) and reduces its HTML to visible text.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<Document>, AppError> {
        let url = url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::new(LOADER_FAILED, "URL must start with http:// or https://")
                .with_details(format!("url={url}")));
        }

        let resp = ureq::get(url).timeout(self.timeout).call().map_err(|e| {
            let retryable = matches!(e, ureq::Error::Transport(_));
            AppError::new(LOADER_FAILED, "Failed to fetch web page")
                .with_details(format!("url={url}; err={e}"))
                .with_retryable(retryable)
        })?;
        let html = resp.into_string().map_err(|e| {
            AppError::new(LOADER_FAILED, "Failed to read web page body")
                .with_details(format!("url={url}; err={e}"))
        })?;

        Ok(vec![page_document(url, &html)])
    }
}

/// Build the document for one fetched page; the `<title>` goes into metadata.
pub fn page_document(url: &str, html: &str) -> Document {
    let mut metadata = DocumentMetadata::new(url, SourceFormat::Web);
    if let Some(title) = html_title(html) {
        metadata = metadata.with_title(title);
    }
    Document::new(html_to_text(html), metadata)
}

pub fn html_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let body_start = open + lower[open..].find('>')? + 1;
    let body_len = lower[body_start..].find("</title")?;
    let title = collapse_spaces(&decode_entities(&html[body_start..body_start + body_len]));
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Visible text of an HTML page: tags dropped, script-like elements removed,
/// block elements on their own lines, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut raw = String::with_capacity(html.len() / 2);
    let mut i = 0usize;

    while i < html.len() {
        let Some(rel) = lower[i..].find('<') else {
            raw.push_str(&decode_entities(&html[i..]));
            break;
        };
        raw.push_str(&decode_entities(&html[i..i + rel]));
        let tag_start = i + rel;

        if lower[tag_start..].starts_with("<!--") {
            i = match lower[tag_start..].find("-->") {
                Some(end) => tag_start + end + 3,
                None => html.len(),
            };
            continue;
        }

        let Some(gt) = lower[tag_start..].find('>') else {
            break;
        };
        let tag_end = tag_start + gt + 1;
        let name = tag_name(&lower[tag_start + 1..tag_end - 1]);

        if SKIPPED_ELEMENTS.contains(&name) && !lower[tag_start + 1..].starts_with('/') {
            let close = format!("</{name}");
            i = match lower[tag_end..].find(&close) {
                Some(end) => {
                    let close_start = tag_end + end;
                    lower[close_start..]
                        .find('>')
                        .map(|g| close_start + g + 1)
                        .unwrap_or(html.len())
                }
                None => html.len(),
            };
            continue;
        }

        if BLOCK_ELEMENTS.contains(&name) || name == "title" || name == "td" || name == "th" {
            raw.push('\n');
        }
        i = tag_end;
    }

    raw.lines()
        .map(collapse_spaces)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tag_name(inner: &str) -> &str {
    let inner = inner.trim_start_matches('/').trim_start();
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(inner.len());
    &inner[..end]
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the predefined entities, `&nbsp;` and numeric character references.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
