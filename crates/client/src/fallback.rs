//! Offline placeholder responses.
//!
//! Generated when neither the network nor the cache can answer. They are
//! marked `no-store` and never written to a partition.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::fetch::{Destination, Request, Response, ResponseSource};

/// Body of the generic offline response.
pub const OFFLINE_TEXT: &str = "Offline - Content not available";

const OFFLINE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="200" viewBox="0 0 300 200">
  <rect width="100%" height="100%" fill="#f3f4f6"/>
  <g fill="#9ca3af" transform="translate(135,85)">
    <path d="M12 2C6.48 2 2 6.48 2 12s4.48 10 10 10 10-4.48 10-10S17.52 2 12 2zm-2 15l-5-5 1.41-1.41L10 14.17l7.59-7.59L19 8l-9 9z"/>
  </g>
  <text x="150" y="130" text-anchor="middle" fill="#6b7280" font-size="12" font-family="sans-serif">Offline</text>
</svg>
"##;

/// Builds offline placeholders by request destination.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    page: Bytes,
}

impl OfflineFallback {
    /// `page_title` is HTML-escaped into the offline page.
    pub fn new(page_title: &str) -> Self {
        Self { page: Bytes::from(render_page(page_title)) }
    }

    /// Placeholder for a request that could not be served.
    pub fn respond(&self, request: &Request) -> Response {
        let (status, content_type, body) = match request.destination {
            Destination::Image => (StatusCode::OK, "image/svg+xml", Bytes::from_static(OFFLINE_SVG.as_bytes())),
            Destination::Document => (StatusCode::OK, "text/html", self.page.clone()),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "text/plain", Bytes::from_static(OFFLINE_TEXT.as_bytes())),
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        Response::new(request.url.clone(), status, headers, body, ResponseSource::Fallback)
    }
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self::new("Offline")
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    body {{ font-family: system-ui; text-align: center; padding: 50px; background: #f8f5f0; }}
    .container {{ max-width: 400px; margin: 0 auto; }}
    h1 {{ color: #2d2d2d; }}
    p {{ color: #8b7d6b; }}
    .retry-btn {{ background: #a0956b; color: white; border: none; padding: 10px 20px; border-radius: 5px; cursor: pointer; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>You're Offline</h1>
    <p>Please check your internet connection and try again.</p>
    <button class="retry-btn" onclick="window.location.reload()">Retry</button>
  </div>
</body>
</html>
"#,
        title = escape_html(title)
    )
}
