//! Outbound request model.

use folio_core::Error;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Declared resource type of a request, used to pick an offline fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Top-level navigation.
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Best guess from the URL path, for callers that don't declare one.
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        if path.ends_with('/') {
            return Destination::Document;
        }

        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "html" | "htm" => Destination::Document,
            "png" | "jpg" | "jpeg" | "svg" | "gif" | "webp" | "ico" | "avif" => Destination::Image,
            "js" | "mjs" => Destination::Script,
            "css" => Destination::Style,
            "woff" | "woff2" | "ttf" | "otf" => Destination::Font,
            _ => Destination::Other,
        }
    }
}

/// A request issued by the controlled page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, url: Url, destination: Destination) -> Self {
        Self { method, url, destination }
    }

    /// GET request with the destination inferred from the URL.
    pub fn get(url: Url) -> Self {
        let destination = Destination::infer(&url);
        Self { method: Method::GET, url, destination }
    }

    /// Build a request from a method name, inferring the destination when
    /// none is given.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `method` is not a valid HTTP method.
    pub fn parse(method: &str, url: Url, destination: Option<Destination>) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid HTTP method: {method}")))?;
        let destination = destination.unwrap_or_else(|| Destination::infer(&url));
        Ok(Self { method, url, destination })
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }
}
