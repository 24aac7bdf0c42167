//! Scripted fetcher for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio_core::Error;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::fetch::{Fetcher, Request, Response, ResponseSource};

#[derive(Debug, Clone)]
enum Scripted {
    Respond { status: u16, body: Bytes, delay: Option<Duration> },
    Fail,
}

/// Answers from a URL → response table. Unknown URLs fail like a dropped
/// connection.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: AtomicUsize,
    calls_by_url: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.script(url, Scripted::Respond { status, body: Bytes::from(body.to_string()), delay: None });
    }

    pub(crate) fn respond_slow(&self, url: &str, status: u16, body: &str, delay: Duration) {
        self.script(url, Scripted::Respond { status, body: Bytes::from(body.to_string()), delay: Some(delay) });
    }

    pub(crate) fn fail(&self, url: &str) {
        self.script(url, Scripted::Fail);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls_by_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn script(&self, url: &str, scripted: Scripted) {
        self.routes.lock().unwrap().insert(url.to_string(), scripted);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.as_str().to_string();
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_url.lock().unwrap().entry(url.clone()).or_default() += 1;

        let scripted = self.routes.lock().unwrap().get(&url).cloned();
        match scripted {
            Some(Scripted::Respond { status, body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                let status = StatusCode::from_u16(status).unwrap();
                Ok(Response::new(request.url.clone(), status, headers, body, ResponseSource::Network))
            }
            Some(Scripted::Fail) | None => Err(Error::Network(format!("connection refused: {url}"))),
        }
    }
}
