//! CQL translation service client
//!
//! HTTP client for the external `cql-translation-service`. One request
//! carries the whole dependency set as a multipart form, one text field
//! per `.cql` file, and the compiled ELM comes back in the response body
//! in one of the shapes handled by [`decode_response`].

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::TranslatorOptions;
use crate::elm::ElmLibraryMap;
use crate::error::{ProcessorError, Result};
use crate::translator::response::decode_response;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A named CQL source submitted to the translator. The field name is the
/// source filename without its `.cql` extension.
pub type CqlSource = (String, String);

pub struct TranslatorClient {
    http: Client,
    url: String,
    options: TranslatorOptions,
}

impl TranslatorClient {
    pub fn new(url: impl Into<String>, options: TranslatorOptions) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            options,
        })
    }

    /// Submit the source set and decode the compiled result.
    ///
    /// The exchange is awaited to completion before any decoding starts;
    /// a non-success status is surfaced with the response body as
    /// diagnostic text.
    pub async fn translate(&self, sources: Vec<CqlSource>) -> Result<ElmLibraryMap> {
        let mut form = Form::new();
        for (field, text) in sources {
            debug!(field = %field, bytes = text.len(), "adding CQL source to form");
            form = form.text(field, text);
        }

        info!(url = %self.url, "sending translation request");
        let response = self
            .http
            .post(&self.url)
            .query(&self.options.to_query_pairs())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        debug!(status = %status, content_type = %content_type, "translation response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::TranslatorStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        debug!(length = body.len(), "translation response body read");

        decode_response(&body, &content_type)
    }
}

/// Collect the dependency set from a directory of `.cql` files.
///
/// Files are ordered lexicographically by filename so the outbound
/// request is deterministic. A missing directory is not fatal: the
/// translator will report the unresolved references itself.
pub fn collect_cql_sources(cql_dir: &Path) -> Result<Vec<CqlSource>> {
    if !cql_dir.is_dir() {
        warn!(dir = %cql_dir.display(), "CQL directory not found, submitting no dependencies");
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = std::fs::read_dir(cql_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".cql"))
        .collect();
    names.sort();

    let mut sources = Vec::with_capacity(names.len());
    for name in names {
        let text = std::fs::read_to_string(cql_dir.join(&name))?;
        let field = name.trim_end_matches(".cql").to_string();
        debug!(file = %name, field = %field, "collected CQL source");
        sources.push((field, text));
    }

    info!(count = sources.len(), dir = %cql_dir.display(), "collected CQL sources");
    Ok(sources)
}
