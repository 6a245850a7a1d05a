//! The pluggable inference backend seam.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webpki_roots::TLS_SERVER_ROOTS;

/// Failure surfaced by an [`InferenceProvider`].
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// The provider is misconfigured (bad endpoint, missing credentials).
    #[error("provider not configured: {0}")]
    Configuration(String),
    /// A network/protocol-level failure talking to the backend.
    #[error("provider transport error: {0}")]
    Transport(String),
    /// The backend responded, but the body could not be read as text.
    #[error("provider response error: {0}")]
    Response(String),
}

/// A pluggable AI backend. This is the seam a real model integration
/// plugs into; the crate ships [`HttpInferenceProvider`] as a working
/// default and [`StaticInferenceProvider`] for tests.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Complete `prompt`, returning the raw text response.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    completion: String,
}

/// An [`InferenceProvider`] that posts `{"prompt": "..."}` to a
/// configurable HTTPS endpoint and reads back `{"completion": "..."}`.
pub struct HttpInferenceProvider {
    client: HyperClient,
    endpoint: String,
}

impl HttpInferenceProvider {
    /// Build a provider pointed at `endpoint` (a full URL).
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self { client: build_https_client()?, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::to_vec(&CompletionRequest { prompt })
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let response = self.client.request(request).await.map_err(|e| ProviderError::Transport(e.to_string()))?;

        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| ProviderError::Transport(e.to_string()))?;
            bytes.extend_from_slice(&chunk);
        }

        let parsed: CompletionResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.completion)
    }
}

fn build_https_client() -> Result<HyperClient, ProviderError> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(anchor.subject, anchor.spki, anchor.name_constraints)
    }));

    let config = ClientConfig::builder().with_safe_defaults().with_root_certificates(roots).with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));
    Ok(Client::builder().build::<_, Body>(connector))
}

/// A test double that returns a fixed completion (or a fixed error),
/// regardless of the prompt.
pub struct StaticInferenceProvider {
    response: Result<String, ProviderError>,
}

impl StaticInferenceProvider {
    /// Always succeed with `response`.
    #[must_use]
    pub fn ok(response: impl Into<String>) -> Self {
        Self { response: Ok(response.into()) }
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn err(error: ProviderError) -> Self {
        Self { response: Err(error) }
    }
}

#[async_trait]
impl InferenceProvider for StaticInferenceProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.response.clone()
    }
}
