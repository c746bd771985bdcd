//! HTTP client for the metadata and slice endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::{form_urlencoded, Url};

use crate::codec::ElementType;
use crate::error::TransferError;
use crate::server::{ErrorResponse, MetadataResponse, UrlSigner, SHAPE_HEADER, TYPE_HEADER};
use crate::slice::SliceRequest;

use super::decoded::DecodedSlice;
use super::navigation::SliceFetcher;
use super::transfer::{Progress, SliceTransfer};

/// Endpoint paths relative to the base URL.
pub const METADATA_ENDPOINT: &str = "fitsview/metadata";
pub const SLICE_ENDPOINT: &str = "fitsview/slice";

/// Default lifetime of URLs signed by the client.
pub const DEFAULT_SIGNATURE_TTL: Duration = Duration::from_secs(300);

/// Client for a slice server.
#[derive(Debug, Clone)]
pub struct SliceClient {
    http: reqwest::Client,
    base_url: Url,
    signer: Option<UrlSigner>,
    signature_ttl: Duration,
}

impl SliceClient {
    /// Create a client for the server at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Result<Self, TransferError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| TransferError::Protocol(format!("invalid base URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            signer: None,
            signature_ttl: DEFAULT_SIGNATURE_TTL,
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Sign every request with `secret`.
    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.signer = Some(UrlSigner::new(secret));
        self
    }

    pub fn with_signature_ttl(mut self, ttl: Duration) -> Self {
        self.signature_ttl = ttl;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, TransferError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| TransferError::Protocol(e.to_string()))?;

        let query = match &self.signer {
            Some(signer) => signer.signed_query(url.path(), params, self.signature_ttl),
            None => form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, TransferError> {
        debug!(url = %url, "GET");
        let response = self.http.get(url).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => TransferError::Server {
                status,
                kind: error.error,
                message: error.message,
            },
            Err(_) => TransferError::Server {
                status,
                kind: "http_error".to_string(),
                message: body,
            },
        })
    }

    /// Describe all units of `path`, or only unit `hdu`.
    pub async fn metadata(
        &self,
        path: &str,
        hdu: Option<usize>,
    ) -> Result<MetadataResponse, TransferError> {
        let hdu = hdu.map(|h| h.to_string());
        let mut params = vec![("path", path)];
        if let Some(hdu) = hdu.as_deref() {
            params.push(("hdu", hdu));
        }

        let response = self.send(self.endpoint_url(METADATA_ENDPOINT, &params)?).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| TransferError::Protocol(format!("invalid metadata body: {}", e)))
    }

    /// Issue a slice request and return the transfer once headers arrive.
    pub async fn open_slice(
        &self,
        request: &SliceRequest,
        cancel: CancellationToken,
    ) -> Result<SliceTransfer, TransferError> {
        let hdu = request.unit.to_string();
        let params = [
            ("path", request.path.as_str()),
            ("hdu", hdu.as_str()),
            ("slices", request.slices.as_str()),
        ];
        let url = self.endpoint_url(SLICE_ENDPOINT, &params)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Aborted),
            response = self.send(url) => response?,
        };

        let (shape, element_type) = slice_headers(response.headers())?;
        let declared_len = response.content_length();
        SliceTransfer::new(shape, element_type, declared_len, response, cancel)
    }

    /// Download a slice completely.
    pub async fn fetch_slice(
        &self,
        request: &SliceRequest,
        cancel: CancellationToken,
    ) -> Result<DecodedSlice, TransferError> {
        self.open_slice(request, cancel).await?.finish().await
    }
}

#[async_trait]
impl SliceFetcher for SliceClient {
    async fn fetch(
        &self,
        request: SliceRequest,
        cancel: CancellationToken,
        on_progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<DecodedSlice, TransferError> {
        self.open_slice(&request, cancel)
            .await?
            .finish_with_progress(on_progress)
            .await
    }
}

/// Shape and element type from the slice response headers.
pub fn slice_headers(headers: &HeaderMap) -> Result<(Vec<u64>, ElementType), TransferError> {
    let shape = headers
        .get(SHAPE_HEADER)
        .ok_or_else(|| TransferError::Protocol(format!("missing {} header", SHAPE_HEADER)))?;
    let shape: Vec<u64> = shape
        .to_str()
        .ok()
        .and_then(|s| serde_json::from_str(s).ok())
        .ok_or_else(|| TransferError::Protocol(format!("unreadable {} header", SHAPE_HEADER)))?;

    let tag = headers
        .get(TYPE_HEADER)
        .ok_or_else(|| TransferError::Protocol(format!("missing {} header", TYPE_HEADER)))?;
    let element_type = tag
        .to_str()
        .ok()
        .and_then(ElementType::from_tag)
        .ok_or_else(|| TransferError::Protocol(format!("unknown element type {:?}", tag)))?;

    Ok((shape, element_type))
}
