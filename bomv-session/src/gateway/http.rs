//! HTTP implementation of the verification gateway

use super::{
    BulkVerifyItem, DetectionConfig, DetectionResponse, ExportFormat, ManualDetectionRequest,
    SessionImage, UploadFile, UploadResponse, VerificationGateway, VerifyRequest,
};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use bomv_common::models::{BomData, Detection, Session, SessionDetail};
use serde::de::DeserializeOwned;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("bomv/", env!("CARGO_PKG_VERSION"));

/// Error body returned by the gateway on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

/// Session listing, either a bare array or wrapped in `sessions`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionList {
    Bare(Vec<Session>),
    Wrapped { sessions: Vec<Session> },
}

impl SessionList {
    fn into_sessions(self) -> Vec<Session> {
        match self {
            SessionList::Bare(sessions) | SessionList::Wrapped { sessions } => sessions,
        }
    }
}

/// Gateway client over reqwest
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http_client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
    request_timeout: Duration,
}

impl HttpGateway {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        request_timeout: Duration,
    ) -> GatewayResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| GatewayError::Parse(format!("gateway URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Parse(format!("gateway URL {} has no path", base_url)));
        }

        // No client-wide timeout: detection runs are bounded by cancellation only
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_token,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn url(&self, segments: &[&str]) -> GatewayResult<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(GatewayError::InvalidId(bad.to_string()));
        }
        let mut url = self.base_url.clone();
        // Always Ok: `new` rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Request with the per-request timeout applied
    fn timed(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.request(method, url).timeout(self.request_timeout)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> GatewayResult<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(
                error_message(&body).unwrap_or(url),
            ));
        }

        let message = error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
        tracing::warn!(status = status.as_u16(), url = %url, "Gateway returned error");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> GatewayResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

/// Extract the server's `detail` or `message` field
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        Some(serde_json::Value::String(detail)) => Some(detail),
        Some(other) => Some(other.to_string()),
        None => parsed.message,
    }
}

#[async_trait]
impl VerificationGateway for HttpGateway {
    async fn upload(&self, file: &UploadFile) -> GatewayResult<UploadResponse> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::debug!(filename = %file.filename, size = file.bytes.len(), "Uploading drawing");
        self.send_json(
            self.timed(reqwest::Method::POST, self.url(&["sessions", "upload"])?)
                .multipart(form),
        )
        .await
    }

    async fn get_session(
        &self,
        session_id: &str,
        include_detections: bool,
    ) -> GatewayResult<SessionDetail> {
        self.send_json(
            self.timed(reqwest::Method::GET, self.url(&["sessions", session_id])?)
                .query(&[("include_detections", include_detections)]),
        )
        .await
    }

    async fn get_session_image(
        &self,
        session_id: &str,
        image_id: Option<&str>,
    ) -> GatewayResult<SessionImage> {
        let url = match image_id {
            Some(image_id) => self.url(&["sessions", session_id, "images", image_id])?,
            None => self.url(&["sessions", session_id, "image"])?,
        };
        self.send_json(self.timed(reqwest::Method::GET, url)).await
    }

    async fn detect(
        &self,
        session_id: &str,
        config: &DetectionConfig,
        cancel: CancellationToken,
    ) -> GatewayResult<DetectionResponse> {
        let builder = self
            .request(reqwest::Method::POST, self.url(&["detection", session_id])?)
            .json(config);

        // Dropping the request future aborts the connection
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(session_id = %session_id, "Detection request abandoned");
                Err(GatewayError::Cancelled)
            }
            result = self.send_json::<DetectionResponse>(builder) => result,
        }
    }

    async fn verify(&self, session_id: &str, request: &VerifyRequest) -> GatewayResult<()> {
        self.send(
            self.timed(
                reqwest::Method::POST,
                self.url(&["verification", session_id, "verify"])?,
            )
            .json(request),
        )
        .await?;
        Ok(())
    }

    async fn bulk_verify(&self, session_id: &str, items: &[BulkVerifyItem]) -> GatewayResult<()> {
        self.send(
            self.timed(
                reqwest::Method::POST,
                self.url(&["verification", session_id, "bulk"])?,
            )
            .json(&serde_json::json!({ "verifications": items })),
        )
        .await?;
        Ok(())
    }

    async fn add_manual(
        &self,
        session_id: &str,
        request: &ManualDetectionRequest,
    ) -> GatewayResult<Detection> {
        self.send_json(
            self.timed(
                reqwest::Method::POST,
                self.url(&["verification", session_id, "manual"])?,
            )
            .json(request),
        )
        .await
    }

    async fn delete_detection(&self, session_id: &str, detection_id: &str) -> GatewayResult<()> {
        self.send(self.timed(
            reqwest::Method::DELETE,
            self.url(&["verification", session_id, "detections", detection_id])?,
        ))
        .await?;
        Ok(())
    }

    async fn generate_bom(&self, session_id: &str) -> GatewayResult<BomData> {
        self.send_json(self.timed(
            reqwest::Method::POST,
            self.url(&["bom", session_id, "generate"])?,
        ))
        .await
    }

    async fn delete_session(&self, session_id: &str) -> GatewayResult<()> {
        self.send(self.timed(
            reqwest::Method::DELETE,
            self.url(&["sessions", session_id])?,
        ))
        .await?;
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> GatewayResult<Vec<Session>> {
        let list: SessionList = self
            .send_json(
                self.timed(reqwest::Method::GET, self.url(&["sessions"])?)
                    .query(&[("limit", limit)]),
            )
            .await?;
        Ok(list.into_sessions())
    }

    fn export_url(&self, session_id: &str, format: ExportFormat) -> GatewayResult<String> {
        let mut url = self.url(&["bom", session_id, "download"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        Ok(url.to_string())
    }
}
