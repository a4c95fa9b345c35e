//! REST client for the Hugging Face Hub Spaces endpoint.
//!
//! Only the runtime status lookup is needed: `GET /api/spaces/{id}`
//! returns the Space metadata including `runtime.stage`
//! (`RUNNING`, `BUILDING`, `SLEEPING`, `RUNTIME_ERROR`, ...).

use serde::Deserialize;

/// Default Hub base URL.
pub const DEFAULT_API_BASE: &str = "https://huggingface.co";

/// Stage reported when the response carries no runtime block.
pub const UNKNOWN_STAGE: &str = "unknown";

/// HTTP client for the Hub Spaces API.
#[derive(Clone)]
pub struct SpaceApi {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

/// Subset of the Space metadata returned by `GET /api/spaces/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub runtime: Option<SpaceRuntime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceRuntime {
    #[serde(default)]
    pub stage: Option<String>,
}

impl SpaceInfo {
    /// Runtime stage, or [`UNKNOWN_STAGE`] when not reported.
    pub fn stage(&self) -> &str {
        self.runtime
            .as_ref()
            .and_then(|r| r.stage.as_deref())
            .unwrap_or(UNKNOWN_STAGE)
    }
}

/// Errors from the Spaces REST layer.
#[derive(Debug, thiserror::Error)]
pub enum SpaceApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The Hub returned a non-2xx status code.
    #[error("Spaces API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The Space id is not of the form `owner/name`.
    #[error("Invalid Space id '{0}'")]
    InvalidSpaceId(String),
}

/// `owner/name`, each part made of alphanumerics, hyphen, underscore, dot.
pub fn is_valid_space_id(id: &str) -> bool {
    let Some((owner, name)) = id.split_once('/') else {
        return false;
    };
    let part_ok = |part: &str| {
        !part.is_empty()
            && part.len() <= 96
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    };
    part_ok(owner) && part_ok(name)
}

impl SpaceApi {
    /// Create a client for the Hub at `api_base`, e.g. `https://huggingface.co`.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base, token)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_base: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_base,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Endpoint URL for a Space's metadata.
    pub fn space_url(&self, space_id: &str) -> String {
        format!("{}/api/spaces/{}", self.api_base, space_id)
    }

    /// Fetch the Space metadata.
    pub async fn space_info(&self, space_id: &str) -> Result<SpaceInfo, SpaceApiError> {
        if !is_valid_space_id(space_id) {
            return Err(SpaceApiError::InvalidSpaceId(space_id.to_string()));
        }

        let mut request = self.client.get(self.space_url(space_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = Self::ensure_success(request.send().await?).await?;
        Ok(response.json::<SpaceInfo>().await?)
    }

    /// Fetch only the runtime stage of a Space.
    pub async fn runtime_stage(&self, space_id: &str) -> Result<String, SpaceApiError> {
        let info = self.space_info(space_id).await?;
        Ok(info.stage().to_string())
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SpaceApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SpaceApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for SpaceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceApi")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
