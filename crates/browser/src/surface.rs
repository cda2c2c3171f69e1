use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface navigation failed: {0}")]
    Navigate(String),
    #[error("surface snapshot failed: {0}")]
    Snapshot(String),
    #[error("surface interaction failed on `{element_ref}`: {message}")]
    Interaction { element_ref: String, message: String },
    #[error("surface key press failed for `{key}`: {message}")]
    KeyPress { key: String, message: String },
    #[error("no chat composer element is known yet")]
    ComposerUnknown,
}

/// The automation seam toward the remote chat page. Every call is fallible
/// and asynchronous; callers decide whether a failure aborts a turn or is
/// swallowed.
#[async_trait]
pub trait ActionSurface: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;
    async fn snapshot(&self) -> Result<String, SurfaceError>;
    async fn click(&self, element_ref: &str) -> Result<(), SurfaceError>;
    async fn type_text(&self, element_ref: &str, text: &str) -> Result<(), SurfaceError>;
    async fn press_key(&self, key: &str) -> Result<(), SurfaceError>;
}

/// Degraded surface used when no automation bridge is configured. Navigation
/// and interactions succeed silently and snapshots come back empty, so a
/// session can be exercised end to end without a browser.
#[derive(Default)]
pub struct NoopActionSurface;

#[async_trait]
impl ActionSurface for NoopActionSurface {
    async fn navigate(&self, _url: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn snapshot(&self) -> Result<String, SurfaceError> {
        Ok(String::new())
    }

    async fn click(&self, _element_ref: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn type_text(&self, _element_ref: &str, _text: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// Surface backed by a local automation bridge speaking a small JSON
/// protocol. The bridge owns the actual browser; this client only relays
/// commands and retrieves accessibility-tree snapshots.
pub struct HttpBridgeSurface {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct NavigateBody<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct ClickBody<'a> {
    element_ref: &'a str,
}

#[derive(Serialize)]
struct TypeBody<'a> {
    element_ref: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct PressBody<'a> {
    key: &'a str,
}

impl HttpBridgeSurface {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SurfaceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SurfaceError::Navigate(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(), reqwest::Error> {
        self.client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await?
            .error_for_status()
            .map(|_| ())
    }
}

#[async_trait]
impl ActionSurface for HttpBridgeSurface {
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.post("navigate", &NavigateBody { url })
            .await
            .map_err(|error| SurfaceError::Navigate(error.to_string()))
    }

    async fn snapshot(&self) -> Result<String, SurfaceError> {
        let response = self
            .client
            .get(self.endpoint("snapshot"))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| SurfaceError::Snapshot(error.to_string()))?;

        response.text().await.map_err(|error| SurfaceError::Snapshot(error.to_string()))
    }

    async fn click(&self, element_ref: &str) -> Result<(), SurfaceError> {
        self.post("click", &ClickBody { element_ref }).await.map_err(|error| {
            SurfaceError::Interaction {
                element_ref: element_ref.to_owned(),
                message: error.to_string(),
            }
        })
    }

    async fn type_text(&self, element_ref: &str, text: &str) -> Result<(), SurfaceError> {
        self.post("type", &TypeBody { element_ref, text }).await.map_err(|error| {
            SurfaceError::Interaction {
                element_ref: element_ref.to_owned(),
                message: error.to_string(),
            }
        })
    }

    async fn press_key(&self, key: &str) -> Result<(), SurfaceError> {
        self.post("press", &PressBody { key }).await.map_err(|error| SurfaceError::KeyPress {
            key: key.to_owned(),
            message: error.to_string(),
        })
    }
}
