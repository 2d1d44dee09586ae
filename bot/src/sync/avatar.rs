use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::SyncError;

/// Source of avatar image bytes. The HTTP implementation is used in
/// production; tests substitute an in-process one.
pub trait AvatarFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>, SyncError>>;
}

/// Fetches avatars from the CDN over HTTPS.
#[derive(Clone)]
pub struct HttpAvatarFetcher {
    client: reqwest::Client,
}

impl HttpAvatarFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("voiceinfo/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpAvatarFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarFetcher for HttpAvatarFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<Vec<u8>, SyncError>> {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            let failed = |reason: String| SyncError::AvatarFetch {
                url: url.clone(),
                reason,
            };
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(|e| failed(e.to_string()))?
                .error_for_status()
                .map_err(|e| failed(e.to_string()))?;
            let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
            Ok(bytes.to_vec())
        })
    }
}
