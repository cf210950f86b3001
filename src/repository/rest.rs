use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{PackageSummary, Repository, VersionRecord};
use crate::error::PkgError;
use crate::http::{FetchResponse, Fetcher};

/// Default timeout for repository requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// `{"success": bool, "data": ...}` wrapper used by every endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
}

/// Repository served by the JSON API.
pub struct RestRepository {
    base: String,
    fetcher: Fetcher,
    timeout: Duration,
}

impl RestRepository {
    pub fn new(base: &str, fetcher: Fetcher) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            fetcher,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn endpoint(&self, path: &str, query: Option<(&str, &str)>) -> String {
        match query {
            Some((key, value)) => format!(
                "{}/{}?{}={}",
                self.base,
                path,
                key,
                urlencoding::encode(value)
            ),
            None => format!("{}/{}", self.base, path),
        }
    }

    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let response = self.fetcher.fetch(url, Some(self.timeout)).await?;
        if !response.is_success() && response.status != StatusCode::NOT_FOUND {
            return Err(PkgError::Network(format!(
                "{} returned HTTP {}",
                url,
                response.status.as_u16()
            ))
            .into());
        }
        Ok(response)
    }

    /// `Ok(None)` for 404 or an unsuccessful envelope.
    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let response = self.get(url).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: Envelope<T> = response.json()?;
        if !envelope.success {
            debug!("{} reported failure", url);
            return Ok(None);
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl Repository for RestRepository {
    fn base(&self) -> &str {
        &self.base
    }

    #[tracing::instrument(skip(self))]
    async fn single(&self, name: &str) -> Result<Option<PackageSummary>> {
        self.get_data(&self.endpoint("info", Some(("id", name))))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<PackageSummary>> {
        let url = self.endpoint("search", None);
        match self.get_data(&url).await? {
            Some(packages) => Ok(packages),
            None => Err(PkgError::Network(format!("{} returned no package list", url)).into()),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn releases(&self, name: &str) -> Result<Option<Vec<VersionRecord>>> {
        self.get_data(&self.endpoint("releases", Some(("name", name))))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn download(&self, name: &str, release: &VersionRecord) -> Result<Bytes> {
        let spec = format!("{}=={}", name, release.version);
        let url = self.endpoint("download", Some(("spec", &spec)));
        info!("Downloading {} from {}...", spec, self.base);

        let response = self.get(&url).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(PkgError::NotFound {
                name: name.to_string(),
                repo: self.base.clone(),
            }
            .into());
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ConnectionPool, FetchOptions};

    fn release(version: &str) -> VersionRecord {
        VersionRecord {
            version: version.to_string(),
            location: None,
        }
    }

    fn repo(url: &str) -> RestRepository {
        let fetcher = Fetcher::new(
            ConnectionPool::new(),
            FetchOptions {
                max_attempts: 1,
                retry_delay: Duration::ZERO,
                ..FetchOptions::default()
            },
        );
        RestRepository::new(&format!("{}/", url), fetcher)
    }

    #[tokio::test]
    async fn test_single_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/info?id=keypatch")
            .with_status(200)
            .with_body(
                r#"{"success": true, "data": {"id": "keypatch", "name": "Keypatch",
                    "version": "2.2.0", "author": "someone"}}"#,
            )
            .create_async()
            .await;

        let found = repo(&server.url()).single("keypatch").await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(found.name.as_deref(), Some("Keypatch"));
        assert_eq!(found.version, "2.2.0");
    }

    #[tokio::test]
    async fn test_single_not_found_variants() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/info?id=missing")
            .with_status(404)
            .create_async()
            .await;
        let _rejected = server
            .mock("GET", "/info?id=rejected")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "no such package"}"#)
            .create_async()
            .await;

        let repo = repo(&server.url());
        assert!(repo.single("missing").await.unwrap().is_none());
        assert!(repo.single("rejected").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_server_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/info?id=x")
            .with_status(500)
            .create_async()
            .await;

        let err = repo(&server.url()).single("x").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PkgError>(), Some(PkgError::Network(_))));
    }

    #[tokio::test]
    async fn test_query_values_are_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/releases?name=a%20b%26c")
            .with_status(200)
            .with_body(r#"{"success": true, "data": []}"#)
            .create_async()
            .await;

        let releases = repo(&server.url()).releases("a b&c").await.unwrap();

        mock.assert_async().await;
        assert_eq!(releases, Some(vec![]));
    }

    #[tokio::test]
    async fn test_list_and_releases() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/search")
            .with_status(200)
            .with_body(
                r#"{"success": true, "data": [
                    {"id": "a", "version": "1.0.0"},
                    {"id": "b", "version": "0.2.0", "description": "bee"}]}"#,
            )
            .create_async()
            .await;
        let _releases = server
            .mock("GET", "/releases?name=a")
            .with_status(200)
            .with_body(
                r#"{"success": true, "data": [
                    {"version": "0.9.0"}, {"version": "1.0.0", "url": "https://cdn/a-1.zip"}]}"#,
            )
            .create_async()
            .await;

        let repo = repo(&server.url());
        let packages = repo.list().await.unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].description.as_deref(), Some("bee"));

        let releases = repo.releases("a").await.unwrap().unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[1].location.as_deref(), Some("https://cdn/a-1.zip"));
    }

    #[tokio::test]
    async fn test_list_malformed_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        assert!(repo(&server.url()).list().await.is_err());
    }

    #[tokio::test]
    async fn test_download_uses_spec_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/download?spec=x%3D%3D1.5.0")
            .with_status(200)
            .with_body("zip-bytes")
            .create_async()
            .await;

        let body = repo(&server.url())
            .download("x", &release("1.5.0"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], b"zip-bytes");
    }

    #[tokio::test]
    async fn test_download_sends_advertised_version() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/download?spec=x%3D%3Dv1.0")
            .with_status(200)
            .with_body("zip-bytes")
            .create_async()
            .await;

        repo(&server.url())
            .download("x", &release("v1.0"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_missing_release() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/download?spec=x%3D%3D9.9.9")
            .with_status(404)
            .create_async()
            .await;

        let err = repo(&server.url())
            .download("x", &release("9.9.9"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PkgError>(),
            Some(PkgError::NotFound { .. })
        ));
    }
}
