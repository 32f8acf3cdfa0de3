use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use url::Url;

use super::error::GatewayError;
use super::responses::BrowseResponse;
use super::{ArchiveStream, ListedPage, RemoteGateway};
use crate::checkpoint::CheckpointParameters;
use crate::types::Category;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";
const LISTING_ACCEPT: &str = "application/vnd.newbay.dv-1.20+json";

const OP_LIST: &str = "listing";
const OP_PACKAGE: &str = "packaging";
const OP_TOKEN: &str = "token refresh";

/// Connection settings for [`BtCloudClient`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub user_id: String,
    /// Device repositories included in every listing.
    pub repositories: Vec<String>,
    /// Timeout for listing and token calls.
    pub request_timeout: Duration,
    /// How long the zip call may wait for response headers; the server
    /// packages the whole page before the first byte arrives. The body
    /// itself is not time limited.
    pub archive_timeout: Duration,
}

/// HTTP implementation of [`RemoteGateway`].
///
/// Holds three `reqwest::Client`s because the calls differ in timeout and
/// redirect policy. Each client is cheaply cloneable and pools connections.
#[derive(Debug, Clone)]
pub struct BtCloudClient {
    api: Client,
    archive: Client,
    token: Client,
    archive_timeout: Duration,
    base_url: Url,
    user_id: String,
    repositories: Vec<String>,
}

impl BtCloudClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        default_headers.insert(
            "X-Client-Identifier",
            HeaderValue::from_static("WhiteLabelWebApp"),
        );
        default_headers.insert("X-Client-Platform", HeaderValue::from_static("WEB"));

        let build = |builder: reqwest::ClientBuilder| {
            builder
                .default_headers(default_headers.clone())
                .gzip(true)
                .build()
                .map_err(|source| GatewayError::Transport {
                    operation: "client setup",
                    source,
                })
        };

        let api = build(Client::builder().timeout(config.request_timeout))?;
        // Only the wait for headers is bounded (see `package_archive`); a large
        // archive may take far longer than that to download.
        let archive = build(Client::builder().connect_timeout(config.request_timeout))?;
        // A 301 from the token endpoint is the signal that the token is dead,
        // so it must not be followed.
        let token = build(
            Client::builder()
                .timeout(config.request_timeout)
                .redirect(reqwest::redirect::Policy::none()),
        )?;

        Ok(Self {
            api,
            archive,
            token,
            archive_timeout: config.archive_timeout,
            base_url: config.base_url,
            user_id: config.user_id,
            repositories: config.repositories,
        })
    }

    fn listing_url(
        &self,
        category: Category,
        params: &CheckpointParameters,
    ) -> Result<Url, GatewayError> {
        let mut url = self.base_url.join(&format!(
            "dv/api/user/{}/browse/{}",
            self.user_id,
            category.listing_segment()
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("sort", "creationdate")
                .append_pair("order", "desc")
                .append_pair("start", &params.start.to_string())
                .append_pair("count", &params.count.to_string());
            for repository in &self.repositories {
                query.append_pair("repository", repository);
            }
            if let Some(cursor) = &params.cursor {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    fn archive_url(&self) -> Result<Url, GatewayError> {
        Ok(self
            .base_url
            .join(&format!("dv/api/user/{}/operations/zip", self.user_id))?)
    }

    fn token_url(&self) -> Result<Url, GatewayError> {
        Ok(self.base_url.join("web/app/accessToken")?)
    }
}

/// Form body for the zip call: one `repositoryPath` per file, then the
/// token and a unique archive name.
fn archive_form(file_ids: &[String], credential: &str, name: &str) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for id in file_ids {
        form.append_pair("repositoryPath", id);
    }
    form.append_pair("NWB", credential);
    form.append_pair("name", name);
    form.finish()
}

fn authorization(credential: &str) -> String {
    format!("NWB token=\"{}\"; authVersion=\"1.0\"", credential)
}

fn check_status(operation: &'static str, status: StatusCode) -> Result<(), GatewayError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::UNAUTHORIZED {
        Err(GatewayError::Rejected { operation })
    } else {
        Err(GatewayError::Status {
            operation,
            status: status.as_u16(),
        })
    }
}

#[async_trait::async_trait]
impl RemoteGateway for BtCloudClient {
    async fn list_page(
        &self,
        category: Category,
        params: &CheckpointParameters,
        credential: &str,
    ) -> Result<ListedPage, GatewayError> {
        let url = self.listing_url(category, params)?;
        tracing::debug!(%category, start = params.start, "GET {}", url.path());

        let transport = |source| GatewayError::Transport {
            operation: OP_LIST,
            source,
        };
        let response = self
            .api
            .get(url)
            .header(ACCEPT, LISTING_ACCEPT)
            .header(AUTHORIZATION, authorization(credential))
            .header(COOKIE, format!("NWB={}", credential))
            .send()
            .await
            .map_err(transport)?;
        check_status(OP_LIST, response.status())?;

        let body = response.bytes().await.map_err(transport)?;
        let parsed: BrowseResponse =
            serde_json::from_slice(&body).map_err(|source| GatewayError::Decode {
                operation: OP_LIST,
                source,
            })?;
        Ok(parsed.into())
    }

    async fn package_archive(
        &self,
        file_ids: &[String],
        credential: &str,
    ) -> Result<ArchiveStream, GatewayError> {
        let url = self.archive_url()?;
        let name = format!("Zip{}", chrono::Utc::now().timestamp_millis());
        let body = archive_form(file_ids, credential, &name);
        tracing::debug!(files = file_ids.len(), "POST {}", url.path());

        let request = self
            .archive
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(COOKIE, format!("NWB={}", credential))
            .body(body)
            .send();
        let response = tokio::time::timeout(self.archive_timeout, request)
            .await
            .map_err(|_| GatewayError::Timeout {
                operation: OP_PACKAGE,
                after: self.archive_timeout,
            })?
            .map_err(|source| GatewayError::Transport {
                operation: OP_PACKAGE,
                source,
            })?;
        check_status(OP_PACKAGE, response.status())?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|source| GatewayError::Transport {
                operation: OP_PACKAGE,
                source,
            })
        });
        Ok(stream.boxed())
    }

    async fn issue_credential(&self, current: &str) -> Result<String, GatewayError> {
        let url = self.token_url()?;
        let transport = |source| GatewayError::Transport {
            operation: OP_TOKEN,
            source,
        };
        let response = self
            .token
            .get(url)
            .header(ACCEPT, "text/plain")
            .header(AUTHORIZATION, authorization(current))
            .header(COOKIE, format!("NWB={}", current))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::MOVED_PERMANENTLY {
            return Err(GatewayError::Relocated);
        }
        check_status(OP_TOKEN, response.status())?;

        let token = response.text().await.map_err(transport)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(GatewayError::EmptyCredential);
        }
        Ok(token.to_string())
    }
}
