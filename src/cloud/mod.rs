//! Remote service surface: paged listing, server-side zip packaging and
//! access-token issuance. The backup engine only talks to [`RemoteGateway`];
//! [`client::BtCloudClient`] is the HTTP implementation.

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod responses;

use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use client::BtCloudClient;
pub use error::GatewayError;

use crate::checkpoint::CheckpointParameters;
use crate::types::Category;

/// One remote file as returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub repository: String,
    pub parent_path: String,
    pub name: String,
}

impl RemoteFile {
    /// Identifier the packaging endpoint expects for this file.
    pub fn identifier(&self) -> String {
        format!("{}:{}/{}", self.repository, self.parent_path, self.name)
    }
}

/// A decoded listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedPage {
    pub items: Vec<RemoteFile>,
    /// Continuation token for the next page; `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Streaming archive body.
pub type ArchiveStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// The three capabilities the backup needs from the remote service. Each
/// method is a single attempt; retrying is the caller's job.
#[async_trait::async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_page(
        &self,
        category: Category,
        params: &CheckpointParameters,
        credential: &str,
    ) -> Result<ListedPage, GatewayError>;

    async fn package_archive(
        &self,
        file_ids: &[String],
        credential: &str,
    ) -> Result<ArchiveStream, GatewayError>;

    /// Exchange the current token for a fresh one.
    async fn issue_credential(&self, current: &str) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_identifier() {
        let file = RemoteFile {
            repository: "LAPTOP-1".into(),
            parent_path: "/Users/me/Documents".into(),
            name: "report.pdf".into(),
        };
        assert_eq!(file.identifier(), "LAPTOP-1:/Users/me/Documents/report.pdf");
    }
}
