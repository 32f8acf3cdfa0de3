//! Scripted in-memory gateway for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use super::{ArchiveStream, GatewayError, ListedPage, RemoteFile, RemoteGateway};
use crate::checkpoint::CheckpointParameters;
use crate::types::Category;

type ArchiveReply = Result<Vec<Result<Bytes, GatewayError>>, GatewayError>;

/// Replies are consumed in order. An exhausted listing script answers with
/// an empty page, an exhausted archive script with a small body naming the
/// files, and an exhausted issue script with `token-N`.
#[derive(Default)]
pub(crate) struct FakeGateway {
    pages: Mutex<HashMap<Category, VecDeque<Result<ListedPage, GatewayError>>>>,
    archives: Mutex<VecDeque<ArchiveReply>>,
    issues: Mutex<VecDeque<Result<String, GatewayError>>>,
    issue_delay: Option<Duration>,
    panicking: Mutex<HashSet<Category>>,
    pub(crate) list_calls: Mutex<Vec<(Category, CheckpointParameters, String)>>,
    pub(crate) package_calls: Mutex<Vec<(Vec<String>, String)>>,
    pub(crate) issue_calls: Mutex<Vec<String>>,
    issued: AtomicUsize,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_issue_delay(mut self, delay: Duration) -> Self {
        self.issue_delay = Some(delay);
        self
    }

    /// Make every listing call for `category` panic.
    pub(crate) fn panic_on_list(&self, category: Category) {
        self.panicking.lock().unwrap().insert(category);
    }

    pub(crate) fn push_page(&self, category: Category, page: ListedPage) {
        self.push_list_reply(category, Ok(page));
    }

    pub(crate) fn push_list_reply(
        &self,
        category: Category,
        reply: Result<ListedPage, GatewayError>,
    ) {
        self.pages
            .lock()
            .unwrap()
            .entry(category)
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn push_archive_reply(&self, reply: ArchiveReply) {
        self.archives.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_issue_reply(&self, reply: Result<String, GatewayError>) {
        self.issues.lock().unwrap().push_back(reply);
    }

    pub(crate) fn issue_count(&self) -> usize {
        self.issue_calls.lock().unwrap().len()
    }

    pub(crate) fn list_starts(&self, category: Category) -> Vec<u32> {
        self.list_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == category)
            .map(|(_, p, _)| p.start)
            .collect()
    }
}

/// A page of `n` synthetic files, named `{prefix}-{i}`.
pub(crate) fn page(prefix: &str, n: usize, next_cursor: Option<&str>) -> ListedPage {
    ListedPage {
        items: (0..n)
            .map(|i| RemoteFile {
                repository: "TABLET".into(),
                parent_path: "/files".into(),
                name: format!("{}-{}", prefix, i),
            })
            .collect(),
        next_cursor: next_cursor.map(str::to_string),
    }
}

#[async_trait::async_trait]
impl RemoteGateway for FakeGateway {
    async fn list_page(
        &self,
        category: Category,
        params: &CheckpointParameters,
        credential: &str,
    ) -> Result<ListedPage, GatewayError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((category, params.clone(), credential.to_string()));
        let panics = self.panicking.lock().unwrap().contains(&category);
        if panics {
            panic!("listing {} blew up", category);
        }
        let reply = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&category)
            .and_then(|q| q.pop_front());
        reply.unwrap_or_else(|| Ok(ListedPage::default()))
    }

    async fn package_archive(
        &self,
        file_ids: &[String],
        credential: &str,
    ) -> Result<ArchiveStream, GatewayError> {
        self.package_calls
            .lock()
            .unwrap()
            .push((file_ids.to_vec(), credential.to_string()));
        let reply = self.archives.lock().unwrap().pop_front();
        let chunks = match reply {
            Some(reply) => reply?,
            None => vec![Ok(Bytes::from(format!("PK:{}", file_ids.join(","))))],
        };
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn issue_credential(&self, current: &str) -> Result<String, GatewayError> {
        self.issue_calls.lock().unwrap().push(current.to_string());
        if let Some(delay) = self.issue_delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.issues.lock().unwrap().pop_front();
        match reply {
            Some(reply) => reply,
            None => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("token-{}", n))
            }
        }
    }
}
