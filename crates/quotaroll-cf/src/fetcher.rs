//! Paginated resource fetcher
//!
//! The v2 API returns collections one page at a time, each page naming the
//! next one in `next_url`. [`ResourceFetcher::fetch`] exposes a collection
//! as a lazy stream: a page is requested only when the previous one has been
//! consumed, and the first failed request ends the stream with an error.
//!
//! # Examples
//!
//! ```no_run
//! use futures::StreamExt;
//! use quotaroll_cf::{CfSession, ResourceFetcher};
//!
//! # async fn example() -> quotaroll_core::Result<()> {
//! let session = CfSession::login("https://api.example.com", "client", "secret").await?;
//! let fetcher = ResourceFetcher::new(session);
//!
//! let records = fetcher.fetch("/v2/organizations");
//! tokio::pin!(records);
//! while let Some(record) = records.next().await {
//!     println!("{}", record?.guid());
//! }
//! # Ok(())
//! # }
//! ```

use crate::session::CfSession;
use futures::StreamExt;
use futures::stream::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use quotaroll_core::error::Result;
use quotaroll_core::types::{Organization, QuotaDefinition, ResourcePage, ResourceRecord};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

/// Collection path of organizations
pub const ORGANIZATIONS_PATH: &str = "/v2/organizations";
/// Collection path of quota definitions
pub const QUOTA_DEFINITIONS_PATH: &str = "/v2/quota_definitions";

/// Streams resource collections page by page
pub struct ResourceFetcher {
    session: CfSession,
    show_progress: bool,
}

impl ResourceFetcher {
    pub fn new(session: CfSession) -> Self {
        Self {
            session,
            show_progress: false,
        }
    }

    /// Show a spinner while pages are fetched
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn session(&self) -> &CfSession {
        &self.session
    }

    /// Stream every record of a collection, in page order.
    ///
    /// The stream cannot be resumed after an error; call `fetch` again to
    /// start over from the first page.
    pub fn fetch<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Stream<Item = Result<ResourceRecord>> + Send + 'a>> {
        let progress = self.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed_precise}] {pos} resources fetched")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("Fetching {path}"));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        Box::pin(async_stream::try_stream! {
            let mut next = Some(path.to_string());
            let mut pages = 0usize;

            while let Some(url) = next.take() {
                let page: ResourcePage =
                    clear_on_error(self.session.get(&url).await, progress.as_ref())?;
                pages += 1;
                debug!(
                    "Fetched page {} of {} ({} resources)",
                    pages,
                    path,
                    page.resources.len()
                );

                next = page.next_url.filter(|u| !u.is_empty());
                for record in page.resources {
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    yield record;
                }
            }

            if let Some(pb) = &progress {
                pb.finish_and_clear();
            }
            info!("Fetched {} pages of {}", pages, path);
        })
    }

    /// Collect a whole collection
    pub async fn fetch_all(&self, path: &str) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();
        let mut stream = self.fetch(path);
        while let Some(record) = stream.next().await {
            records.push(record?);
        }
        Ok(records)
    }

    /// Every organization, as typed views
    pub async fn organizations(&self) -> Result<Vec<Organization>> {
        self.fetch_all(ORGANIZATIONS_PATH)
            .await?
            .iter()
            .map(Organization::try_from)
            .collect()
    }

    /// Every quota definition, as typed views
    pub async fn quota_definitions(&self) -> Result<Vec<QuotaDefinition>> {
        self.fetch_all(QUOTA_DEFINITIONS_PATH)
            .await?
            .iter()
            .map(QuotaDefinition::try_from)
            .collect()
    }
}

/// Finish the spinner before an error ends the stream
fn clear_on_error<T>(result: Result<T>, progress: Option<&ProgressBar>) -> Result<T> {
    if let (Err(_), Some(pb)) = (&result, progress) {
        pb.finish_and_clear();
    }
    result
}
