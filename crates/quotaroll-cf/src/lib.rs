//! Cloud Foundry resource fetching for quotaroll
//!
//! [`session::CfSession`] discovers the token endpoint and holds a
//! client-credentials access token; [`fetcher::ResourceFetcher`] walks the
//! v2 paginated collections (`/v2/organizations`, `/v2/quota_definitions`)
//! as a lazy stream of resource records.

pub mod fetcher;
pub mod session;

pub use fetcher::ResourceFetcher;
pub use session::CfSession;
