//! Reconciliation join between organizations and quota definitions
//!
//! Both collections are fetched independently (and paginated), so an
//! organization can reference a quota definition that is not in the fetched
//! set, e.g. when a quota is created between the two fetches. What happens
//! then is decided by [`MissingQuotaPolicy`]; the default aborts the run
//! before anything is written.

use crate::error::{QuotarollError, Result};
use crate::types::{Guid, Organization, PollDocument, QuotaDefinition};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do with an organization whose quota definition was not fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingQuotaPolicy {
    /// Fail the run with `MissingReference`, listing every dangling pair
    #[default]
    Abort,
    /// Leave the organization out of this poll and report it
    Skip,
}

impl fmt::Display for MissingQuotaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for MissingQuotaPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("expected 'abort' or 'skip', got '{s}'")),
        }
    }
}

/// An organization pointing at a quota definition that was not fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub org_id: Guid,
    pub org_name: String,
    pub quota_id: Guid,
}

/// Output of the join
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// One poll document per resolvable organization, ordered by org guid
    pub documents: Vec<PollDocument>,
    /// Organizations left out under `MissingQuotaPolicy::Skip`
    pub skipped: Vec<DanglingReference>,
}

/// Join organizations to their quota definitions.
///
/// Every document shares the poll instant `now`, truncated to whole seconds.
/// Duplicate guids (a record seen on two pages) collapse to the last one.
pub fn reconcile(
    organizations: Vec<Organization>,
    quotas: Vec<QuotaDefinition>,
    now: DateTime<Utc>,
    policy: MissingQuotaPolicy,
) -> Result<Reconciliation> {
    let now = now.trunc_subsecs(0);
    let organizations: BTreeMap<Guid, Organization> = organizations
        .into_iter()
        .map(|org| (org.guid.clone(), org))
        .collect();
    let quotas: BTreeMap<Guid, QuotaDefinition> = quotas
        .into_iter()
        .map(|quota| (quota.guid.clone(), quota))
        .collect();
    debug!(
        "Reconciling {} organizations against {} quota definitions",
        organizations.len(),
        quotas.len()
    );

    let mut documents = Vec::with_capacity(organizations.len());
    let mut dangling = Vec::new();

    for org in organizations.values() {
        let Some(quota) = quotas.get(&org.quota_definition_guid) else {
            dangling.push(DanglingReference {
                org_id: org.guid.clone(),
                org_name: org.name.clone(),
                quota_id: org.quota_definition_guid.clone(),
            });
            continue;
        };

        documents.push(PollDocument {
            id: PollDocument::build_id(&org.guid, &quota.guid, now),
            timestamp: now,
            org_id: org.guid.to_string(),
            org_name: org.name.clone(),
            quota_id: quota.guid.to_string(),
            quota_name: quota.name.clone(),
            memory_limit: quota.memory_limit,
        });
    }

    if !dangling.is_empty() {
        match policy {
            MissingQuotaPolicy::Abort => return Err(QuotarollError::MissingReference(dangling)),
            MissingQuotaPolicy::Skip => {
                for reference in &dangling {
                    warn!(
                        "Skipping organization {} ({}): quota definition {} not found",
                        reference.org_id, reference.org_name, reference.quota_id
                    );
                }
            }
        }
    }

    Ok(Reconciliation {
        documents,
        skipped: dangling,
    })
}
