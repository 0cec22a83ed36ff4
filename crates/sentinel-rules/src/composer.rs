// crates/sentinel-rules/src/composer.rs
// ============================================================================
// Module: Ruleset Composer
// Description: sync, assemble, and release operations over RuleSources and
// Rulesets.
// Purpose: Materialize a Ruleset from rules pulled from one or more
// RuleSources, then publish an immutable version.
// Dependencies: async-trait, sentinel-core, crate::rule
// ============================================================================

//! ## Overview
//! [`sync_rule_source`] pulls and parses rule documents from one
//! [`RuleSource`], [`evict_stale_rules`] decides which previously known
//! rules a sync should remove from the pool, [`assemble`] selects and
//! deduplicates rules from a pool into a draft [`Ruleset`], and [`release`]
//! publishes a draft as an immutable, active version. Persistence of the
//! resulting entities is the caller's responsibility
//! (`sentinel-jobs`/`sentinel-server`); this crate only implements the
//! composition logic.

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use sentinel_core::CloudProvider;
use sentinel_core::CustomerId;
use sentinel_core::Rule;
use sentinel_core::RuleId;
use sentinel_core::RuleSource;
use sentinel_core::RuleSourceId;
use sentinel_core::RuleSourceSyncState;
use sentinel_core::Ruleset;
use sentinel_core::RulesetName;
use sentinel_core::RulesetStatus;
use sentinel_core::RulesetVersion;
use sentinel_core::Timestamp;
use thiserror::Error;

use crate::rule::RuleParseError;
use crate::rule::logical_key;
use crate::rule::parse_rule_document;

/// Pulls the raw YAML rule documents published by a [`RuleSource`].
///
/// Implemented per source kind (git checkout, S3 prefix, HTTP feed) outside
/// this crate; `sentinel-rules` only consumes the resulting text.
#[async_trait]
pub trait RuleSourceFetcher: Send + Sync {
    /// Fetch errors specific to the backing transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns one YAML document per rule published by `source`.
    async fn fetch(&self, source: &RuleSource) -> Result<Vec<String>, Self::Error>;
}

/// Errors raised by [`sync_rule_source`].
#[derive(Debug, Error)]
pub enum SyncError<F: std::error::Error + Send + Sync + 'static> {
    /// A sync is already in progress for this source.
    #[error("sync already in progress for this source")]
    AlreadySyncing,
    /// The fetcher failed to retrieve content.
    #[error("fetch failed: {0}")]
    Fetch(F),
}

/// Outcome of one [`sync_rule_source`] call.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Successfully parsed rules.
    pub parsed: Vec<Rule>,
    /// Index (within the fetched document list) and reason for each rule
    /// that failed to parse.
    pub failed: Vec<(usize, RuleParseError)>,
}

/// Pulls and parses every rule document published by `source`.
///
/// Fails individual rules with a reason; the whole sync succeeds iff at
/// least one rule parsed. On success, `source.sync_state` becomes `Synced`
/// and `last_synced_at` is stamped; on failure (zero rules parsed, or a
/// fetch error) it becomes `Failed`. Concurrent syncs against the same
/// source are rejected while `sync_state` is already `Syncing`.
///
/// # Errors
///
/// Returns [`SyncError::AlreadySyncing`] if a sync is already running, or
/// [`SyncError::Fetch`] if the fetcher itself fails.
pub async fn sync_rule_source<F>(
    source: &mut RuleSource,
    fetcher: &dyn RuleSourceFetcher<Error = F>,
    now: Timestamp,
) -> Result<SyncOutcome, SyncError<F>>
where
    F: std::error::Error + Send + Sync + 'static,
{
    if source.sync_state == RuleSourceSyncState::Syncing {
        return Err(SyncError::AlreadySyncing);
    }
    source.sync_state = RuleSourceSyncState::Syncing;

    let documents = match fetcher.fetch(source).await {
        Ok(documents) => documents,
        Err(err) => {
            source.sync_state = RuleSourceSyncState::Failed;
            return Err(SyncError::Fetch(err));
        }
    };

    let mut parsed = Vec::new();
    let mut failed = Vec::new();
    for (index, document) in documents.iter().enumerate() {
        match parse_rule_document(&source.id, document) {
            Ok(rule) => parsed.push(rule),
            Err(err) => failed.push((index, err)),
        }
    }

    if parsed.is_empty() {
        source.sync_state = RuleSourceSyncState::Failed;
    } else {
        source.sync_state = RuleSourceSyncState::Synced;
        source.last_synced_at = Some(now);
    }

    Ok(SyncOutcome { parsed, failed })
}

/// Decides which of a source's previously known rules should be evicted
/// from the rule pool after a fresh sync.
///
/// A rule id in `previous` but absent from `fresh` (this sync's resolved
/// rule ids) is evicted unless `referenced` — every rule id still listed
/// by an un-deleted [`Ruleset`] — still names it, in which case it is
/// retained so in-flight rulesets keep resolving it even though the
/// upstream source stopped publishing it.
#[must_use]
pub fn evict_stale_rules(previous: &[RuleId], fresh: &[RuleId], referenced: &HashSet<RuleId>) -> Vec<RuleId> {
    previous.iter().filter(|id| !fresh.contains(id) && !referenced.contains(id)).cloned().collect()
}

/// Selects which rules from the pool are included in an assembled ruleset.
#[derive(Debug, Clone)]
pub enum RulesetSelector {
    /// Every rule targeting the ruleset's cloud platform.
    AllForCloud,
    /// Rules mapped to a named compliance standard.
    StandardName(String),
    /// Rules belonging to a named service section.
    ServiceSection(String),
    /// An explicit rule id list.
    RuleIdList(Vec<RuleId>),
    /// Every rule originating from one rule source (stands in for a
    /// git-project-id-plus-ref selector, since a source already pins a
    /// project and ref at sync time).
    Source(RuleSourceId),
}

/// Errors raised by [`assemble`].
#[derive(Debug, Error)]
pub enum AssembleError {
    /// An explicit `rule_id_list` selector named an id absent from the pool.
    #[error("rule id not found in pool: {0}")]
    UnknownRuleId(RuleId),
}

/// Assembles a draft [`Ruleset`] from `pool` using `selector`.
///
/// Rules sharing a [`logical_key`] (same rule, different source or version)
/// are deduplicated: the highest `version` wins; ties are broken by
/// `source_priority` (earlier entries outrank later ones, and a source
/// absent from the list outranks nothing). The result is `Failed` if no
/// rules remain after selection and dedup, `ReadyToScan` otherwise.
///
/// # Errors
///
/// Returns [`AssembleError::UnknownRuleId`] when `selector` is
/// `RuleIdList` and names an id not present in `pool`.
pub fn assemble(
    customer_id: CustomerId,
    name: RulesetName,
    cloud: CloudProvider,
    version: RulesetVersion,
    selector: &RulesetSelector,
    pool: &[Rule],
    source_priority: &[RuleSourceId],
    now: Timestamp,
) -> Result<Ruleset, AssembleError> {
    let selected = select_rules(selector, pool, cloud)?;
    let deduped = dedup_by_logical_key(selected, source_priority);

    let mut rule_ids: Vec<RuleId> = deduped.into_iter().map(|rule| rule.id.clone()).collect();
    rule_ids.sort();

    let status = if rule_ids.is_empty() { RulesetStatus::Failed } else { RulesetStatus::ReadyToScan };

    Ok(Ruleset {
        name,
        customer_id,
        cloud,
        version,
        rule_ids,
        status,
        released: false,
        active: false,
        display_name: None,
        created_at: now,
    })
}

fn select_rules<'a>(selector: &RulesetSelector, pool: &'a [Rule], cloud: CloudProvider) -> Result<Vec<&'a Rule>, AssembleError> {
    match selector {
        RulesetSelector::AllForCloud => Ok(pool.iter().filter(|rule| rule.cloud == cloud).collect()),
        RulesetSelector::StandardName(standard) => {
            Ok(pool.iter().filter(|rule| rule.cloud == cloud && rule.standards.iter().any(|s| s == standard)).collect())
        }
        RulesetSelector::ServiceSection(section) => {
            Ok(pool.iter().filter(|rule| rule.cloud == cloud && rule.service_section.as_deref() == Some(section.as_str())).collect())
        }
        RulesetSelector::Source(source_id) => Ok(pool.iter().filter(|rule| &rule.source_id == source_id).collect()),
        RulesetSelector::RuleIdList(ids) => ids
            .iter()
            .map(|id| pool.iter().find(|rule| &rule.id == id).ok_or_else(|| AssembleError::UnknownRuleId(id.clone())))
            .collect(),
    }
}

fn dedup_by_logical_key<'a>(rules: Vec<&'a Rule>, source_priority: &[RuleSourceId]) -> Vec<&'a Rule> {
    let mut winners: HashMap<&'a str, &'a Rule> = HashMap::new();
    for rule in rules {
        let key = logical_key(rule);
        match winners.get(key) {
            None => {
                winners.insert(key, rule);
            }
            Some(incumbent) => {
                if outranks(rule, incumbent, source_priority) {
                    winners.insert(key, rule);
                }
            }
        }
    }
    let mut result: Vec<&Rule> = winners.into_values().collect();
    result.sort_by(|a, b| a.id.cmp(&b.id));
    result
}

fn outranks(candidate: &Rule, incumbent: &Rule, source_priority: &[RuleSourceId]) -> bool {
    if candidate.version != incumbent.version {
        return candidate.version > incumbent.version;
    }
    let candidate_rank = source_priority.iter().position(|id| id == &candidate.source_id).unwrap_or(usize::MAX);
    let incumbent_rank = source_priority.iter().position(|id| id == &incumbent.source_id).unwrap_or(usize::MAX);
    candidate_rank < incumbent_rank
}

/// Errors raised by [`release`].
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// `overwrite` was false and a ruleset already exists at this version.
    #[error("ruleset already exists at this version")]
    AlreadyExists,
    /// The draft is not ready to be released (assembly failed).
    #[error("ruleset is not ready to scan")]
    NotReady,
}

/// Publishes `draft` as an immutable, active ruleset version.
///
/// `existing` is the caller's lookup of any ruleset already released at
/// `draft.version` for the same (customer, name, cloud); pass `None` when
/// none exists.
///
/// # Errors
///
/// Returns [`ReleaseError::NotReady`] if `draft.status` is not
/// `ReadyToScan`, or [`ReleaseError::AlreadyExists`] if `overwrite` is
/// false and `existing` is `Some`.
pub fn release(draft: Ruleset, display_name: String, overwrite: bool, existing: Option<&Ruleset>) -> Result<Ruleset, ReleaseError> {
    if draft.status != RulesetStatus::ReadyToScan {
        return Err(ReleaseError::NotReady);
    }
    if existing.is_some() && !overwrite {
        return Err(ReleaseError::AlreadyExists);
    }
    Ok(Ruleset { released: true, active: true, display_name: Some(display_name), ..draft })
}
