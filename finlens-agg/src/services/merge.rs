//! Cross-source merge of same-domain records
//!
//! Providers that describe the same kind of real-world record with different
//! schemas are first normalized into one domain type by their clients, then
//! merged here: every record is tagged with its provider id and disambiguated
//! before the per-provider lists are concatenated. No cross-source
//! deduplication is attempted.

use finlens_common::SourceStatus;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::types::CongressionalTrade;

/// What one provider contributed to a merge
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome<T> {
    /// Still in flight
    Loading,
    /// Answered; an empty list means the provider had nothing
    Records(Vec<T>),
    /// Failed; message kept for diagnostics
    Failed(String),
}

impl<T> SourceOutcome<T> {
    pub fn status(&self) -> SourceStatus {
        match self {
            SourceOutcome::Loading => SourceStatus::Loading,
            SourceOutcome::Records(records) if records.is_empty() => SourceStatus::Empty,
            SourceOutcome::Records(_) => SourceStatus::Success,
            SourceOutcome::Failed(_) => SourceStatus::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceContribution<T> {
    /// Provider id written to each record's `source`
    pub source: String,
    /// Disambiguation applied to each record (e.g. chamber name)
    pub qualifier: Option<String>,
    pub outcome: SourceOutcome<T>,
}

/// Provider-specific disambiguation of a record before merge
pub trait Qualify {
    fn qualify(&mut self, qualifier: &str);
}

impl Qualify for CongressionalTrade {
    /// "Senator" becomes "Senator (Senate)"
    fn qualify(&mut self, qualifier: &str) {
        self.position = format!("{} ({})", self.position, qualifier);
    }
}

/// Domain record annotated with the provider it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTagged<T> {
    pub source: String,
    #[serde(flatten)]
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCollection<T> {
    pub records: Vec<SourceTagged<T>>,
    pub status: SourceStatus,
    /// Providers that errored and contributed nothing
    pub failed_sources: Vec<String>,
}

/// Aggregate status of a merge from its per-provider statuses
///
/// `loading` if any provider is loading; else `error` iff every provider
/// errored; else `success` if any provider returned records; else `empty`.
pub fn merged_status(statuses: &[SourceStatus]) -> SourceStatus {
    if statuses.contains(&SourceStatus::Loading) {
        SourceStatus::Loading
    } else if !statuses.is_empty() && statuses.iter().all(|s| *s == SourceStatus::Error) {
        SourceStatus::Error
    } else if statuses.contains(&SourceStatus::Success) {
        SourceStatus::Success
    } else {
        SourceStatus::Empty
    }
}

/// Tag, qualify and concatenate contributions in the order given
pub fn merge_sources<T: Qualify>(contributions: Vec<SourceContribution<T>>) -> MergedCollection<T> {
    let statuses: Vec<SourceStatus> = contributions.iter().map(|c| c.outcome.status()).collect();
    let status = merged_status(&statuses);

    let mut records = Vec::new();
    let mut failed_sources = Vec::new();

    for contribution in contributions {
        match contribution.outcome {
            SourceOutcome::Records(batch) => {
                records.extend(batch.into_iter().map(|mut record| {
                    if let Some(qualifier) = &contribution.qualifier {
                        record.qualify(qualifier);
                    }
                    SourceTagged {
                        source: contribution.source.clone(),
                        record,
                    }
                }));
            }
            SourceOutcome::Failed(_) => failed_sources.push(contribution.source),
            SourceOutcome::Loading => {}
        }
    }

    MergedCollection {
        records,
        status,
        failed_sources,
    }
}

impl MergedCollection<CongressionalTrade> {
    /// Newest transaction first; undated records last, ties keep merge order
    pub fn sort_by_transaction_date_desc(&mut self) {
        self.records.sort_by_key(|tagged| {
            let date = tagged.record.transaction_date;
            (date.is_none(), Reverse(date))
        });
    }
}
