//! Report and prediction generation
//!
//! aggregate fetch → completion call (resilient) → shape repair → bounded save.
//!
//! Text without a parseable JSON object is a hard failure. An object that is
//! missing sections is repaired with labelled placeholders and saved.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::aggregate_fetcher::{AggregateError, AggregateFetcher, AggregateResult};
use super::resilient_call::{call_with_retry_if, RetryError, RetryPolicy};
use super::response_repair::{repair_text, RepairError, ShapeContract, PREDICTION_CONTRACT, REPORT_CONTRACT};
use crate::db::{ArtifactKind, ArtifactStore, SaveOutcome};
use crate::types::{ChatMessage, CompletionRequest, CompletionService, FetchError, GenerationHint};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("Completion failed after {attempts} attempt(s): {source}")]
    Upstream { attempts: u32, source: FetchError },

    #[error("Generated output unusable: {0}")]
    Malformed(#[from] RepairError),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Failed to save generated artifact: {0}")]
    Persistence(#[from] finlens_common::Error),
}

impl From<RetryError<FetchError>> for GenerationError {
    fn from(err: RetryError<FetchError>) -> Self {
        let attempts = err.attempts();
        match err.into_last_error() {
            Some(source) => GenerationError::Upstream { attempts, source },
            None => GenerationError::Cancelled,
        }
    }
}

/// A generated and saved artifact
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArtifact {
    pub kind: ArtifactKind,
    pub symbol: String,
    #[serde(flatten)]
    pub saved: SaveOutcome,
    pub payload: Value,
    /// Sections synthesized because the generator left them out
    pub backfilled: Vec<String>,
    /// Aggregate slices that were missing when the prompt was built
    pub degraded_keys: Vec<String>,
}

pub struct ArtifactGenerator {
    fetcher: Arc<AggregateFetcher>,
    completion: Arc<dyn CompletionService>,
    store: ArtifactStore,
    retry: RetryPolicy,
    hint: GenerationHint,
}

fn contract_for(kind: ArtifactKind) -> &'static ShapeContract {
    match kind {
        ArtifactKind::Report => &REPORT_CONTRACT,
        ArtifactKind::Prediction => &PREDICTION_CONTRACT,
    }
}

fn system_prompt(kind: ArtifactKind, contract: &ShapeContract) -> String {
    let fields: Vec<&str> = contract.field_names().collect();
    format!(
        "You are an equity research analyst. Produce a {} as a single JSON object \
         with exactly these top-level fields: {}. Respond with JSON only.",
        kind,
        fields.join(", ")
    )
}

/// Prompt context: every slice that has data, plus which ones are missing
fn user_prompt(aggregate: &AggregateResult) -> String {
    let available: serde_json::Map<String, Value> = aggregate
        .values
        .iter()
        .filter(|(key, _)| aggregate.statuses.get(*key) == Some(&finlens_common::SourceStatus::Success))
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();

    json!({
        "symbol": aggregate.symbol,
        "data": available,
        "unavailable": aggregate.degraded_keys(),
    })
    .to_string()
}

impl ArtifactGenerator {
    pub fn new(
        fetcher: Arc<AggregateFetcher>,
        completion: Arc<dyn CompletionService>,
        store: ArtifactStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            completion,
            store,
            retry,
            hint: GenerationHint::Temperature(0.3),
        }
    }

    pub fn with_hint(mut self, hint: GenerationHint) -> Self {
        self.hint = hint;
        self
    }

    pub async fn generate_report(
        &self,
        owner_id: &str,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedArtifact, GenerationError> {
        self.generate(owner_id, symbol, ArtifactKind::Report, cancel).await
    }

    pub async fn generate_prediction(
        &self,
        owner_id: &str,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedArtifact, GenerationError> {
        self.generate(owner_id, symbol, ArtifactKind::Prediction, cancel).await
    }

    async fn generate(
        &self,
        owner_id: &str,
        symbol: &str,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let contract = contract_for(kind);
        let aggregate = self.fetcher.fetch_aggregate(symbol, cancel).await?;

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(system_prompt(kind, contract)),
                ChatMessage::user(user_prompt(&aggregate)),
            ],
            hint: self.hint,
            max_attempts: self.retry.max_attempts,
        };

        let policy = self.retry.with_max_attempts(request.max_attempts);
        let operation_name = format!("generate_{}", kind);
        let text = call_with_retry_if(
            &operation_name,
            &policy,
            cancel,
            || self.completion.complete(&request),
            FetchError::is_retryable,
        )
        .await?;

        let repaired = repair_text(&text, contract).map_err(|e| {
            warn!(symbol, kind = %kind, error = %e, "Generated output could not be parsed");
            e
        })?;

        let payload = json!({
            "symbol": symbol,
            "generated_at": Utc::now(),
            "content": repaired.value,
            "backfilled": repaired.backfilled,
        });

        let saved = self.store.save(owner_id, kind, symbol, &payload).await?;

        info!(
            owner_id,
            symbol,
            kind = %kind,
            artifact_id = %saved.artifact_id,
            backfilled = repaired.backfilled.len(),
            "Generated artifact saved"
        );

        Ok(GeneratedArtifact {
            kind,
            symbol: symbol.to_string(),
            saved,
            payload,
            backfilled: repaired.backfilled,
            degraded_keys: aggregate.degraded_keys(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_contract_fields() {
        let prompt = system_prompt(ArtifactKind::Prediction, &PREDICTION_CONTRACT);
        for field in PREDICTION_CONTRACT.field_names() {
            assert!(prompt.contains(field));
        }
    }

    #[test]
    fn test_retry_exhaustion_maps_to_upstream() {
        let err = GenerationError::from(RetryError::Failed {
            operation: "generate_report".into(),
            attempts: 3,
            last_error: FetchError::Network("reset".into()),
        });
        assert!(matches!(err, GenerationError::Upstream { attempts: 3, .. }));

        let cancelled = GenerationError::from(RetryError::<FetchError>::Cancelled {
            operation: "generate_report".into(),
            attempts: 1,
        });
        assert!(matches!(cancelled, GenerationError::Cancelled));
    }
}
