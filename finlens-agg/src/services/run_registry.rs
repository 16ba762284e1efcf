//! Active fetch runs, keyed by client, operation and symbol
//!
//! Starting a run for a scope that already has one cancels the older run's
//! token. Runs without a client id are never registered and cannot be
//! superseded.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Fetch operation a run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Aggregate,
    Alternative,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunScope {
    pub client: String,
    pub kind: RunKind,
    pub symbol: String,
}

/// Handle returned by `begin`; pass back to `finish`
#[derive(Debug, Clone)]
pub struct RunHandle {
    scope: Option<RunScope>,
    id: Uuid,
    token: CancellationToken,
}

impl RunHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone, Default)]
pub struct RunRegistry {
    active: Arc<RwLock<HashMap<RunScope, (Uuid, CancellationToken)>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run, cancelling the previous run of the same scope
    pub async fn begin(&self, client: Option<&str>, kind: RunKind, symbol: &str) -> RunHandle {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();

        let scope = client.filter(|c| !c.is_empty()).map(|client| RunScope {
            client: client.to_string(),
            kind,
            symbol: symbol.to_string(),
        });

        if let Some(scope) = &scope {
            let mut active = self.active.write().await;
            if let Some((previous_id, previous)) = active.insert(scope.clone(), (id, token.clone())) {
                debug!(client = %scope.client, symbol = %scope.symbol, run_id = %previous_id, "Superseding previous run");
                previous.cancel();
            }
        }

        RunHandle { scope, id, token }
    }

    /// Deregister a finished run unless a newer run already replaced it
    pub async fn finish(&self, handle: &RunHandle) {
        if let Some(scope) = &handle.scope {
            let mut active = self.active.write().await;
            if active.get(scope).is_some_and(|(id, _)| *id == handle.id) {
                active.remove(scope);
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Cancel every active run (shutdown)
    pub async fn cancel_all(&self) {
        let mut active = self.active.write().await;
        for (_, (_, token)) in active.drain() {
            token.cancel();
        }
    }
}
