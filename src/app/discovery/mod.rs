pub mod mdns;

#[cfg(test)]
pub mod fake;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::config::DiscoverySettings;
use crate::app::error::AppError;
use crate::app::models::{DiscoveryCandidate, PairingSession};
use crate::app::pairing::{PairingCredential, PairingInitiator};

const ERROR_BACKOFF_MAX_MS: u64 = 5_000;

/// One bounded local-network query for advertisements of `service_type`.
/// An empty result is the normal "nothing yet" answer.
#[async_trait]
pub trait NetworkDiscovery: Send + Sync {
    async fn query(
        &self,
        service_type: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<DiscoveryCandidate>, AppError>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    Paired { candidate: DiscoveryCandidate },
    PairingFailed { candidate: DiscoveryCandidate, cause: String },
    Stopped,
}

struct DiscoverySession {
    active: Arc<AtomicBool>,
    superseded: Arc<AtomicBool>,
    join: Option<JoinHandle<DiscoveryOutcome>>,
}

/// Single-shot search for a device advertising wireless-debug pairing.
///
/// `stop()` only clears the session flag: the query in flight finishes and the loop exits at its
/// next flag check, so no new query is issued afterwards.
pub struct DiscoveryLoop {
    discovery: Arc<dyn NetworkDiscovery>,
    pairing: Arc<PairingInitiator>,
    settings: DiscoverySettings,
    session: Mutex<Option<DiscoverySession>>,
}

impl DiscoveryLoop {
    pub fn new(
        discovery: Arc<dyn NetworkDiscovery>,
        pairing: Arc<PairingInitiator>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            discovery,
            pairing,
            settings,
            session: Mutex::new(None),
        }
    }

    /// Starts a fresh session, stopping any session still searching.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, trace_id: &str) -> Result<PairingSession, AppError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::system("Discovery requires an async runtime", trace_id))?;
        let mut guard = self
            .session
            .lock()
            .map_err(|_| AppError::system("Discovery session locked", trace_id))?;

        if let Some(previous) = guard.take() {
            // A superseded session may still finish its in-flight query but never pairs.
            previous.superseded.store(true, Ordering::SeqCst);
            if previous.active.swap(false, Ordering::SeqCst) {
                info!(trace_id = %trace_id, "superseding active pairing discovery");
            }
        }

        let credential = PairingCredential::generate();
        let session = PairingSession {
            network_name: credential.network_name.clone(),
            descriptor: credential.descriptor(),
        };

        let active = Arc::new(AtomicBool::new(true));
        let superseded = Arc::new(AtomicBool::new(false));
        let join = runtime.spawn(search(
            Arc::clone(&self.discovery),
            Arc::clone(&self.pairing),
            self.settings.clone(),
            credential,
            Arc::clone(&active),
            Arc::clone(&superseded),
            trace_id.to_string(),
        ));
        *guard = Some(DiscoverySession {
            active,
            superseded,
            join: Some(join),
        });

        info!(
            trace_id = %trace_id,
            network_name = %session.network_name,
            service_type = %self.settings.service_type,
            "pairing discovery started"
        );
        Ok(session)
    }

    /// Returns whether a searching session was asked to stop.
    pub fn stop(&self) -> bool {
        let Ok(guard) = self.session.lock() else {
            return false;
        };
        match guard.as_ref() {
            Some(session) => session.active.swap(false, Ordering::SeqCst),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session
            .lock()
            .ok()
            .and_then(|guard| {
                guard
                    .as_ref()
                    .map(|session| session.active.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }

    /// Waits for the current session to end. `None` when there is nothing to wait for.
    pub async fn wait(&self) -> Option<DiscoveryOutcome> {
        let join = {
            let mut guard = self.session.lock().ok()?;
            guard.as_mut().and_then(|session| session.join.take())?
        };
        match join.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(error = %err, "pairing discovery task ended abnormally");
                None
            }
        }
    }
}

async fn search(
    discovery: Arc<dyn NetworkDiscovery>,
    pairing: Arc<PairingInitiator>,
    settings: DiscoverySettings,
    credential: PairingCredential,
    active: Arc<AtomicBool>,
    superseded: Arc<AtomicBool>,
    trace_id: String,
) -> DiscoveryOutcome {
    let timeout = settings.query_timeout();
    let mut backoff_ms = settings.error_backoff_ms;
    let mut queries = 0u64;

    let outcome = loop {
        if !active.load(Ordering::SeqCst) {
            break DiscoveryOutcome::Stopped;
        }
        queries += 1;
        match discovery
            .query(&settings.service_type, timeout, &trace_id)
            .await
        {
            Ok(candidates) => {
                backoff_ms = settings.error_backoff_ms;
                // First advertisement only; the session does not fan out.
                let Some(candidate) = candidates.into_iter().next() else {
                    debug!(trace_id = %trace_id, queries, "no pairing advertisement yet");
                    continue;
                };
                if superseded.load(Ordering::SeqCst) {
                    info!(
                        trace_id = %trace_id,
                        target = %candidate.target(),
                        "dropping advertisement found by a superseded session"
                    );
                    break DiscoveryOutcome::Stopped;
                }
                info!(
                    trace_id = %trace_id,
                    target = %candidate.target(),
                    queries,
                    "pairing advertisement found"
                );
                break match pairing.pair(&candidate, &credential, &trace_id).await {
                    Ok(()) => DiscoveryOutcome::Paired { candidate },
                    Err(err) => DiscoveryOutcome::PairingFailed {
                        candidate,
                        cause: err.error,
                    },
                };
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, backoff_ms, "discovery query failed");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(ERROR_BACKOFF_MAX_MS);
            }
        }
    };

    active.store(false, Ordering::SeqCst);
    info!(trace_id = %trace_id, outcome = ?outcome, queries, "pairing discovery finished");
    outcome
}
