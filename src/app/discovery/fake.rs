//! Scripted discovery used by the test suite. Once the script runs out every query is empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::NetworkDiscovery;
use crate::app::error::AppError;
use crate::app::models::DiscoveryCandidate;

pub struct FakeDiscovery {
    latency: Duration,
    script: Mutex<VecDeque<Result<Vec<DiscoveryCandidate>, String>>>,
    queries: AtomicUsize,
}

impl FakeDiscovery {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            script: Mutex::new(VecDeque::new()),
            queries: AtomicUsize::new(0),
        })
    }

    pub fn push_result(&self, candidates: Vec<DiscoveryCandidate>) {
        self.script.lock().expect("script").push_back(Ok(candidates));
    }

    pub fn push_error(&self, message: &str) {
        self.script
            .lock()
            .expect("script")
            .push_back(Err(message.to_string()));
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkDiscovery for FakeDiscovery {
    async fn query(
        &self,
        _service_type: &str,
        _timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<DiscoveryCandidate>, AppError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        let next = self.script.lock().expect("script").pop_front();
        match next {
            Some(Ok(candidates)) => Ok(candidates),
            Some(Err(message)) => Err(AppError::system(message, trace_id)),
            None => Ok(Vec::new()),
        }
    }
}
