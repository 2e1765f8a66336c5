use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tracing::{debug, trace, warn};

use super::NetworkDiscovery;
use crate::app::error::AppError;
use crate::app::models::DiscoveryCandidate;

/// mDNS/DNS-SD browser. The daemon is started on first use and shut down on drop.
#[derive(Default)]
pub struct MdnsDiscovery {
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl MdnsDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    fn daemon(&self, trace_id: &str) -> Result<ServiceDaemon, AppError> {
        let mut guard = self
            .daemon
            .lock()
            .map_err(|_| AppError::system("mDNS daemon registry locked", trace_id))?;
        if let Some(daemon) = guard.as_ref() {
            return Ok(daemon.clone());
        }
        let daemon = ServiceDaemon::new().map_err(|err| {
            AppError::system(format!("Failed to start mDNS daemon: {err}"), trace_id)
        })?;
        *guard = Some(daemon.clone());
        Ok(daemon)
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.daemon.lock() {
            if let Some(daemon) = guard.take() {
                let _ = daemon.shutdown();
            }
        }
    }
}

#[async_trait]
impl NetworkDiscovery for MdnsDiscovery {
    async fn query(
        &self,
        service_type: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<DiscoveryCandidate>, AppError> {
        let daemon = self.daemon(trace_id)?;
        let service_type = service_type.to_string();
        let trace = trace_id.to_string();
        tokio::task::spawn_blocking(move || browse_once(&daemon, &service_type, timeout, &trace))
            .await
            .map_err(|err| AppError::system(format!("mDNS query task failed: {err}"), trace_id))?
    }
}

/// Collects every record resolved within `timeout`, then stops browsing.
fn browse_once(
    daemon: &ServiceDaemon,
    service_type: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<DiscoveryCandidate>, AppError> {
    let receiver = daemon.browse(service_type).map_err(|err| {
        AppError::system(format!("Failed to browse {service_type}: {err}"), trace_id)
    })?;

    let deadline = Instant::now() + timeout;
    let mut candidates = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
                match candidate_from(&addresses, info.get_port()) {
                    Some(candidate) => {
                        debug!(
                            trace_id = %trace_id,
                            fullname = %info.get_fullname(),
                            target = %candidate.target(),
                            "pairing service resolved"
                        );
                        if !candidates.contains(&candidate) {
                            candidates.push(candidate);
                        }
                    }
                    None => trace!(trace_id = %trace_id, "resolved record has no usable address"),
                }
            }
            Ok(other) => trace!(trace_id = %trace_id, event = ?other, "mDNS event"),
            Err(_) => break,
        }
    }

    if let Err(err) = daemon.stop_browse(service_type) {
        warn!(trace_id = %trace_id, error = %err, "failed to stop mDNS browse");
    }
    Ok(candidates)
}

/// Skips loopback and prefers IPv4.
pub fn candidate_from(addresses: &[IpAddr], port: u16) -> Option<DiscoveryCandidate> {
    let mut usable: Vec<&IpAddr> = addresses.iter().filter(|ip| !ip.is_loopback()).collect();
    usable.sort_by_key(|ip| (ip.is_ipv6(), **ip));
    usable.first().map(|ip| DiscoveryCandidate {
        address: ip.to_string(),
        port,
    })
}
