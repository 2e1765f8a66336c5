use std::sync::{Arc, RwLock};

use tracing::info;

use crate::app::adb::client::DeviceClient;
use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::adb::runner::{CommandRunner, ProcessRunner};
use crate::app::bootstrap::RemoteBootstrapper;
use crate::app::config::AppConfig;
use crate::app::discovery::mdns::MdnsDiscovery;
use crate::app::discovery::{DiscoveryLoop, NetworkDiscovery};
use crate::app::error::AppError;
use crate::app::forward::ForwardManager;
use crate::app::pairing::PairingInitiator;

/// Everything that exists once the device client is initialized.
pub struct LinkServices {
    pub adb_program: String,
    pub client: Arc<DeviceClient>,
    pub forwards: Arc<ForwardManager>,
    pub bootstrapper: RemoteBootstrapper,
    pub discovery: DiscoveryLoop,
}

impl LinkServices {
    pub fn build(
        config: &AppConfig,
        runner: Arc<dyn CommandRunner>,
        network: Arc<dyn NetworkDiscovery>,
    ) -> Self {
        let adb_program = runner.program().to_string();
        let client = Arc::new(DeviceClient::new(runner, &config.adb));
        let forwards = Arc::new(ForwardManager::new(
            Arc::clone(&client),
            config.forward.settle_delay(),
        ));
        let bootstrapper = RemoteBootstrapper::new(
            Arc::clone(&client),
            Arc::clone(&forwards),
            config.companion.clone(),
            config.forward.spec(),
        );
        let discovery = DiscoveryLoop::new(
            network,
            Arc::new(PairingInitiator::new(Arc::clone(&client))),
            config.discovery.clone(),
        );
        Self {
            adb_program,
            client,
            forwards,
            bootstrapper,
            discovery,
        }
    }
}

/// Process-wide state, created once by the hosting surface.
#[derive(Default)]
pub struct AppState {
    services: RwLock<Option<Arc<LinkServices>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves and validates the adb binary, then wires the production collaborators.
    pub fn initialize(&self, config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
        let program = resolve_adb_program(&config.adb);
        validate_adb_program(&program).map_err(|message| AppError::validation(message, trace_id))?;
        self.initialize_with(
            config,
            Arc::new(ProcessRunner::new(program)),
            Arc::new(MdnsDiscovery::new()),
            trace_id,
        )
    }

    pub fn initialize_with(
        &self,
        config: &AppConfig,
        runner: Arc<dyn CommandRunner>,
        network: Arc<dyn NetworkDiscovery>,
        trace_id: &str,
    ) -> Result<(), AppError> {
        let services = Arc::new(LinkServices::build(config, runner, network));
        let mut guard = self
            .services
            .write()
            .map_err(|_| AppError::system("Application state locked", trace_id))?;
        if let Some(previous) = guard.replace(Arc::clone(&services)) {
            previous.discovery.stop();
        }
        info!(trace_id = %trace_id, adb_program = %services.adb_program, "device client initialized");
        Ok(())
    }

    pub fn services(&self, trace_id: &str) -> Result<Arc<LinkServices>, AppError> {
        let guard = self
            .services
            .read()
            .map_err(|_| AppError::system("Application state locked", trace_id))?;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| AppError::transport_unavailable(trace_id))
    }

    pub fn is_initialized(&self) -> bool {
        self.services
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
