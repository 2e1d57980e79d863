use crate::config::{validate_scan_interval, EyedroConfig};
use crate::error::{ParseError, SetupError};
use crate::eyedro_api::EyedroAPI;
use crate::update_coordinator::{CoordinatorHandle, EyedroCoordinator};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Checks that the configured device answers with a data array and returns
/// the title for the new entry.
pub async fn validate_input(config: &EyedroConfig) -> Result<String, SetupError> {
    let api = EyedroAPI::from_config(config).map_err(SetupError::CannotConnect)?;
    let raw = api.fetch_raw().await.map_err(SetupError::CannotConnect)?;

    let envelope = config.envelope();
    let data = envelope
        .unwrap_data(&raw)
        .map_err(SetupError::InvalidResponse)?;
    if !data.is_array() {
        return Err(SetupError::InvalidResponse(ParseError::DataNotArray {
            path: envelope.data_path(),
        }));
    }
    Ok(config.title())
}

async fn start(config: &EyedroConfig) -> Result<CoordinatorHandle, SetupError> {
    let api = EyedroAPI::from_config(config).map_err(SetupError::CannotConnect)?;
    let coordinator = EyedroCoordinator::new(api, config.envelope(), config.scan_interval());
    coordinator
        .first_refresh()
        .await
        .map_err(SetupError::NotReady)?;

    let handle = coordinator.spawn();
    info!(
        "Set up {} polling every {:?}",
        config.title(),
        config.scan_interval()
    );
    Ok(handle)
}

struct Entry {
    config: EyedroConfig,
    handle: CoordinatorHandle,
}

/// Running device instances keyed by `host:port`.
#[derive(Default)]
pub struct EyedroRegistry {
    entries: HashMap<String, Entry>,
}

impl EyedroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device: fetches the first snapshot, then starts polling.
    /// Nothing is registered if the first refresh fails.
    pub async fn setup_entry(
        &mut self,
        config: EyedroConfig,
    ) -> Result<EyedroCoordinator, SetupError> {
        let id = config.unique_id();
        if self.entries.contains_key(&id) {
            return Err(SetupError::AlreadyConfigured(id));
        }

        let handle = start(&config).await?;
        let coordinator = handle.coordinator().clone();
        self.entries.insert(id, Entry { config, handle });
        Ok(coordinator)
    }

    pub fn update_options(&mut self, id: &str, scan_interval: Duration) -> Result<(), SetupError> {
        let scan_interval = validate_scan_interval(scan_interval)?;
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| SetupError::NotFound(id.to_string()))?;

        entry.config = entry.config.clone().with_scan_interval(scan_interval)?;
        entry.handle.coordinator().set_update_interval(scan_interval);
        info!("{id}: scan interval set to {scan_interval:?}");
        Ok(())
    }

    /// Points an existing entry at a new host and port, keeping its other settings.
    /// The old entry keeps running unless the new device passes its first refresh.
    pub async fn reconfigure(
        &mut self,
        id: &str,
        host: &str,
        port: u16,
    ) -> Result<EyedroCoordinator, SetupError> {
        let current = self
            .entries
            .get(id)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| SetupError::NotFound(id.to_string()))?;

        let config = EyedroConfig::new(host)?
            .with_port(port)?
            .with_scan_interval(current.scan_interval())?
            .with_timeout(current.timeout())
            .with_envelope(current.envelope());
        let new_id = config.unique_id();
        if new_id != id && self.entries.contains_key(&new_id) {
            return Err(SetupError::AlreadyConfigured(new_id));
        }
        validate_input(&config).await?;
        let handle = start(&config).await?;

        self.unload_entry(id).await?;
        let coordinator = handle.coordinator().clone();
        self.entries.insert(new_id, Entry { config, handle });
        Ok(coordinator)
    }

    pub async fn unload_entry(&mut self, id: &str) -> Result<(), SetupError> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| SetupError::NotFound(id.to_string()))?;
        entry.handle.shutdown().await;
        info!("Unloaded {}", entry.config.title());
        Ok(())
    }

    pub async fn unload_all(&mut self) {
        let ids: Vec<String> = self.entries.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload_entry(&id).await {
                warn!("Failed to unload {id}: {e}");
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&EyedroCoordinator> {
        self.entries.get(id).map(|entry| entry.handle.coordinator())
    }

    pub fn config(&self, id: &str) -> Option<&EyedroConfig> {
        self.entries.get(id).map(|entry| &entry.config)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_response::Envelope;

    const GOOD_BODY: &str = r#"{"data": [[988, 11665, 11800, 1360], [975, 11700, 10500, 1225]]}"#;

    fn config_for(server: &mockito::ServerGuard) -> EyedroConfig {
        let addr = server.socket_address();
        EyedroConfig::new(&addr.ip().to_string())
            .unwrap()
            .with_port(addr.port())
            .unwrap()
            .with_timeout(Duration::from_secs(2))
    }

    async fn serving(body: &str) -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/getdata")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn test_validate_input() {
        let server = serving(GOOD_BODY).await;
        let config = config_for(&server);
        assert_eq!(validate_input(&config).await.unwrap(), "Eyedro 127.0.0.1");

        let nested = config.with_envelope(Envelope::Nested);
        assert!(matches!(
            validate_input(&nested).await.unwrap_err(),
            SetupError::InvalidResponse(ParseError::MissingData { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_input_rejects_non_array_data() {
        let server = serving(r#"{"data": "nope"}"#).await;
        assert!(matches!(
            validate_input(&config_for(&server)).await.unwrap_err(),
            SetupError::InvalidResponse(ParseError::DataNotArray { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_input_cannot_connect() {
        let config = EyedroConfig::new("127.0.0.1")
            .unwrap()
            .with_port(9)
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        assert!(matches!(
            validate_input(&config).await.unwrap_err(),
            SetupError::CannotConnect(_)
        ));
    }

    #[tokio::test]
    async fn test_setup_and_unload() {
        let server = serving(GOOD_BODY).await;
        let config = config_for(&server);
        let id = config.unique_id();
        let mut registry = EyedroRegistry::new();

        let coordinator = registry.setup_entry(config.clone()).await.unwrap();
        assert_eq!(coordinator.total_power_kw(), Some(2.585));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());

        assert!(matches!(
            registry.setup_entry(config).await.unwrap_err(),
            SetupError::AlreadyConfigured(dup) if dup == id
        ));

        registry.unload_entry(&id).await.unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.unload_entry(&id).await.unwrap_err(),
            SetupError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_setup_fails_when_first_refresh_fails() {
        let server = serving(r#"{"data": [[988, 11665]]}"#).await;
        let mut registry = EyedroRegistry::new();

        let err = registry.setup_entry(config_for(&server)).await.unwrap_err();
        assert!(matches!(err, SetupError::NotReady(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_update_options() {
        let server = serving(GOOD_BODY).await;
        let config = config_for(&server);
        let id = config.unique_id();
        let mut registry = EyedroRegistry::new();
        registry.setup_entry(config).await.unwrap();

        registry
            .update_options(&id, Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            registry.get(&id).unwrap().update_interval(),
            Duration::from_secs(60)
        );
        assert_eq!(
            registry.config(&id).unwrap().scan_interval(),
            Duration::from_secs(60)
        );

        assert!(matches!(
            registry
                .update_options(&id, Duration::from_secs(1))
                .unwrap_err(),
            SetupError::Config(_)
        ));
        assert!(matches!(
            registry
                .update_options("10.0.0.1:8080", Duration::from_secs(60))
                .unwrap_err(),
            SetupError::NotFound(_)
        ));

        registry.unload_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reconfigure_moves_entry() {
        let old_server = serving(GOOD_BODY).await;
        let new_server = serving(r#"{"data": [[1000, 12000, 0, 0], [1000, 12000, 0, 0]]}"#).await;
        let config = config_for(&old_server)
            .with_scan_interval(Duration::from_secs(30))
            .unwrap();
        let old_id = config.unique_id();
        let mut registry = EyedroRegistry::new();
        registry.setup_entry(config).await.unwrap();

        let new_addr = new_server.socket_address();
        let coordinator = registry
            .reconfigure(&old_id, "127.0.0.1", new_addr.port())
            .await
            .unwrap();

        let new_id = format!("127.0.0.1:{}", new_addr.port());
        assert!(registry.get(&old_id).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.config(&new_id).unwrap().scan_interval(),
            Duration::from_secs(30)
        );
        assert_eq!(coordinator.average_voltage_v(), Some(120.0));

        registry.unload_all().await;
    }

    #[tokio::test]
    async fn test_failed_reconfigure_keeps_old_entry() {
        let old_server = serving(GOOD_BODY).await;
        let new_server = serving(r#"{"data": []}"#).await;
        let config = config_for(&old_server);
        let old_id = config.unique_id();
        let mut registry = EyedroRegistry::new();
        registry.setup_entry(config).await.unwrap();

        let err = registry
            .reconfigure(&old_id, "127.0.0.1", new_server.socket_address().port())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::NotReady(_)));

        assert_eq!(registry.len(), 1);
        let coordinator = registry.get(&old_id).expect("old entry should survive");
        assert!(coordinator.is_available());
        assert_eq!(coordinator.total_power_kw(), Some(2.585));

        registry.unload_all().await;
    }
}
