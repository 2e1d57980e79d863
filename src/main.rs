use eyedro_monitor::{
    validate_input, CoordinatorState, EyedroConfig, EyedroRegistry, EyedroSensor,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Eyedro monitor");
    let config = EyedroConfig::from_env()?;
    info!(
        "Device {} (envelope {}, scan interval {:?}, timeout {:?})",
        config.unique_id(),
        config.envelope(),
        config.scan_interval(),
        config.timeout()
    );

    let title = validate_input(&config).await?;
    let mut registry = EyedroRegistry::new();
    let coordinator = registry.setup_entry(config.clone()).await?;
    let sensors = EyedroSensor::for_device(&config.host().to_string(), &coordinator);
    info!("{title} ready with {} sensors", sensors.len());

    let mut updates = coordinator.subscribe();
    publish(&sensors, &updates.borrow_and_update().clone());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Coordinator went away, stopping");
                    break;
                }
                let state = updates.borrow_and_update().clone();
                publish(&sensors, &state);
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    registry.unload_all().await;
    Ok(())
}

fn publish(sensors: &[EyedroSensor], state: &CoordinatorState) {
    if !state.last_update_success {
        if let Some(failure) = &state.last_failure {
            warn!(
                "Device unavailable ({} failed polls): {}",
                state.consecutive_failures, failure.reason
            );
        }
    }
    for sensor in sensors {
        match serde_json::to_string(&sensor.state_from(state)) {
            Ok(json) => info!("{json}"),
            Err(e) => warn!("Failed to serialise {}: {e}", sensor.unique_id()),
        }
    }
}
