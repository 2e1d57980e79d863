use crate::metrics;
use crate::update_coordinator::{CoordinatorState, EyedroCoordinator};
use serde_derive::{Deserialize, Serialize};

pub const DOMAIN: &str = "eyedro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    TotalPower,
    TotalCurrent,
    AverageVoltage,
    AveragePowerFactor,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::TotalPower,
        SensorKind::TotalCurrent,
        SensorKind::AverageVoltage,
        SensorKind::AveragePowerFactor,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            SensorKind::TotalPower => "total_power",
            SensorKind::TotalCurrent => "total_current",
            SensorKind::AverageVoltage => "average_voltage",
            SensorKind::AveragePowerFactor => "average_power_factor",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::TotalPower => "Eyedro Total Power",
            SensorKind::TotalCurrent => "Eyedro Total Current",
            SensorKind::AverageVoltage => "Eyedro Average Voltage",
            SensorKind::AveragePowerFactor => "Eyedro Average Power Factor",
        }
    }

    pub fn unit_of_measurement(&self) -> &'static str {
        match self {
            SensorKind::TotalPower => "kW",
            SensorKind::TotalCurrent => "A",
            SensorKind::AverageVoltage => "V",
            SensorKind::AveragePowerFactor => "%",
        }
    }

    pub fn device_class(&self) -> &'static str {
        match self {
            SensorKind::TotalPower => "power",
            SensorKind::TotalCurrent => "current",
            SensorKind::AverageVoltage => "voltage",
            SensorKind::AveragePowerFactor => "power_factor",
        }
    }

    pub fn state_class(&self) -> &'static str {
        "measurement"
    }

    /// `None` while no snapshot has been captured yet.
    pub fn native_value(&self, state: &CoordinatorState) -> Option<f64> {
        let snapshot = state.snapshot.as_ref()?;
        Some(match self {
            SensorKind::TotalPower => metrics::total_power_kw(snapshot),
            SensorKind::TotalCurrent => metrics::total_current_a(snapshot),
            SensorKind::AverageVoltage => metrics::average_voltage_v(snapshot),
            SensorKind::AveragePowerFactor => metrics::average_power_factor_pct(snapshot),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub unique_id: String,
    pub name: String,
    pub state: Option<f64>,
    pub available: bool,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
}

#[derive(Clone)]
pub struct EyedroSensor {
    kind: SensorKind,
    unique_id: String,
    coordinator: EyedroCoordinator,
}

impl EyedroSensor {
    pub fn new(kind: SensorKind, host: &str, coordinator: EyedroCoordinator) -> Self {
        Self {
            kind,
            unique_id: format!("{DOMAIN}_{host}_{}", kind.key()),
            coordinator,
        }
    }

    pub fn for_device(host: &str, coordinator: &EyedroCoordinator) -> Vec<EyedroSensor> {
        SensorKind::ALL
            .iter()
            .map(|kind| EyedroSensor::new(*kind, host, coordinator.clone()))
            .collect()
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn native_value(&self) -> Option<f64> {
        self.kind.native_value(&self.coordinator.state())
    }

    /// Unavailable after a failed poll, until the next success.
    pub fn available(&self) -> bool {
        self.coordinator.is_available()
    }

    pub fn state(&self) -> SensorState {
        self.state_from(&self.coordinator.state())
    }

    pub fn state_from(&self, state: &CoordinatorState) -> SensorState {
        SensorState {
            unique_id: self.unique_id.clone(),
            name: self.kind.name().to_string(),
            state: self.kind.native_value(state),
            available: state.last_update_success,
            unit_of_measurement: self.kind.unit_of_measurement().to_string(),
            device_class: self.kind.device_class().to_string(),
            state_class: self.kind.state_class().to_string(),
        }
    }
}
