use crate::device_response::DeviceSnapshot;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub total_power_kw: f64,
    pub total_current_a: f64,
    pub average_voltage_v: f64,
    pub average_power_factor_pct: f64,
}

pub fn reduce(snapshot: &DeviceSnapshot) -> DerivedMetrics {
    DerivedMetrics {
        total_power_kw: total_power_kw(snapshot),
        total_current_a: total_current_a(snapshot),
        average_voltage_v: average_voltage_v(snapshot),
        average_power_factor_pct: average_power_factor_pct(snapshot),
    }
}

/// `None` until a first snapshot has been captured.
pub fn reduce_latest(snapshot: Option<&DeviceSnapshot>) -> Option<DerivedMetrics> {
    snapshot.map(reduce)
}

pub fn total_power_kw(snapshot: &DeviceSnapshot) -> f64 {
    scale(snapshot.sum(|c| c.power), 1000.0, 3)
}

pub fn total_current_a(snapshot: &DeviceSnapshot) -> f64 {
    scale(snapshot.sum(|c| c.current), 1000.0, 3)
}

// Centivolts summed, then / 200 (average of two, / 100)
pub fn average_voltage_v(snapshot: &DeviceSnapshot) -> f64 {
    scale(snapshot.sum(|c| c.voltage), 200.0, 2)
}

// Milli-units summed, then / 20 (average of two, / 10 for percent)
pub fn average_power_factor_pct(snapshot: &DeviceSnapshot) -> f64 {
    scale(snapshot.sum(|c| c.power_factor), 20.0, 2)
}

fn scale(sum: i128, divisor: f64, decimals: usize) -> f64 {
    round_to(sum as f64 / divisor, decimals)
}

// Rounds the exact binary value, ties to even: 116.825 is stored slightly above and becomes 116.83
fn round_to(value: f64, decimals: usize) -> f64 {
    format!("{value:.decimals$}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_response::ChannelReading;

    fn snapshot(c0: [i64; 4], c1: [i64; 4]) -> DeviceSnapshot {
        let reading = |[power_factor, voltage, current, power]: [i64; 4]| ChannelReading {
            power_factor,
            voltage,
            current,
            power,
        };
        DeviceSnapshot::new(reading(c0), reading(c1))
    }

    #[test]
    fn test_reference_payload() {
        let metrics = reduce(&snapshot([988, 11665, 11800, 1360], [975, 11700, 10500, 1225]));
        assert_eq!(metrics.total_power_kw, 2.585);
        assert_eq!(metrics.total_current_a, 22.3);
        // 23365 / 200 = 116.825 before rounding to two places
        assert_eq!(metrics.average_voltage_v, 116.83);
        assert_eq!(metrics.average_power_factor_pct, 98.15);
    }

    #[test]
    fn test_idle_device() {
        let metrics = reduce(&snapshot([1000, 12000, 0, 0], [1000, 12000, 0, 0]));
        assert_eq!(metrics.total_power_kw, 0.0);
        assert_eq!(metrics.total_current_a, 0.0);
        assert_eq!(metrics.average_voltage_v, 120.0);
        assert_eq!(metrics.average_power_factor_pct, 100.0);
    }

    #[test]
    fn test_reduce_is_repeatable() {
        let s = snapshot([988, 11665, 11800, 1360], [975, 11700, 10500, 1225]);
        assert_eq!(reduce(&s), reduce(&s));
    }

    #[test]
    fn test_rounding_places() {
        let metrics = reduce(&snapshot([1, 1, 1, 1], [0, 0, 0, 0]));
        assert_eq!(metrics.total_power_kw, 0.001);
        assert_eq!(metrics.total_current_a, 0.001);
        // 1 / 200 = 0.005 rounds below the second decimal
        assert_eq!(metrics.average_voltage_v, 0.01);
        assert_eq!(metrics.average_power_factor_pct, 0.05);

        let metrics = reduce(&snapshot([999, 12001, 1, 1], [1000, 12000, 0, 1]));
        assert_eq!(metrics.total_power_kw, 0.002);
        assert_eq!(metrics.average_voltage_v, 120.0);
        assert_eq!(metrics.average_power_factor_pct, 99.95);
    }

    #[test]
    fn test_negative_power_is_summed() {
        let metrics = reduce(&snapshot([1000, 12000, 500, -1500], [1000, 12000, 500, 250]));
        assert_eq!(metrics.total_power_kw, -1.25);
    }

    #[test]
    fn test_reduce_latest_without_snapshot() {
        assert_eq!(reduce_latest(None), None);
        let s = snapshot([1000, 12000, 0, 0], [1000, 12000, 0, 0]);
        assert_eq!(reduce_latest(Some(&s)), Some(reduce(&s)));
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        let metrics = reduce(&snapshot(
            [i64::MAX, i64::MAX, i64::MIN, i64::MAX],
            [1, 1, -1, 1],
        ));
        assert_eq!(metrics.total_power_kw, 9223372036854775.808_f64);
        assert!(metrics.total_current_a < 0.0);
        assert!(metrics.average_voltage_v.is_finite());
        assert!(metrics.average_power_factor_pct > 0.0);
    }

    #[test]
    fn test_extreme_payload_normalizes_and_reduces() {
        let raw = serde_json::json!({"data": [[1000, 12000, 0, i64::MAX], [1000, 12000, 0, 1]]});
        let snapshot = crate::device_response::normalize(&raw, crate::Envelope::Flat).unwrap();
        let metrics = reduce(&snapshot);
        assert!(metrics.total_power_kw > 9.2e15);
        assert_eq!(metrics.average_voltage_v, 120.0);
    }
}
