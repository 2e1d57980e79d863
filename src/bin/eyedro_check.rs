//! Queries an Eyedro device once and checks its getdata response against the
//! format the monitor expects.
//!
//! ```text
//! eyedro_check 192.168.2.66
//! eyedro_check 192.168.2.66 8080 --envelope nested
//! ```

use anyhow::Context;
use clap::Parser;
use eyedro_monitor::config::{parse_host, DEFAULT_PORT, DEFAULT_TIMEOUT};
use eyedro_monitor::{metrics, normalize, Envelope, EyedroAPI};
use serde_json::Value;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "eyedro_check")]
#[command(version, about = "Validate the getdata response of an Eyedro device", long_about = None)]
struct Cli {
    /// IP address of the device, e.g. 192.168.2.66
    host: String,

    /// HTTP port of the device
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Response envelope: flat ({"data": ...}) or nested ({"response": {"data": ...}})
    #[arg(short, long, default_value = "flat", value_parser = parse_envelope)]
    envelope: Envelope,
}

fn parse_envelope(s: &str) -> Result<Envelope, String> {
    s.parse()
        .map_err(|other| format!("unknown envelope '{other}', expected 'flat' or 'nested'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let host = parse_host(&cli.host)?;
    let api = EyedroAPI::new(host, cli.port, Duration::from_secs(cli.timeout))?;
    println!("Testing Eyedro API at: {}", api.url());
    println!("{}", "-".repeat(60));

    let json = api
        .fetch_raw()
        .await
        .context("✗ ERROR: Failed to query device")?;
    println!("✓ Successfully received response");
    println!();

    check_response(&json, cli.envelope);

    println!();
    println!("{}", "=".repeat(60));
    println!("Raw JSON response:");
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Walks the response step by step, reporting every problem it finds.
fn check_response(json: &Value, envelope: Envelope) {
    println!("Validating response structure...");
    let data = match envelope.unwrap_data(json) {
        Ok(data) => data,
        Err(e) => {
            println!("✗ ERROR: {e}");
            if let Some(object) = json.as_object() {
                let keys: Vec<&String> = object.keys().collect();
                println!("  Response keys: {keys:?}");
            }
            return;
        }
    };
    println!("✓ Response has '{}' key", envelope.data_path());

    let Some(channels) = data.as_array() else {
        println!("✗ ERROR: '{}' is not a list", envelope.data_path());
        return;
    };
    println!("✓ '{}' is a list with {} channel(s)", envelope.data_path(), channels.len());
    if channels.is_empty() {
        println!("✗ ERROR: '{}' list is empty", envelope.data_path());
        return;
    }
    if channels.len() < 2 {
        println!("⚠ WARNING: Only one channel found (expected 2 for EYEFI-2)");
    }

    println!();
    println!("Channel data validation:");
    for (index, channel) in channels.iter().enumerate() {
        print_channel(index, channel);
    }

    match normalize(json, envelope) {
        Ok(snapshot) => {
            let derived = metrics::reduce(&snapshot);
            println!();
            println!("Calculated sensor values:");
            println!(
                "  Total Power: {}W = {:.3}kW",
                snapshot.sum(|c| c.power),
                derived.total_power_kw
            );
            println!(
                "  Total Current: {}mA = {:.3}A",
                snapshot.sum(|c| c.current),
                derived.total_current_a
            );
            println!(
                "  Average Voltage: {}cV / 200 = {:.2}V",
                snapshot.sum(|c| c.voltage),
                derived.average_voltage_v
            );
            println!(
                "  Average Power Factor: {}mu / 20 = {:.2}%",
                snapshot.sum(|c| c.power_factor),
                derived.average_power_factor_pct
            );
        }
        Err(e) => {
            println!();
            println!("✗ ERROR: Response would be rejected: {e}");
        }
    }
}

fn print_channel(index: usize, channel: &Value) {
    println!();
    println!("  Channel {index}:");
    let Some(fields) = channel.as_array() else {
        println!("    ✗ ERROR: Channel {index} data is not a list");
        return;
    };
    println!("    ✓ Is a list with {} element(s)", fields.len());
    if fields.len() < 4 {
        println!("    ✗ ERROR: Channel {index} has fewer than 4 elements (need at least 4)");
        return;
    }

    let number = |position: usize| fields[position].as_f64();
    match (number(0), number(1), number(2), number(3)) {
        (Some(power_factor), Some(voltage), Some(current), Some(power)) => {
            println!(
                "    [0] Power Factor: {} (milli-units, {:.1}%)",
                fields[0],
                power_factor / 10.0
            );
            println!(
                "    [1] Voltage: {} (centivolts, {:.2}V)",
                fields[1],
                voltage / 100.0
            );
            println!(
                "    [2] Current: {} (milliamps, {:.3}A)",
                fields[2],
                current / 1000.0
            );
            println!(
                "    [3] Power: {} (watts, {:.3}kW)",
                fields[3],
                power / 1000.0
            );
        }
        _ => println!("    ✗ ERROR: Channel {index} has non-numeric values in its first 4 elements"),
    }
    if let Some(ignored) = fields.get(4) {
        println!("    [4] Ignored field: {ignored}");
    }
}
