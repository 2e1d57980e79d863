use crate::error::ParseError;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// Positions inside one channel array: [power_factor, voltage, current, power, factory-only]
const IDX_POWER_FACTOR: usize = 0;
const IDX_VOLTAGE: usize = 1;
const IDX_CURRENT: usize = 2;
const IDX_POWER: usize = 3;
const CHANNEL_FIELDS: usize = 4;
const CHANNEL_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// milli-units, 988 = 0.988
    pub power_factor: i64,
    /// centivolts, 11665 = 116.65 V
    pub voltage: i64,
    /// milliamps, 11800 = 11.8 A
    pub current: i64,
    /// watts
    pub power: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub channels: [ChannelReading; CHANNEL_COUNT],
}

impl DeviceSnapshot {
    pub fn new(channel_0: ChannelReading, channel_1: ChannelReading) -> Self {
        Self {
            channels: [channel_0, channel_1],
        }
    }

    /// Adds up one field over both channels, widened so any pair of i64 fits.
    pub fn sum(&self, field: impl Fn(&ChannelReading) -> i64) -> i128 {
        self.channels.iter().map(|c| i128::from(field(c))).sum()
    }
}

/// Outer JSON structure wrapping the channel array.
///
/// The official getdata API answers with `{"data": [...]}`; some firmware
/// builds have been seen wrapping it as `{"response": {"data": [...]}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    #[default]
    Flat,
    Nested,
}

impl Envelope {
    pub fn data_path(&self) -> &'static str {
        match self {
            Envelope::Flat => "data",
            Envelope::Nested => "response.data",
        }
    }

    pub fn unwrap_data<'a>(&self, root: &'a Value) -> Result<&'a Value, ParseError> {
        let object = root.as_object().ok_or(ParseError::NotAnObject)?;
        let missing = ParseError::MissingData {
            path: self.data_path(),
        };
        match self {
            Envelope::Flat => object.get("data").ok_or(missing),
            Envelope::Nested => object
                .get("response")
                .and_then(Value::as_object)
                .and_then(|response| response.get("data"))
                .ok_or(missing),
        }
    }
}

impl FromStr for Envelope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Envelope::Flat),
            "nested" => Ok(Envelope::Nested),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Flat => write!(f, "flat"),
            Envelope::Nested => write!(f, "nested"),
        }
    }
}

/// Validates a raw getdata response and extracts the first two channels.
pub fn normalize(root: &Value, envelope: Envelope) -> Result<DeviceSnapshot, ParseError> {
    let data = envelope.unwrap_data(root)?;
    let entries = data.as_array().ok_or(ParseError::DataNotArray {
        path: envelope.data_path(),
    })?;

    if entries.len() < CHANNEL_COUNT {
        return Err(ParseError::InsufficientChannels {
            found: entries.len(),
        });
    }

    let channel_0 = parse_channel(0, &entries[0])?;
    let channel_1 = parse_channel(1, &entries[1])?;
    Ok(DeviceSnapshot::new(channel_0, channel_1))
}

fn parse_channel(index: usize, entry: &Value) -> Result<ChannelReading, ParseError> {
    let malformed = |reason: String| ParseError::MalformedChannel { index, reason };

    let fields = entry
        .as_array()
        .ok_or_else(|| malformed(format!("expected an array, got {}", json_type(entry))))?;
    if fields.len() < CHANNEL_FIELDS {
        return Err(malformed(format!(
            "expected at least {CHANNEL_FIELDS} elements, got {}",
            fields.len()
        )));
    }

    let field = |position: usize| {
        fields[position].as_i64().ok_or_else(|| {
            malformed(format!(
                "element {position} is not an integer: {}",
                fields[position]
            ))
        })
    };

    Ok(ChannelReading {
        power_factor: field(IDX_POWER_FACTOR)?,
        voltage: field(IDX_VOLTAGE)?,
        current: field(IDX_CURRENT)?,
        power: field(IDX_POWER)?,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
