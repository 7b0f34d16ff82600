//! Status report decoding and the values derived from it.
//!
//! The control tool prints one `label: value` pair per line in a fixed order.
//! All positional knowledge lives in the attribute table below; nothing else
//! in the crate refers to line numbers.

use crate::error::ParseError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Separator between a label and its value on a report line.
const VALUE_DELIMITER: &str = ": ";

/// Power field value reported while the device is running.
const POWER_ON: &str = "ON";

define_attributes! {
    Name = ("name", 0),
    DeviceType = ("type", 1),
    ModelId = ("model_id", 2),
    SwVersion = ("sw_version", 3),
    FanSpeed = ("fan_speed", 4),
    State = ("state", 5),
    ChildLock = ("child_lock", 6),
    LightBrightness = ("light_brightness", 7),
    Mode = ("mode", 9),
    Function = ("function", 10),
    TargetHumidity = ("target_humidity", 11),
    Humidity = ("humidity", 12),
    Temperature = ("temperature", 13),
    Pm25 = ("pm25", 14),
    AllergenIndex = ("allergen_index", 15),
    UsedIndex = ("used_index", 17),
    Error = ("error", 19),
    WaterLevel = ("water_level", 20),
    HepaFilterType = ("hepa_filter_type", 21),
    CarbonFilterType = ("carbon_filter_type", 22),
    PreFilter = ("pre_filter", 23),
    HepaFilter = ("hepa_filter", 24),
    CarbonFilter = ("carbon_filter", 25),
    WickFilter = ("wick_filter", 26),
    Runtime = ("runtime", 28),
    DeviceId = ("device_id", 31),
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Decoded snapshot of the device-reported state.
///
/// A record is always complete: every attribute of the table is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    values: BTreeMap<Attribute, String>,
}

impl AttributeRecord {
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        self.values.get(&attr).map(String::as_str)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.get(Attribute::DeviceId).filter(|id| !id.is_empty())
    }

    /// Iterates `(key, value)` pairs in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(a, v)| (a.key(), v.as_str()))
    }

    /// Speed token derived from the mode and fan speed fields.
    pub fn speed(&self) -> SpeedState {
        derive_speed(
            self.get(Attribute::Mode).unwrap_or_default(),
            self.get(Attribute::FanSpeed).unwrap_or_default(),
        )
    }

    pub fn power(&self) -> PowerState {
        if self.get(Attribute::State) == Some(POWER_ON) {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for AttributeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (attr, value) in &self.values {
            map.serialize_entry(attr, value)?;
        }
        map.end()
    }
}

/// Decodes a full status report.
///
/// Fails on the first attribute whose line is missing or malformed; a partial
/// record is never returned.
pub fn parse(raw: &str) -> Result<AttributeRecord, ParseError> {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut values = BTreeMap::new();
    for attr in Attribute::ALL {
        let line = lines.get(attr.line()).ok_or(ParseError::Truncated {
            field: attr.key(),
            line: attr.line(),
        })?;
        let (_, value) = line
            .split_once(VALUE_DELIMITER)
            .ok_or(ParseError::MissingDelimiter {
                field: attr.key(),
                line: attr.line(),
            })?;
        values.insert(*attr, value.to_string());
    }

    Ok(AttributeRecord { values })
}

/// User-facing speed/mode token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeedState {
    Off,
    Low,
    Medium,
    High,
    Turbo,
    Allergen,
    Auto,
    Silent,
    /// The report holds a fan speed outside the known set
    Unknown,
    /// The device is not reachable
    Unavailable,
}

/// Tokens the host may select, in display order.
pub const SPEED_LIST: [SpeedState; 8] = [
    SpeedState::Off,
    SpeedState::Low,
    SpeedState::Medium,
    SpeedState::High,
    SpeedState::Turbo,
    SpeedState::Allergen,
    SpeedState::Auto,
    SpeedState::Silent,
];

impl SpeedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedState::Off => "off",
            SpeedState::Low => "low",
            SpeedState::Medium => "medium",
            SpeedState::High => "high",
            SpeedState::Turbo => "turbo",
            SpeedState::Allergen => "allergen",
            SpeedState::Auto => "auto",
            SpeedState::Silent => "silent",
            SpeedState::Unknown => "unknown",
            SpeedState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SpeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedState {
    type Err = crate::error::PurifierError;

    /// Accepts only the selectable tokens of [`SPEED_LIST`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SPEED_LIST
            .iter()
            .find(|speed| speed.as_str() == s)
            .copied()
            .ok_or_else(|| crate::error::PurifierError::invalid_option("speed", s))
    }
}

/// Mode overrides the numeric fan speed; textual speeds pass through.
pub fn derive_speed(mode: &str, fan_speed: &str) -> SpeedState {
    match mode {
        "auto" => return SpeedState::Auto,
        "allergen" => return SpeedState::Allergen,
        _ => {}
    }
    match fan_speed {
        "0" => SpeedState::Off,
        "1" => SpeedState::Low,
        "2" => SpeedState::Medium,
        "3" => SpeedState::High,
        "turbo" => SpeedState::Turbo,
        "silent" => SpeedState::Silent,
        _ => SpeedState::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    On,
    Off,
    Unavailable,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
            PowerState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(fan_speed: &str, power: &str, mode: &str) -> String {
        [
            "[name]          Name: Living Room".to_string(),
            "[type]          Type: AC2729".to_string(),
            "[modelid]       ModelId: AC2729/10".to_string(),
            "[swversion]     Version: 0.2.1".to_string(),
            format!("[om]            Fan speed: {fan_speed}"),
            format!("[pwr]           Power: {power}"),
            "[cl]            Child lock: False".to_string(),
            "[aqil]          Light brightness: 100".to_string(),
            "[uil]           Buttons light: ON".to_string(),
            format!("[mode]          Mode: {mode}"),
            "[func]          Function: PH".to_string(),
            "[rhset]         Target humidity: 50".to_string(),
            "[rh]            Humidity: 48".to_string(),
            "[temp]          Temperature: 22".to_string(),
            "[pm25]          PM25: 4".to_string(),
            "[iaql]          Allergen index: 1".to_string(),
            "[aqit]          Air quality notification threshold: 4".to_string(),
            "[ddp]           Used index: PM2.5".to_string(),
            "[rddp]          Rddp: 1".to_string(),
            "[err]           Error: 0".to_string(),
            "[wl]            Water level: 100".to_string(),
            "[fltt1]         HEPA filter type: A3".to_string(),
            "[fltt2]         Active carbon filter type: C7".to_string(),
            "[fltsts0]       Pre-filter and Wick: clean in 112 hours".to_string(),
            "[fltsts1]       HEPA filter: replace in 3038 hours".to_string(),
            "[fltsts2]       Active carbon filter: replace in 4718 hours".to_string(),
            "[wicksts]       Wick filter: replace in 4718 hours".to_string(),
            "[range]         Range: MARS".to_string(),
            "[Runtime]       Runtime: 295 hours".to_string(),
            "[WifiVersion]   WifiVersion: AWS_Philips_AIR@62.1".to_string(),
            "[ProductId]     ProductId: 85bc26fae62611e8a1e3061302926720".to_string(),
            "[DeviceId]      DeviceId: 3c84c6c8123311e9b2f00a32c8d8c9d1".to_string(),
        ]
        .join("\n")
    }

    #[test]
    fn parses_every_table_field() {
        let raw = report("2", "ON", "M");
        let record = parse(&raw).unwrap();
        let lines: Vec<&str> = raw.lines().collect();

        for attr in Attribute::ALL {
            let expected = lines[attr.line()].split_once(": ").unwrap().1;
            assert_eq!(record.get(*attr), Some(expected), "{}", attr.key());
        }
        assert_eq!(record.get(Attribute::Name), Some("Living Room"));
        assert_eq!(record.get(Attribute::PreFilter), Some("clean in 112 hours"));
        assert_eq!(
            record.device_id(),
            Some("3c84c6c8123311e9b2f00a32c8d8c9d1")
        );
    }

    #[test]
    fn value_keeps_later_delimiters() {
        let raw = report("2", "ON", "M").replace("Runtime: 295 hours", "Runtime: 2: 95");
        let record = parse(&raw).unwrap();
        assert_eq!(record.get(Attribute::Runtime), Some("2: 95"));
    }

    #[test]
    fn empty_response_is_rejected() {
        assert_eq!(parse(""), Err(ParseError::Empty));
    }

    #[test]
    fn truncated_response_is_rejected() {
        let raw = report("2", "ON", "M");
        let short: Vec<&str> = raw.lines().take(20).collect();
        assert_eq!(
            parse(&short.join("\n")),
            Err(ParseError::Truncated {
                field: "water_level",
                line: 20
            })
        );
    }

    #[test]
    fn line_without_delimiter_is_rejected() {
        let raw = report("2", "ON", "M").replace("[pwr]           Power: ON", "garbage");
        assert_eq!(
            parse(&raw),
            Err(ParseError::MissingDelimiter {
                field: "state",
                line: 5
            })
        );
    }

    #[test]
    fn speed_derivation_precedence() {
        assert_eq!(derive_speed("auto", "3"), SpeedState::Auto);
        assert_eq!(derive_speed("allergen", "1"), SpeedState::Allergen);
        assert_eq!(derive_speed("M", "0"), SpeedState::Off);
        assert_eq!(derive_speed("M", "1"), SpeedState::Low);
        assert_eq!(derive_speed("M", "2"), SpeedState::Medium);
        assert_eq!(derive_speed("M", "3"), SpeedState::High);
        assert_eq!(derive_speed("M", "turbo"), SpeedState::Turbo);
        assert_eq!(derive_speed("S", "silent"), SpeedState::Silent);
        assert_eq!(derive_speed("M", "t"), SpeedState::Unknown);
        assert_eq!(derive_speed("", ""), SpeedState::Unknown);
    }

    #[test]
    fn power_is_on_only_for_exact_marker() {
        assert_eq!(parse(&report("1", "ON", "M")).unwrap().power(), PowerState::On);
        assert_eq!(parse(&report("1", "OFF", "M")).unwrap().power(), PowerState::Off);
        assert_eq!(parse(&report("1", "on", "M")).unwrap().power(), PowerState::Off);
    }

    #[test]
    fn serializes_as_flat_object_in_report_order() {
        let record = parse(&report("3", "ON", "M")).unwrap();
        let json = record.to_json().unwrap();
        assert!(json.starts_with(r#"{"name":"Living Room","type":"AC2729""#));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), Attribute::ALL.len());
        assert_eq!(obj["fan_speed"], "3");
        assert_eq!(obj["device_id"], "3c84c6c8123311e9b2f00a32c8d8c9d1");
    }

    #[test]
    fn speed_tokens_round_trip_through_strings() {
        assert_eq!("turbo".parse::<SpeedState>().unwrap(), SpeedState::Turbo);
        assert!("unknown".parse::<SpeedState>().is_err());
        assert!("unavailable".parse::<SpeedState>().is_err());
    }
}
