//! Intents and their translation into control-tool arguments.
//!
//! The intent set is closed, so every intent maps to exactly one command.

use crate::attributes::SpeedState;
use crate::error::{PurifierError, Result};
use std::fmt;
use std::str::FromStr;

const FLAG_DEBUG: &str = "--debug";

/// Manual fan speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speed {
    Low,
    Medium,
    High,
    Turbo,
    Silent,
}

/// Automatic operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Auto,
    Allergen,
}

/// Target relative humidity in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HumidityTarget {
    P40,
    P50,
    P60,
    P70,
}

impl HumidityTarget {
    pub fn percent(&self) -> u8 {
        match self {
            HumidityTarget::P40 => 40,
            HumidityTarget::P50 => 50,
            HumidityTarget::P60 => 60,
            HumidityTarget::P70 => 70,
        }
    }
}

impl FromStr for HumidityTarget {
    type Err = PurifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "40" => Ok(HumidityTarget::P40),
            "50" => Ok(HumidityTarget::P50),
            "60" => Ok(HumidityTarget::P60),
            "70" => Ok(HumidityTarget::P70),
            _ => Err(PurifierError::invalid_option("humidity", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Purify,
    PurifyHumidify,
}

impl Function {
    /// Code understood by the control tool.
    pub fn code(&self) -> &'static str {
        match self {
            Function::Purify => "P",
            Function::PurifyHumidify => "PH",
        }
    }
}

impl FromStr for Function {
    type Err = PurifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "P" | "Purify" => Ok(Function::Purify),
            "PH" | "PurifyHumidify" => Ok(Function::PurifyHumidify),
            _ => Err(PurifierError::invalid_option("function", s)),
        }
    }
}

/// Indicator light brightness in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightBrightness {
    Off,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl LightBrightness {
    pub fn percent(&self) -> u8 {
        match self {
            LightBrightness::Off => 0,
            LightBrightness::Quarter => 25,
            LightBrightness::Half => 50,
            LightBrightness::ThreeQuarters => 75,
            LightBrightness::Full => 100,
        }
    }
}

impl FromStr for LightBrightness {
    type Err = PurifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(LightBrightness::Off),
            "25" => Ok(LightBrightness::Quarter),
            "50" => Ok(LightBrightness::Half),
            "75" => Ok(LightBrightness::ThreeQuarters),
            "100" => Ok(LightBrightness::Full),
            _ => Err(PurifierError::invalid_option("brightness", s)),
        }
    }
}

/// A requested change to device behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    PowerOn,
    PowerOff,
    SetSpeed(Speed),
    SetMode(Mode),
    SetHumidityTarget(HumidityTarget),
    SetFunction(Function),
    SetLightBrightness(LightBrightness),
    SetChildLock(bool),
}

impl Intent {
    /// Maps a selectable speed token onto the intent that produces it.
    ///
    /// `unknown` and `unavailable` are display-only and cannot be requested.
    pub fn from_speed(speed: SpeedState) -> Result<Self> {
        match speed {
            SpeedState::Off => Ok(Intent::PowerOff),
            SpeedState::Low => Ok(Intent::SetSpeed(Speed::Low)),
            SpeedState::Medium => Ok(Intent::SetSpeed(Speed::Medium)),
            SpeedState::High => Ok(Intent::SetSpeed(Speed::High)),
            SpeedState::Turbo => Ok(Intent::SetSpeed(Speed::Turbo)),
            SpeedState::Silent => Ok(Intent::SetSpeed(Speed::Silent)),
            SpeedState::Auto => Ok(Intent::SetMode(Mode::Auto)),
            SpeedState::Allergen => Ok(Intent::SetMode(Mode::Allergen)),
            SpeedState::Unknown | SpeedState::Unavailable => {
                Err(PurifierError::invalid_option("speed", speed.as_str()))
            }
        }
    }
}

/// Arguments for one invocation of the control tool.
///
/// Host and protocol selection belong to the transport; a command only
/// carries what varies per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    args: Vec<String>,
}

impl DeviceCommand {
    /// Full status query.
    pub fn status() -> Self {
        Self { args: Vec::new() }
    }

    fn with_debug<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();
        args.push(FLAG_DEBUG.to_string());
        Self { args }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Translates an intent into the command that applies it.
pub fn translate(intent: Intent) -> DeviceCommand {
    match intent {
        Intent::PowerOn => DeviceCommand::with_debug(["--pwr", "1"]),
        Intent::PowerOff => DeviceCommand::with_debug(["--pwr", "0"]),
        Intent::SetSpeed(Speed::Low) => DeviceCommand::with_debug(["--mode", "M", "--om", "1"]),
        Intent::SetSpeed(Speed::Medium) => DeviceCommand::with_debug(["--mode", "M", "--om", "2"]),
        Intent::SetSpeed(Speed::High) => DeviceCommand::with_debug(["--mode", "M", "--om", "3"]),
        Intent::SetSpeed(Speed::Turbo) => DeviceCommand::with_debug(["--mode", "M", "--om", "t"]),
        Intent::SetSpeed(Speed::Silent) => DeviceCommand::with_debug(["--mode", "S"]),
        Intent::SetMode(Mode::Auto) => DeviceCommand::with_debug(["--mode", "P"]),
        Intent::SetMode(Mode::Allergen) => DeviceCommand::with_debug(["--mode", "A"]),
        Intent::SetHumidityTarget(target) => {
            DeviceCommand::with_debug(["--rhset".to_string(), target.percent().to_string()])
        }
        Intent::SetFunction(function) => DeviceCommand::with_debug(["--func", function.code()]),
        Intent::SetLightBrightness(level) => {
            DeviceCommand::with_debug(["--aqil".to_string(), level.percent().to_string()])
        }
        Intent::SetChildLock(locked) => {
            DeviceCommand::with_debug(["--cl", if locked { "True" } else { "False" }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_commands() {
        assert_eq!(translate(Intent::PowerOn).to_string(), "--pwr 1 --debug");
        assert_eq!(translate(Intent::PowerOff).to_string(), "--pwr 0 --debug");
    }

    #[test]
    fn speed_and_mode_commands() {
        assert_eq!(
            translate(Intent::SetSpeed(Speed::High)).to_string(),
            "--mode M --om 3 --debug"
        );
        assert_eq!(
            translate(Intent::SetSpeed(Speed::Turbo)).to_string(),
            "--mode M --om t --debug"
        );
        assert_eq!(
            translate(Intent::SetSpeed(Speed::Silent)).to_string(),
            "--mode S --debug"
        );
        assert_eq!(
            translate(Intent::SetMode(Mode::Auto)).to_string(),
            "--mode P --debug"
        );
        assert_eq!(
            translate(Intent::SetMode(Mode::Allergen)).to_string(),
            "--mode A --debug"
        );
    }

    #[test]
    fn option_commands() {
        let humidity: HumidityTarget = "60".parse().unwrap();
        assert_eq!(
            translate(Intent::SetHumidityTarget(humidity)).args(),
            ["--rhset", "60", "--debug"]
        );

        let function: Function = "PurifyHumidify".parse().unwrap();
        assert_eq!(
            translate(Intent::SetFunction(function)).to_string(),
            "--func PH --debug"
        );

        let level: LightBrightness = "75".parse().unwrap();
        assert_eq!(
            translate(Intent::SetLightBrightness(level)).to_string(),
            "--aqil 75 --debug"
        );

        assert_eq!(
            translate(Intent::SetChildLock(true)).to_string(),
            "--cl True --debug"
        );
        assert_eq!(
            translate(Intent::SetChildLock(false)).to_string(),
            "--cl False --debug"
        );
    }

    #[test]
    fn options_outside_closed_sets_are_rejected() {
        assert!("45".parse::<HumidityTarget>().is_err());
        assert!("H".parse::<Function>().is_err());
        assert!("10".parse::<LightBrightness>().is_err());
        let err = "101".parse::<LightBrightness>().unwrap_err();
        assert!(matches!(
            err,
            PurifierError::InvalidOption {
                field: "brightness",
                ..
            }
        ));
    }

    #[test]
    fn speed_tokens_map_to_intents() {
        assert_eq!(Intent::from_speed(SpeedState::Off).unwrap(), Intent::PowerOff);
        assert_eq!(
            Intent::from_speed(SpeedState::Allergen).unwrap(),
            Intent::SetMode(Mode::Allergen)
        );
        assert_eq!(
            Intent::from_speed(SpeedState::Silent).unwrap(),
            Intent::SetSpeed(Speed::Silent)
        );
        assert!(Intent::from_speed(SpeedState::Unavailable).is_err());
    }

    #[test]
    fn status_query_has_no_arguments() {
        assert!(DeviceCommand::status().args().is_empty());
    }
}
