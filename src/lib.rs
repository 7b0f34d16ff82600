//! # Philair
//!
//! Control and state synchronization for Philips air purifiers and
//! humidifiers reachable over CoAP through the `airctrl` tool.
//!
//! Each configured device polls its status on a fixed cadence, applies
//! intents with a bounded resend on failure, and mirrors every refreshed
//! attribute record to an MQTT broker when one is configured.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use philair::{Device, DeviceConfig, Intent, StatePublisher};
//! use philair::command::Speed;
//!
//! # async fn run() -> philair::error::Result<()> {
//! let device = Device::new(DeviceConfig::new("192.168.1.20"), StatePublisher::disabled())?;
//! device.apply_intent(Intent::SetSpeed(Speed::High)).await;
//! println!("speed: {}", device.current_speed());
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
mod macros;
pub mod attributes;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod publisher;
pub mod resend;
pub mod transport;

pub use attributes::{Attribute, AttributeRecord, PowerState, SpeedState};
pub use command::{DeviceCommand, Intent};
pub use config::{BridgeConfig, DeviceConfig};
pub use device::{Device, DeviceBuilder, DeviceEvent};
pub use error::{ParseError, PurifierError};
pub use manager::{Manager, ManagerEvent, ServiceCall};
pub use publisher::StatePublisher;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
