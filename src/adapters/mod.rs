//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements       | Connects to                     |
//! |--------------|------------------|---------------------------------|
//! | `modbus_rtu` | RegisterPort     | charge controller over RS485    |
//! | `ambient`    | TelemetrySink    | Ambient data channel (HTTP)     |
//! | `nicehash`   | PowerProfileApi  | NiceHash rig power modes (HTTP) |
//! | `hive`       | PowerProfileApi  | HiveOS OC profiles (HTTP)       |
//! | `rpi`        | (constructors)   | Raspberry Pi GPIO, I2C, UART    |

pub mod ambient;
pub mod hive;
pub mod modbus_rtu;
pub mod nicehash;
#[cfg(feature = "rpi")]
pub mod rpi;

use std::sync::Arc;

use crate::app::ports::PowerProfileApi;
use crate::config::ProfileBackendConfig;
use crate::error::Result;

/// Build the configured power-profile backend, if any.
pub fn profile_api(cfg: Option<&ProfileBackendConfig>) -> Result<Option<Arc<dyn PowerProfileApi>>> {
    let api: Arc<dyn PowerProfileApi> = match cfg {
        None => return Ok(None),
        Some(ProfileBackendConfig::Nicehash(c)) => Arc::new(nicehash::NicehashClient::new(c)?),
        Some(ProfileBackendConfig::Hive(c)) => Arc::new(hive::HiveClient::new(c)?),
    };
    Ok(Some(api))
}
