use serde::{Deserialize, Serialize};
use log::{debug, error, info, warn};
use thiserror::Error;
use crate::models::{MeterDefinition, RadioMode, RfReading, MAX_METERS};
use crate::registry::MeterRegistry;

pub mod simulator;

/// The two USB sticks the driver library knows about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StickKind {
    #[serde(rename = "iM871A")]
    IM871A,
    #[serde(rename = "AMB8465")]
    AMB8465,
}

impl StickKind {
    pub fn to_string(&self) -> String {
        match self {
            StickKind::IM871A => "IMST iM871A".to_string(),
            StickKind::AMB8465 => "Amber AMB8465".to_string(),
        }
    }
}

/// Driver handle, 0 is never a valid handle
pub type DeviceHandle = u32;

/// Whatever the stick reports about itself
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StickStatus {
    pub firmware: String,
    pub radio_mode: String,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub configured_meters: u32,
    pub pending_mask: u32,
}

/// Bitmap of slots with a fresh reading, bit n = registry slot n
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingMask(pub u32);

impl PendingMask {
    pub fn is_empty(&self) -> bool {
        return self.0 == 0;
    }

    pub fn contains(&self, slot: usize) -> bool {
        return slot < 32 && (self.0 >> slot) & 1 == 1;
    }
}

/// The vendor driver, reduced to what the monitor needs. Every call reports
/// failure as None/false; the reason is available through `last_error`.
pub trait WmbusDriver {
    fn open(&mut self, port: &str, stick: StickKind) -> Option<DeviceHandle>;
    fn close(&mut self, handle: DeviceHandle);
    fn stick_id(&mut self, handle: DeviceHandle) -> Option<StickKind>;
    fn ping(&mut self, handle: DeviceHandle) -> bool;
    fn init_device(&mut self, handle: DeviceHandle) -> bool;
    fn last_error(&self, handle: DeviceHandle) -> u32;
    fn error_string(&self, code: u32) -> String;
    fn switch_mode(&mut self, handle: DeviceHandle, mode: RadioMode) -> bool;
    fn radio_mode(&mut self, handle: DeviceHandle) -> Option<RadioMode>;
    /// Install address filter and key for one slot
    fn add_meter(&mut self, handle: DeviceHandle, slot: usize, meter: &MeterDefinition) -> bool;
    fn remove_meter(&mut self, handle: DeviceHandle, slot: usize) -> bool;
    fn pending_mask(&mut self, handle: DeviceHandle) -> Option<u32>;
    fn fetch_reading(&mut self, handle: DeviceHandle, slot: usize) -> Option<RfReading>;
    fn status(&mut self, handle: DeviceHandle) -> Option<StickStatus>;
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no wM-Bus stick found on {port}")]
    DeviceUnavailable { port: String },
    #[error("{operation} failed: {message} (code {code})")]
    DeviceOperationFailed { operation: String, code: u32, message: String },
}

/// Owns the driver and the open handle. Calls are synchronous and the
/// gateway is only ever used from the loop that owns it.
pub struct DeviceGateway<D: WmbusDriver> {
    driver: D,
    handle: DeviceHandle,
    stick: StickKind,
    port: String,
}

impl<D: WmbusDriver> DeviceGateway<D> {
    /// Try every stick kind in order, a kind counts as found only if the
    /// stick identifies as that kind after opening.
    pub fn open(mut driver: D, port: &str, sticks: &[StickKind]) -> Result<Self, GatewayError> {
        for stick in sticks.iter() {
            debug!("Trying {} on {}", stick.to_string(), port);
            let handle = match driver.open(port, *stick) {
                Some(h) if h > 0 => h,
                _ => {
                    debug!("Open as {} failed: {}", stick.to_string(), driver.error_string(driver.last_error(0)));
                    continue;
                }
            };

            if driver.stick_id(handle) == Some(*stick) {
                info!("{} found on {}", stick.to_string(), port);
                return Ok(DeviceGateway {
                    driver,
                    handle,
                    stick: *stick,
                    port: port.to_string(),
                });
            }

            debug!("Stick on {} is not a {}", port, stick.to_string());
            driver.close(handle);
        }

        error!("No wM-Bus stick found on {}", port);
        return Err(GatewayError::DeviceUnavailable { port: port.to_string() });
    }

    pub fn close(mut self) -> D {
        info!("Closing {} on {}", self.stick.to_string(), self.port);
        self.driver.close(self.handle);
        return self.driver;
    }

    pub fn stick(&self) -> StickKind {
        return self.stick;
    }

    pub fn driver(&self) -> &D {
        return &self.driver;
    }

    fn failed(&self, operation: &str) -> GatewayError {
        let code = self.driver.last_error(self.handle);
        let message = self.driver.error_string(code);
        warn!("{} on {} failed: {} ({})", operation, self.port, message, code);
        return GatewayError::DeviceOperationFailed {
            operation: operation.to_string(),
            code,
            message,
        };
    }

    pub fn ping(&mut self) -> Result<(), GatewayError> {
        if self.driver.ping(self.handle) {
            return Ok(());
        }
        return Err(self.failed("ping"));
    }

    pub fn init_device(&mut self) -> Result<(), GatewayError> {
        if self.driver.init_device(self.handle) {
            return Ok(());
        }
        return Err(self.failed("init device"));
    }

    /// Last error code of the stick and its description
    pub fn last_error(&self) -> (u32, String) {
        let code = self.driver.last_error(self.handle);
        return (code, self.driver.error_string(code));
    }

    pub fn switch_mode(&mut self, mode: RadioMode) -> Result<(), GatewayError> {
        if self.driver.switch_mode(self.handle, mode) {
            debug!("Switched to {} mode", mode.to_string());
            return Ok(());
        }
        return Err(self.failed("switch mode"));
    }

    pub fn radio_mode(&mut self) -> Result<RadioMode, GatewayError> {
        let handle = self.handle;
        return self.driver.radio_mode(handle).ok_or_else(|| self.failed("get radio mode"));
    }

    /// Push one slot to the stick, an empty slot clears the filter
    pub fn sync_meter(&mut self, slot: usize, meter: Option<&MeterDefinition>) -> Result<(), GatewayError> {
        let ok = match meter {
            Some(m) => self.driver.add_meter(self.handle, slot, m),
            None => self.driver.remove_meter(self.handle, slot),
        };
        if ok {
            return Ok(());
        }
        return Err(self.failed(&format!("sync meter slot {}", slot)));
    }

    /// Clear every slot on the stick and upload the registry again. All
    /// slots are attempted, the first failure is returned.
    pub fn sync_registry(&mut self, registry: &MeterRegistry) -> Result<(), GatewayError> {
        let mut first_error = None;

        for slot in 0..MAX_METERS {
            if let Err(e) = self.sync_meter(slot, None) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        for (slot, meter) in registry.list() {
            if let Err(e) = self.sync_meter(slot, Some(meter)) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        debug!("Uploaded {} meters to the stick", registry.count());
        return match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        };
    }

    pub fn pending_mask(&mut self) -> Result<PendingMask, GatewayError> {
        let handle = self.handle;
        return self.driver.pending_mask(handle).map(PendingMask).ok_or_else(|| self.failed("get meter data list"));
    }

    pub fn fetch_reading(&mut self, slot: usize) -> Result<RfReading, GatewayError> {
        let handle = self.handle;
        return self.driver.fetch_reading(handle, slot).ok_or_else(|| self.failed(&format!("get data for slot {}", slot)));
    }

    pub fn status(&mut self) -> Result<StickStatus, GatewayError> {
        let handle = self.handle;
        return self.driver.status(handle).ok_or_else(|| self.failed("get stick status"));
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;
    use super::*;

    /// Scripted driver that records what the gateway asked for
    #[derive(Default)]
    pub struct MockDriver {
        pub present: Vec<StickKind>,
        pub identifies_as: Option<StickKind>,
        pub mode: Option<RadioMode>,
        pub mask: u32,
        pub readings: HashMap<usize, RfReading>,
        pub slots: HashMap<usize, MeterDefinition>,
        pub fail_fetch: bool,
        pub fail_pending: bool,
        pub fail_switch: bool,
        pub error: u32,
        pub opened: Vec<StickKind>,
        pub closed: u32,
        pub fetches: Vec<usize>,
        pub pending_calls: u32,
        pub removes: u32,
    }

    impl MockDriver {
        pub fn with_stick(stick: StickKind) -> Self {
            return MockDriver {
                present: vec![stick],
                identifies_as: Some(stick),
                mode: Some(RadioMode::T2),
                ..Default::default()
            };
        }
    }

    impl WmbusDriver for MockDriver {
        fn open(&mut self, _port: &str, stick: StickKind) -> Option<DeviceHandle> {
            self.opened.push(stick);
            if self.present.contains(&stick) {
                return Some(1);
            }
            self.error = 1;
            return None;
        }

        fn close(&mut self, _handle: DeviceHandle) {
            self.closed += 1;
        }

        fn stick_id(&mut self, _handle: DeviceHandle) -> Option<StickKind> {
            return self.identifies_as;
        }

        fn ping(&mut self, _handle: DeviceHandle) -> bool {
            return true;
        }

        fn init_device(&mut self, _handle: DeviceHandle) -> bool {
            return true;
        }

        fn last_error(&self, _handle: DeviceHandle) -> u32 {
            return self.error;
        }

        fn error_string(&self, code: u32) -> String {
            return match code {
                0 => "no error".to_string(),
                1 => "device not found".to_string(),
                _ => "timeout".to_string(),
            };
        }

        fn switch_mode(&mut self, _handle: DeviceHandle, mode: RadioMode) -> bool {
            if self.fail_switch {
                self.error = 2;
                return false;
            }
            self.mode = Some(mode);
            return true;
        }

        fn radio_mode(&mut self, _handle: DeviceHandle) -> Option<RadioMode> {
            return self.mode;
        }

        fn add_meter(&mut self, _handle: DeviceHandle, slot: usize, meter: &MeterDefinition) -> bool {
            self.slots.insert(slot, meter.clone());
            return true;
        }

        fn remove_meter(&mut self, _handle: DeviceHandle, slot: usize) -> bool {
            self.removes += 1;
            self.slots.remove(&slot);
            return true;
        }

        fn pending_mask(&mut self, _handle: DeviceHandle) -> Option<u32> {
            self.pending_calls += 1;
            if self.fail_pending {
                self.error = 2;
                return None;
            }
            return Some(self.mask);
        }

        fn fetch_reading(&mut self, _handle: DeviceHandle, slot: usize) -> Option<RfReading> {
            self.fetches.push(slot);
            if self.fail_fetch {
                self.error = 2;
                return None;
            }
            return self.readings.get(&slot).cloned();
        }

        fn status(&mut self, _handle: DeviceHandle) -> Option<StickStatus> {
            return Some(StickStatus {
                firmware: "mock".to_string(),
                radio_mode: self.mode.map(|m| m.to_string()).unwrap_or_default(),
                pending_mask: self.mask,
                ..Default::default()
            });
        }
    }
}
