use std::path::PathBuf;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use thiserror::Error;
use crate::decoder::{decode_value, DecodeError};
use crate::gateway::{DeviceGateway, GatewayError, PendingMask, StickStatus, WmbusDriver};
use crate::models::{EncryptionStatus, LogRecord, MeterDefinition, RadioMode};
use crate::registry::{MeterRegistry, RegistryError};
use crate::telemetry::TelemetryLogger;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Meter slot {slot} changed but the stick was not updated: {source}")]
    Unsynced { slot: usize, source: GatewayError },
}

/// Edge trigger on wall clock minutes
#[derive(Debug, Default, Clone)]
pub struct MinuteScheduler {
    last_minute: Option<i64>,
}

impl MinuteScheduler {
    pub fn new() -> Self {
        return MinuteScheduler { last_minute: None };
    }

    /// True once for every minute that is observed, the first call included
    pub fn is_new_minute(&mut self, now: NaiveDateTime) -> bool {
        let minute = now.and_utc().timestamp().div_euclid(60);
        if self.last_minute == Some(minute) {
            return false;
        }
        self.last_minute = Some(minute);
        return true;
    }
}

/// One meter handled in a pass
#[derive(Debug, Clone)]
pub struct MeterReport {
    pub slot: usize,
    pub meter: MeterDefinition,
    pub value: f64,
    pub encryption: EncryptionStatus,
    pub rssi_dbm: i16,
    pub access_number: u8,
    /// False if at least one sink failed
    pub logged: bool,
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub pending: PendingMask,
    pub meters: Vec<MeterReport>,
    /// Slots whose reading could not be fetched or scaled
    pub failed: Vec<(usize, AcquisitionError)>,
}

impl PassReport {
    pub fn is_heartbeat(&self) -> bool {
        return self.pending.is_empty();
    }
}

/// Owns everything the monitor touches: stick, meter registry, sinks and the
/// scheduling state. Single owner, so stick calls can never overlap.
pub struct AcquisitionLoop<D: WmbusDriver> {
    gateway: DeviceGateway<D>,
    registry: MeterRegistry,
    logger: TelemetryLogger,
    scheduler: MinuteScheduler,
    mode: RadioMode,
    registry_path: Option<PathBuf>,
    idle_passes: u32,
}

impl<D: WmbusDriver> AcquisitionLoop<D> {
    pub fn new(gateway: DeviceGateway<D>, registry: MeterRegistry, logger: TelemetryLogger, mode: RadioMode) -> Self {
        return AcquisitionLoop {
            gateway,
            registry,
            logger,
            scheduler: MinuteScheduler::new(),
            mode,
            registry_path: None,
            idle_passes: 0,
        };
    }

    /// Save the registry to this file after every change
    pub fn with_autosave(mut self, path: PathBuf) -> Self {
        self.registry_path = Some(path);
        self
    }

    /// Bring the stick into the wanted state: check it answers, set the
    /// radio mode, init it and upload the meters. Only a stick that cannot
    /// report its mode is fatal, a failed switch keeps the current mode.
    pub fn start(&mut self, wanted: RadioMode) -> Result<(), GatewayError> {
        if let Err(e) = self.gateway.ping() {
            warn!("Stick did not answer the ping: {}", e);
        }

        let current = self.gateway.radio_mode()?;
        info!("wM-Bus {} mode", current.to_string());
        self.mode = current;
        if current != wanted {
            if let Err(e) = self.switch_mode(wanted) {
                warn!("Staying in {} mode: {}", self.mode.to_string(), e);
            }
        }

        if let Err(e) = self.gateway.init_device() {
            warn!("Stick init failed: {}", e);
        }

        if let Err(e) = self.resync() {
            error!("Uploading meters failed: {}", e);
        }
        return Ok(());
    }

    /// Mark the current minute as seen, the first pass then happens at the
    /// next minute boundary
    pub fn prime(&mut self, now: NaiveDateTime) {
        self.scheduler.is_new_minute(now);
    }

    pub fn registry(&self) -> &MeterRegistry {
        return &self.registry;
    }

    pub fn mode(&self) -> RadioMode {
        return self.mode;
    }

    pub fn meter_count(&self) -> usize {
        return self.registry.count();
    }

    pub fn idle_passes(&self) -> u32 {
        return self.idle_passes;
    }

    pub fn gateway(&self) -> &DeviceGateway<D> {
        return &self.gateway;
    }

    /// Run a pass if the minute changed or a pass was requested
    pub fn tick(&mut self, now: NaiveDateTime, forced: bool) -> Option<Result<PassReport, GatewayError>> {
        let new_minute = self.scheduler.is_new_minute(now);
        if !new_minute && !forced {
            return None;
        }
        return Some(self.acquisition_pass(now));
    }

    /// Ask the stick which meters have data, fetch, scale and log those
    pub fn acquisition_pass(&mut self, now: NaiveDateTime) -> Result<PassReport, GatewayError> {
        let pending = self.gateway.pending_mask()?;
        let mut report = PassReport { pending, ..Default::default() };

        if pending.is_empty() {
            self.idle_passes += 1;
            debug!("No new meter data ({} idle passes)", self.idle_passes);
            return Ok(report);
        }
        self.idle_passes = 0;

        let due: Vec<(usize, MeterDefinition)> = self.registry.list()
            .into_iter()
            .filter(|(slot, _)| pending.contains(*slot))
            .map(|(slot, m)| (slot, m.clone()))
            .collect();

        for (slot, meter) in due {
            let reading = match self.gateway.fetch_reading(slot) {
                Ok(r) => r,
                Err(e) => {
                    report.failed.push((slot, e.into()));
                    continue;
                }
            };

            let value = match decode_value(reading.mantissa, reading.exponent) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Meter #{} {}: {}", slot + 1, meter.label(), e);
                    report.failed.push((slot, e.into()));
                    continue;
                }
            };
            let encryption = reading.packet_info.encryption();
            debug!("Meter #{} {} {} value {:.1} RSSI {} dBm #{}",
                  slot + 1, meter.label(), encryption.to_string(), value, reading.rssi_dbm, reading.access_number);

            let record = LogRecord::from_reading(now, value, &reading);
            let errors = self.logger.log(&meter, &record);

            report.meters.push(MeterReport {
                slot,
                meter,
                value,
                encryption,
                rssi_dbm: reading.rssi_dbm,
                access_number: reading.access_number,
                logged: errors.is_empty(),
            });
        }

        return Ok(report);
    }

    /// Upload the whole registry to the stick
    pub fn resync(&mut self) -> Result<(), GatewayError> {
        return self.gateway.sync_registry(&self.registry);
    }

    fn persist(&self) {
        if let Some(path) = &self.registry_path {
            if let Err(e) = self.registry.save(path) {
                error!("Saving meters to {:?} failed: {}", path, e);
            }
        }
    }

    pub fn add_meter(&mut self, meter: MeterDefinition) -> Result<usize, AcquisitionError> {
        let slot = self.registry.add(meter)?;
        self.persist();
        if let Err(e) = self.resync() {
            return Err(AcquisitionError::Unsynced { slot, source: e });
        }
        return Ok(slot);
    }

    /// Remove by 0 based slot, the registry validates the index
    pub fn remove_meter(&mut self, slot: usize) -> Result<Option<MeterDefinition>, AcquisitionError> {
        let removed = self.registry.remove(slot)?;
        self.persist();
        if let Err(e) = self.resync() {
            return Err(AcquisitionError::Unsynced { slot, source: e });
        }
        return Ok(removed);
    }

    /// Switch and read back what the stick actually uses
    pub fn switch_mode(&mut self, mode: RadioMode) -> Result<RadioMode, GatewayError> {
        self.gateway.switch_mode(mode)?;
        self.mode = self.gateway.radio_mode()?;
        info!("wM-Bus {} mode", self.mode.to_string());
        return Ok(self.mode);
    }

    pub fn last_error(&self) -> (u32, String) {
        return self.gateway.last_error();
    }

    pub fn status(&mut self) -> Result<StickStatus, GatewayError> {
        return self.gateway.status();
    }

    /// Close the stick and write the registry, returns the driver
    pub fn shutdown(self, path: Option<&std::path::Path>) -> Result<D, RegistryError> {
        let driver = self.gateway.close();
        if let Some(p) = path {
            self.registry.save(p)?;
        }
        return Ok(driver);
    }
}
