use std::time::{Duration, Instant};
use log::debug;
use crate::models::{MeterDefinition, MeterType, PacketInfo, RadioMode, ReadingDiagnostics, RfReading, MAX_METERS};
use crate::registry::record::to_bcd;
use super::{DeviceHandle, StickKind, StickStatus, WmbusDriver};

pub const ERR_NONE: u32 = 0;
pub const ERR_NOT_FOUND: u32 = 1;
pub const ERR_NOT_OPEN: u32 = 2;
pub const ERR_INVALID_SLOT: u32 = 3;
pub const ERR_NO_DATA: u32 = 4;

const SIM_HANDLE: DeviceHandle = 1;

#[derive(Clone)]
struct SimMeter {
    meter: MeterDefinition,
    counter: i32,
    access_number: u8,
    last_sent: Option<Instant>,
    active: bool,
}

/// Stand-in for the vendor library, so the monitor runs without a stick.
/// Every configured meter "transmits" once per interval.
pub struct SimulatedStick {
    interval: Duration,
    open_as: Option<StickKind>,
    mode: RadioMode,
    slots: Vec<Option<SimMeter>>,
    pending: u32,
    error: u32,
    frames: u64,
}

impl SimulatedStick {
    pub fn new(interval: Duration) -> Self {
        return SimulatedStick {
            interval,
            open_as: None,
            mode: RadioMode::T2,
            slots: vec![None; MAX_METERS],
            pending: 0,
            error: ERR_NONE,
            frames: 0,
        };
    }

    fn check_handle(&mut self, handle: DeviceHandle) -> bool {
        if handle != SIM_HANDLE || self.open_as.is_none() {
            self.error = ERR_NOT_OPEN;
            return false;
        }
        return true;
    }

    /// Mark every meter whose interval has elapsed as pending
    fn receive(&mut self) {
        let now = Instant::now();
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if let Some(sim) = entry.as_mut().filter(|s| s.active) {
                let due = match sim.last_sent {
                    Some(t) => now.duration_since(t) >= self.interval,
                    None => true,
                };
                if due {
                    sim.last_sent = Some(now);
                    sim.counter += step_for(sim.meter.meter_type);
                    sim.access_number = sim.access_number.wrapping_add(1);
                    self.pending |= 1 << slot;
                    self.frames += 1;
                }
            }
        }
    }
}

fn step_for(meter_type: MeterType) -> i32 {
    return match meter_type {
        MeterType::Electricity => 7,
        MeterType::Gas => 3,
        MeterType::Water => 11,
        _ => 1,
    };
}

fn exponent_for(meter_type: MeterType) -> i8 {
    return match meter_type {
        MeterType::Electricity => -1,
        MeterType::Gas => -2,
        MeterType::Water => -3,
        _ => 0,
    };
}

/// Short SND_NR frame carrying one instantaneous value record
fn build_frame(meter: &MeterDefinition, access_number: u8, value: i32) -> Vec<u8> {
    let mut frame = vec![0u8];
    frame.push(0x44);
    frame.extend_from_slice(&meter.manufacturer_id.to_le_bytes());
    frame.extend_from_slice(&to_bcd(meter.ident).unwrap_or(0).to_le_bytes());
    frame.push(to_bcd(meter.version as u32).unwrap_or(0) as u8);
    frame.push(meter.meter_type.code());
    frame.extend_from_slice(&[0x7A, access_number, 0x00, 0x00, 0x00]);
    frame.extend_from_slice(&[0x04, 0x13]);
    frame.extend_from_slice(&value.to_le_bytes());
    frame[0] = (frame.len() - 1) as u8;
    return frame;
}

impl WmbusDriver for SimulatedStick {
    fn open(&mut self, port: &str, stick: StickKind) -> Option<DeviceHandle> {
        if port.is_empty() {
            self.error = ERR_NOT_FOUND;
            return None;
        }
        debug!("Simulated {} on {}", stick.to_string(), port);
        self.open_as = Some(stick);
        self.error = ERR_NONE;
        return Some(SIM_HANDLE);
    }

    fn close(&mut self, _handle: DeviceHandle) {
        self.open_as = None;
    }

    fn stick_id(&mut self, handle: DeviceHandle) -> Option<StickKind> {
        if !self.check_handle(handle) {
            return None;
        }
        return self.open_as;
    }

    fn ping(&mut self, handle: DeviceHandle) -> bool {
        return self.check_handle(handle);
    }

    fn init_device(&mut self, handle: DeviceHandle) -> bool {
        if !self.check_handle(handle) {
            return false;
        }
        self.pending = 0;
        return true;
    }

    fn last_error(&self, _handle: DeviceHandle) -> u32 {
        return self.error;
    }

    fn error_string(&self, code: u32) -> String {
        return match code {
            ERR_NONE => "no error",
            ERR_NOT_FOUND => "device not found",
            ERR_NOT_OPEN => "device not open",
            ERR_INVALID_SLOT => "invalid meter slot",
            ERR_NO_DATA => "no data for meter",
            _ => "unknown error",
        }.to_string();
    }

    fn switch_mode(&mut self, handle: DeviceHandle, mode: RadioMode) -> bool {
        if !self.check_handle(handle) {
            return false;
        }
        self.mode = mode;
        return true;
    }

    fn radio_mode(&mut self, handle: DeviceHandle) -> Option<RadioMode> {
        if !self.check_handle(handle) {
            return None;
        }
        return Some(self.mode);
    }

    fn add_meter(&mut self, handle: DeviceHandle, slot: usize, meter: &MeterDefinition) -> bool {
        if !self.check_handle(handle) {
            return false;
        }
        if slot >= MAX_METERS {
            self.error = ERR_INVALID_SLOT;
            return false;
        }
        /* Keep the counter running if the same meter is uploaded again */
        let sim = match self.slots[slot].take() {
            Some(sim) if sim.meter == *meter => sim,
            _ => SimMeter {
                meter: meter.clone(),
                counter: (meter.ident % 10_000) as i32 * 100,
                access_number: 0,
                last_sent: None,
                active: true,
            },
        };
        self.slots[slot] = Some(SimMeter { active: true, ..sim });
        return true;
    }

    fn remove_meter(&mut self, handle: DeviceHandle, slot: usize) -> bool {
        if !self.check_handle(handle) {
            return false;
        }
        if slot >= MAX_METERS {
            self.error = ERR_INVALID_SLOT;
            return false;
        }
        /* The meter state stays so a re-upload of the same meter keeps counting */
        if let Some(sim) = self.slots[slot].as_mut() {
            sim.active = false;
        }
        self.pending &= !(1 << slot);
        return true;
    }

    fn pending_mask(&mut self, handle: DeviceHandle) -> Option<u32> {
        if !self.check_handle(handle) {
            return None;
        }
        self.receive();
        return Some(self.pending);
    }

    fn fetch_reading(&mut self, handle: DeviceHandle, slot: usize) -> Option<RfReading> {
        if !self.check_handle(handle) {
            return None;
        }
        if slot >= MAX_METERS || self.pending & (1 << slot) == 0 {
            self.error = ERR_NO_DATA;
            return None;
        }
        let sim = match self.slots[slot].as_ref().filter(|s| s.active) {
            Some(s) => s,
            None => {
                self.error = ERR_NO_DATA;
                return None;
            }
        };
        self.pending &= !(1 << slot);

        let encrypted = sim.meter.key.iter().any(|b| *b != 0);
        let packet_info = match encrypted {
            true => PacketInfo(PacketInfo::IS_ENCRYPTED | PacketInfo::WAS_ENCRYPTED),
            false => PacketInfo(PacketInfo::WAS_NOT_ENCRYPTED),
        };

        return Some(RfReading {
            mantissa: sim.counter,
            exponent: exponent_for(sim.meter.meter_type),
            payload: build_frame(&sim.meter, sim.access_number, sim.counter),
            rssi_dbm: -60 - (sim.access_number % 20) as i16,
            access_number: sim.access_number,
            packet_info,
            diagnostics: ReadingDiagnostics {
                pic_counter: self.frames as u32,
                tx_counter: sim.access_number as u32,
                config_word: 0,
                status: 0,
            },
        });
    }

    fn status(&mut self, handle: DeviceHandle) -> Option<StickStatus> {
        if !self.check_handle(handle) {
            return None;
        }
        return Some(StickStatus {
            firmware: format!("simulated {}", self.open_as.map(|s| s.to_string()).unwrap_or_default()),
            radio_mode: self.mode.to_string(),
            frames_received: self.frames,
            frames_dropped: 0,
            configured_meters: self.slots.iter().flatten().filter(|s| s.active).count() as u32,
            pending_mask: self.pending,
        });
    }
}

#[cfg(test)]
mod simulator_tests {
    use super::*;

    fn open_stick(interval: Duration) -> SimulatedStick {
        let mut stick = SimulatedStick::new(interval);
        assert_eq!(stick.open("/dev/ttyUSB0", StickKind::IM871A), Some(SIM_HANDLE));
        return stick;
    }

    #[test]
    fn empty_port_is_not_found() {
        let mut stick = SimulatedStick::new(Duration::from_secs(60));
        assert_eq!(stick.open("", StickKind::IM871A), None);
        assert_eq!(stick.error_string(stick.last_error(0)), "device not found");
    }

    #[test]
    fn meter_reports_once_per_interval() {
        let mut stick = open_stick(Duration::from_secs(3600));
        let meter = MeterDefinition::new(0x15B5, 12345678, MeterType::Gas, 1);
        assert!(stick.add_meter(SIM_HANDLE, 2, &meter));

        assert_eq!(stick.pending_mask(SIM_HANDLE), Some(0b100));
        let reading = stick.fetch_reading(SIM_HANDLE, 2).unwrap();
        assert_eq!(reading.exponent, -2);
        assert_eq!(reading.packet_info.encryption(), crate::models::EncryptionStatus::NotEncrypted);
        assert_eq!(reading.payload[0] as usize, reading.payload.len() - 1);
        assert_eq!(&reading.payload[4..8], &[0x78, 0x56, 0x34, 0x12]);

        /* consumed, and the interval has not elapsed yet */
        assert_eq!(stick.pending_mask(SIM_HANDLE), Some(0));
        assert!(stick.fetch_reading(SIM_HANDLE, 2).is_none());
        assert_eq!(stick.last_error(SIM_HANDLE), ERR_NO_DATA);
    }

    #[test]
    fn calls_fail_when_closed() {
        let mut stick = open_stick(Duration::from_secs(60));
        stick.close(SIM_HANDLE);
        assert!(!stick.ping(SIM_HANDLE));
        assert_eq!(stick.last_error(SIM_HANDLE), ERR_NOT_OPEN);
    }
}
