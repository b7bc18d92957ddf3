use std::fs;
use std::time::Duration;
use chrono::NaiveDate;
use wmbus_monitor::models::EncryptionStatus;
use wmbus_monitor::telemetry::LogFormat;
use wmbus_monitor::{AcquisitionLoop, DeviceGateway, MeterDefinition, MeterRegistry, MeterType, RadioMode,
                    SimulatedStick, StickKind, TelemetryLogger};

fn open_loop(dir: &std::path::Path) -> AcquisitionLoop<SimulatedStick> {
    let driver = SimulatedStick::new(Duration::from_secs(3600));
    let gateway = DeviceGateway::open(driver, "/dev/ttyUSB0", &[StickKind::IM871A, StickKind::AMB8465]).unwrap();
    assert_eq!(gateway.stick(), StickKind::IM871A);
    let logger = TelemetryLogger::new(dir, LogFormat::Both);
    return AcquisitionLoop::new(gateway, MeterRegistry::new(), logger, RadioMode::T2)
        .with_autosave(dir.join("meter.dat"));
}

#[test]
fn simulated_stick_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
    let mut lp = open_loop(dir.path());
    lp.start(RadioMode::S2).unwrap();
    assert_eq!(lp.mode(), RadioMode::S2);

    let meter = MeterDefinition::new(0x1593, 12345678, MeterType::Water, 1)
        .with_key(MeterDefinition::default_key());
    assert_eq!(lp.add_meter(meter).unwrap(), 0);

    let report = lp.tick(now, true).unwrap().unwrap();
    assert_eq!(report.meters.len(), 1);
    let m = &report.meters[0];
    assert_eq!(m.encryption, EncryptionStatus::Decrypted);
    assert!((m.value - 567.811).abs() < 1e-9);
    assert!(m.logged);

    let csv = fs::read_to_string(dir.path().join("wmbus_1593_12345678_07_01.csv")).unwrap();
    assert!(csv.starts_with("Date, Value, Payload\n2024-06-01 12:00, 567.8, "));
    let xml = fs::read_to_string(dir.path().join("wmbus_1593_12345678_07_01.xml")).unwrap();
    assert!(xml.contains("<Reading>567.8</Reading>"));

    /* nothing new inside the transmit interval */
    let report = lp.tick(now, true).unwrap().unwrap();
    assert!(report.is_heartbeat());
    assert_eq!(lp.idle_passes(), 1);

    let path = dir.path().join("meter.dat");
    lp.shutdown(Some(&path)).unwrap();
    let (registry, count) = MeterRegistry::load(&path).unwrap();
    assert_eq!(count, 1);
    assert_eq!(registry.get(0).unwrap().key, MeterDefinition::default_key());
}

#[test]
fn removed_meter_stops_reporting() {
    let dir = tempfile::tempdir().unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
    let mut lp = open_loop(dir.path());
    lp.start(RadioMode::T2).unwrap();

    lp.add_meter(MeterDefinition::new(0x1593, 1, MeterType::Gas, 1)).unwrap();
    lp.add_meter(MeterDefinition::new(0x1593, 2, MeterType::Gas, 1)).unwrap();
    lp.remove_meter(0).unwrap();

    let report = lp.tick(now, true).unwrap().unwrap();
    assert_eq!(report.meters.len(), 1);
    assert_eq!(report.meters[0].slot, 1);
    assert_eq!(report.meters[0].encryption, EncryptionStatus::NotEncrypted);
    assert_eq!(MeterRegistry::load(&dir.path().join("meter.dat")).unwrap().1, 1);
}
