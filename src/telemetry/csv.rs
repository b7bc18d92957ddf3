use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::models::{LogRecord, MeterDefinition};
use super::{file_stem, LogError, TelemetrySink};

pub const CSV_HEADER: &str = "Date, Value, Payload";

/// Append only CSV log, the header goes into empty or new files only
pub struct CsvSink {
    data_dir: PathBuf,
}

impl CsvSink {
    pub fn new(data_dir: &Path) -> Self {
        return CsvSink { data_dir: data_dir.to_path_buf() };
    }

    pub fn path_for(&self, meter: &MeterDefinition) -> PathBuf {
        return self.data_dir.join(format!("{}.csv", file_stem(meter)));
    }
}

pub fn format_line(record: &LogRecord) -> String {
    return format!("{}, {:.1}, {}", record.timestamp.format("%Y-%m-%d %H:%M"), record.value, record.payload_hex());
}

pub fn append_record(path: &Path, record: &LogRecord) -> Result<(), std::io::Error> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut out = String::new();
    if file.metadata()?.len() == 0 {
        out.push_str(CSV_HEADER);
        out.push('\n');
    }
    out.push_str(&format_line(record));
    out.push('\n');

    /* One write call so a line never gets split by another writer */
    file.write_all(out.as_bytes())?;
    return Ok(());
}

impl TelemetrySink for CsvSink {
    fn name(&self) -> &'static str {
        return "CSV";
    }

    fn write(&mut self, meter: &MeterDefinition, record: &LogRecord) -> Result<PathBuf, LogError> {
        let path = self.path_for(meter);
        match append_record(&path, record) {
            Ok(_) => Ok(path),
            Err(e) => Err(LogError::LogWriteError { path, source: e }),
        }
    }
}

#[cfg(test)]
mod csv_tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::models::{MeterType, ReadingDiagnostics};

    fn record(value: f64) -> LogRecord {
        return LogRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap().and_hms_opt(9, 5, 42).unwrap(),
            value,
            payload: vec![0x2E, 0x44, 0x0A, 0xFF],
            rssi_dbm: -70,
            diagnostics: ReadingDiagnostics::default(),
        };
    }

    #[test]
    fn line_format() {
        assert_eq!(format_line(&record(1.23)), "2024-03-07 09:05, 1.2, 2E440AFF");
        assert_eq!(format_line(&record(5000.0)), "2024-03-07 09:05, 5000.0, 2E440AFF");
    }

    #[test]
    fn header_once_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        let meter = MeterDefinition::new(0x15B5, 12345678, MeterType::Gas, 1);

        for i in 0..3 {
            sink.write(&meter, &record(i as f64)).unwrap();
        }

        let contents = std::fs::read_to_string(sink.path_for(&meter)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.iter().filter(|l| **l == CSV_HEADER).count(), 1);
        assert_eq!(lines[3], "2024-03-07 09:05, 2.0, 2E440AFF");
    }

    #[test]
    fn existing_file_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.csv");
        std::fs::write(&path, "old line\n").unwrap();

        append_record(&path, &record(1.0)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "old line\n2024-03-07 09:05, 1.0, 2E440AFF\n");
    }

    #[test]
    fn empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        append_record(&path, &record(1.0)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Date, Value, Payload\n"));
    }

    #[test]
    fn missing_directory_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(&dir.path().join("does/not/exist"));
        let meter = MeterDefinition::new(0x15B5, 1, MeterType::Gas, 1);
        assert!(matches!(sink.write(&meter, &record(1.0)), Err(LogError::LogWriteError { .. })));
    }
}
