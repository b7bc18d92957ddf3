use std::path::{Path, PathBuf};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::models::{LogRecord, MeterDefinition};

pub mod csv;
#[cfg(feature = "xml")]
pub mod xml;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Cannot write log {path:?}: {source}")]
    LogWriteError { path: PathBuf, source: std::io::Error },
    #[error("Log {path:?} exists but has no root element, not touching it")]
    MalformedDocument { path: PathBuf },
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Csv,
    Xml,
    Both,
}

/// A durable destination for readings, one file per meter
pub trait TelemetrySink {
    fn name(&self) -> &'static str;
    fn write(&mut self, meter: &MeterDefinition, record: &LogRecord) -> Result<PathBuf, LogError>;
}

/// File name without extension, the same for every sink:
/// wmbus_<manufacturer>_<ident>_<type>_<version>
pub fn file_stem(meter: &MeterDefinition) -> String {
    return format!("wmbus_{:04x}_{:08}_{:02x}_{:02}",
                   meter.manufacturer_id, meter.ident, meter.meter_type.code(), meter.version);
}

/// Fans a reading out to the configured sinks. A failing sink is reported
/// and does not keep the others from writing.
pub struct TelemetryLogger {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl TelemetryLogger {
    pub fn new(data_dir: &Path, format: LogFormat) -> Self {
        let mut sinks: Vec<Box<dyn TelemetrySink>> = Vec::new();
        if format == LogFormat::Csv || format == LogFormat::Both {
            sinks.push(Box::new(csv::CsvSink::new(data_dir)));
        }
        #[cfg(feature = "xml")]
        {
            if format == LogFormat::Xml || format == LogFormat::Both {
                sinks.push(Box::new(xml::XmlSink::new(data_dir)));
            }
        }
        #[cfg(not(feature = "xml"))]
        {
            if format != LogFormat::Csv {
                log::warn!("XML logging requested but built without the xml feature");
            }
        }
        return TelemetryLogger { sinks };
    }

    pub fn with_sinks(sinks: Vec<Box<dyn TelemetrySink>>) -> Self {
        return TelemetryLogger { sinks };
    }

    /// Returns the errors of the sinks that failed, empty on success
    pub fn log(&mut self, meter: &MeterDefinition, record: &LogRecord) -> Vec<LogError> {
        let mut errors = Vec::new();
        for sink in self.sinks.iter_mut() {
            match sink.write(meter, record) {
                Ok(path) => debug!("{} record for {} written to {:?}", sink.name(), meter.label(), path),
                Err(e) => {
                    error!("{} logging for {} failed: {}", sink.name(), meter.label(), e);
                    errors.push(e);
                }
            }
        }
        return errors;
    }
}
