use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use log::debug;
use crate::models::{LogRecord, MeterDefinition};
use crate::storage;
use super::{file_stem, LogError, TelemetrySink};

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n";
pub const ROOT_OPEN: &str = "<ENERGYCAMOCR>\n";
pub const ROOT_CLOSE: &str = "</ENERGYCAMOCR>\n";

/// Cumulative XML document per meter, newest record first. Every write reads
/// the whole file, so this is a diagnostic sink, the CSV log is the primary one.
pub struct XmlSink {
    data_dir: PathBuf,
}

impl XmlSink {
    pub fn new(data_dir: &Path) -> Self {
        return XmlSink { data_dir: data_dir.to_path_buf() };
    }

    pub fn path_for(&self, meter: &MeterDefinition) -> PathBuf {
        return self.data_dir.join(format!("{}.xml", file_stem(meter)));
    }
}

pub fn format_element(record: &LogRecord) -> String {
    let mut out = String::from("<OCR>\n");
    out.push_str(&format!("<Date>{}</Date>\n", record.timestamp.format("%d.%m.%Y %H:%M:%S")));
    out.push_str(&format!("<Reading>{:.1}</Reading>\n", record.value));
    out.push_str(&format!("<RSSI>{}</RSSI>\n", record.rssi_dbm));
    out.push_str(&format!("<Pic>{}</Pic>\n", record.diagnostics.pic_counter));
    out.push_str(&format!("<Tx>{}</Tx>\n", record.diagnostics.tx_counter));
    out.push_str(&format!("<ConfigWord>{}</ConfigWord>\n", record.diagnostics.config_word));
    out.push_str(&format!("<wMBUSStatus>{}</wMBUSStatus>\n", record.diagnostics.status));
    out.push_str("</OCR>\n");
    return out;
}

/// Build the new document text. `existing` is None for a new file.
pub fn splice(existing: Option<&str>, element: &str) -> Option<String> {
    let mut doc = String::from(XML_DECLARATION);
    doc.push_str(ROOT_OPEN);
    doc.push_str(element);

    match existing {
        None => doc.push_str(ROOT_CLOSE),
        Some(text) => {
            let start = text.find(ROOT_OPEN)? + ROOT_OPEN.len();
            doc.push_str(&text[start..]);
        }
    }
    return Some(doc);
}

/// Read, splice and write to a temp file that replaces the old document, a
/// crash in between leaves the previous version intact. An empty file counts
/// as a new document.
pub fn write_record(path: &Path, record: &LogRecord) -> Result<(), LogError> {
    let io_err = |e: std::io::Error| LogError::LogWriteError { path: path.to_path_buf(), source: e };

    let existing = match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => None,
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(e)),
    };

    let doc = splice(existing.as_deref(), &format_element(record))
        .ok_or_else(|| LogError::MalformedDocument { path: path.to_path_buf() })?;

    storage::replace_file(path, doc.as_bytes()).map_err(io_err)?;

    debug!("XML document {:?} now {} bytes", path, doc.len());
    return Ok(());
}

impl TelemetrySink for XmlSink {
    fn name(&self) -> &'static str {
        return "XML";
    }

    fn write(&mut self, meter: &MeterDefinition, record: &LogRecord) -> Result<PathBuf, LogError> {
        let path = self.path_for(meter);
        write_record(&path, record)?;
        return Ok(path);
    }
}
