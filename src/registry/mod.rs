use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use log::{debug, info, warn};
use thiserror::Error;
use crate::models::{MeterDefinition, MAX_METERS};
use crate::storage;

pub mod record;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("All {} meter slots are in use", MAX_METERS)]
    RegistryFull,
    #[error("Meter index {0} is not valid")]
    InvalidIndex(usize),
    #[error("Meter file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed set of meter slots. The slot index is the bit in the stick's pending
/// mask and the record position in the registry file, so slots never move.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterRegistry {
    slots: Vec<Option<MeterDefinition>>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        return MeterRegistry {
            slots: vec![None; MAX_METERS],
        };
    }

    pub fn capacity(&self) -> usize {
        return self.slots.len();
    }

    /// Place the meter in the first empty slot. Duplicates are allowed.
    pub fn add(&mut self, meter: MeterDefinition) -> Result<usize, RegistryError> {
        let index = self.slots.iter().position(|s| s.is_none()).ok_or(RegistryError::RegistryFull)?;
        debug!("Meter {} stored in slot {}", meter.label(), index);
        self.slots[index] = Some(meter);
        return Ok(index);
    }

    /// Clearing an empty slot is fine, an index past the capacity is not
    pub fn remove(&mut self, index: usize) -> Result<Option<MeterDefinition>, RegistryError> {
        let slot = self.slots.get_mut(index).ok_or(RegistryError::InvalidIndex(index))?;
        return Ok(slot.take());
    }

    pub fn get(&self, index: usize) -> Option<&MeterDefinition> {
        return self.slots.get(index).and_then(|s| s.as_ref());
    }

    /// Occupied slots in ascending order
    pub fn list(&self) -> Vec<(usize, &MeterDefinition)> {
        return self.slots.iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|m| (i, m)))
            .collect();
    }

    pub fn count(&self) -> usize {
        return self.slots.iter().filter(|s| s.is_some()).count();
    }

    /// Load the registry file. A missing file is an empty registry, a short
    /// file leaves the remaining slots empty. Returns the number of meters.
    pub fn load(path: &Path) -> Result<(Self, usize), RegistryError> {
        let mut registry = MeterRegistry::new();

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No meter file {:?}, starting without meters", path);
                return Ok((registry, 0));
            }
            Err(e) => return Err(e.into()),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        for (index, chunk) in contents.chunks_exact(record::RECORD_SIZE).take(MAX_METERS).enumerate() {
            let mut buf = [0u8; record::RECORD_SIZE];
            buf.copy_from_slice(chunk);
            match record::decode(&buf) {
                record::Decoded::Empty => {},
                record::Decoded::Meter(m) => registry.slots[index] = Some(m),
                record::Decoded::Corrupt => {
                    warn!("Meter slot {} in {:?} has invalid BCD fields, ignoring it", index, path);
                }
            }
        }

        if contents.len() % record::RECORD_SIZE != 0 {
            warn!("Meter file {:?} ends with a partial record, ignored", path);
        }

        let count = registry.count();
        info!("Loaded {} meters from {:?}", count, path);
        return Ok((registry, count));
    }

    /// Write all slots, empty ones included, so positions survive a restart.
    /// The data goes to a temp file next to the target and is renamed over it.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let mut data = Vec::with_capacity(self.slots.len() * record::RECORD_SIZE);
        for slot in self.slots.iter() {
            data.extend_from_slice(&record::encode(slot.as_ref()));
        }
        storage::replace_file(path, &data)?;

        debug!("Saved {} meters to {:?}", self.count(), path);
        return Ok(());
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::models::MeterType;

    fn meter(ident: u32) -> MeterDefinition {
        return MeterDefinition::new(0x15B5, ident, MeterType::Electricity, 1);
    }

    #[test]
    fn add_uses_first_empty_slot() {
        let mut r = MeterRegistry::new();
        assert_eq!(r.add(meter(1)).unwrap(), 0);
        assert_eq!(r.add(meter(2)).unwrap(), 1);
        assert_eq!(r.add(meter(3)).unwrap(), 2);

        r.remove(1).unwrap();
        assert_eq!(r.add(meter(4)).unwrap(), 1);
        assert_eq!(r.get(0).unwrap().ident, 1);
        assert_eq!(r.get(1).unwrap().ident, 4);
        assert_eq!(r.get(2).unwrap().ident, 3);
    }

    #[test]
    fn add_rejects_when_full() {
        let mut r = MeterRegistry::new();
        for i in 0..MAX_METERS {
            r.add(meter(i as u32)).unwrap();
        }
        let before = r.clone();
        assert!(matches!(r.add(meter(99)), Err(RegistryError::RegistryFull)));
        assert_eq!(r, before);
    }

    #[test]
    fn duplicates_are_allowed() {
        let mut r = MeterRegistry::new();
        r.add(meter(7)).unwrap();
        r.add(meter(7)).unwrap();
        assert_eq!(r.count(), 2);
    }

    #[test]
    fn remove_empty_slot_is_noop() {
        let mut r = MeterRegistry::new();
        r.add(meter(1)).unwrap();
        let before = r.clone();
        assert_eq!(r.remove(5).unwrap(), None);
        assert_eq!(r, before);
    }

    #[test]
    fn remove_out_of_range() {
        let mut r = MeterRegistry::new();
        assert!(matches!(r.remove(MAX_METERS), Err(RegistryError::InvalidIndex(i)) if i == MAX_METERS));
    }

    #[test]
    fn list_skips_empty_slots() {
        let mut r = MeterRegistry::new();
        r.add(meter(1)).unwrap();
        r.add(meter(2)).unwrap();
        r.add(meter(3)).unwrap();
        r.remove(0).unwrap();

        let listed: Vec<usize> = r.list().iter().map(|(i, _)| *i).collect();
        assert_eq!(listed, vec![1, 2]);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.dat");

        let mut r = MeterRegistry::new();
        r.add(meter(12345678).with_key(MeterDefinition::default_key())).unwrap();
        r.add(MeterDefinition::new(0x1593, 42, MeterType::Heat, 99)).unwrap();
        r.add(meter(3)).unwrap();
        r.remove(1).unwrap();

        r.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), (MAX_METERS * record::RECORD_SIZE) as u64);

        let (loaded, count) = MeterRegistry::load(&path).unwrap();
        assert_eq!(count, 2);
        assert_eq!(loaded, r);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.dat");
        MeterRegistry::new().save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (r, count) = MeterRegistry::load(&dir.path().join("nothing.dat")).unwrap();
        assert_eq!(count, 0);
        assert_eq!(r.list().len(), 0);
    }

    #[test]
    fn load_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meter.dat");

        let mut data = Vec::new();
        data.extend_from_slice(&record::encode(None));
        data.extend_from_slice(&record::encode(Some(&meter(5))));
        data.extend_from_slice(&[0xFF; 3]);
        std::fs::write(&path, data).unwrap();

        let (r, count) = MeterRegistry::load(&path).unwrap();
        assert_eq!(count, 1);
        assert_eq!(r.get(1).unwrap().ident, 5);
        assert_eq!(r.capacity(), MAX_METERS);
    }
}
