use std::io::Write;
use log::{info, warn};
use thiserror::Error;
use crate::acquisition::{AcquisitionError, AcquisitionLoop};
use crate::console;
use crate::gateway::{GatewayError, WmbusDriver};
use crate::models::{manufacturer_code, MeterDefinition, RadioMode, KEY_LENGTH};
use crate::registry::RegistryError;

pub mod prompt;

use prompt::{KeyChoice, Prompter};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Input closed")]
    InputClosed,
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Console output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot serialize stick status: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    AddMeter,
    RemoveMeter,
    ListMeters,
    ModeS2,
    ModeT2,
    Update,
    LastError,
    Status,
    Quit,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        return match key {
            'a' => Some(Command::AddMeter),
            'r' => Some(Command::RemoveMeter),
            'l' => Some(Command::ListMeters),
            's' => Some(Command::ModeS2),
            't' => Some(Command::ModeT2),
            'u' => Some(Command::Update),
            'h' => Some(Command::LastError),
            'x' => Some(Command::Status),
            'q' | console::ESCAPE => Some(Command::Quit),
            _ => None,
        };
    }
}

/// What the main loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Run an acquisition pass now
    Poll,
    Quit,
}

pub struct CommandDispatcher<P: Prompter, W: Write> {
    prompter: P,
    out: W,
}

impl<P: Prompter, W: Write> CommandDispatcher<P, W> {
    pub fn new(prompter: P, out: W) -> Self {
        return CommandDispatcher { prompter, out };
    }

    pub fn output(&self) -> &W {
        return &self.out;
    }

    fn ask(&mut self, prompt: &str) -> Result<String, CommandError> {
        return self.prompter.read_line(prompt).ok_or(CommandError::InputClosed);
    }

    pub fn dispatch<D: WmbusDriver>(&mut self, lp: &mut AcquisitionLoop<D>, command: Command) -> Result<Flow, CommandError> {
        match command {
            Command::AddMeter => self.add_meter(lp)?,
            Command::RemoveMeter => self.remove_meter(lp)?,
            Command::ListMeters => console::render_meter_table(&mut self.out, lp.registry())?,
            Command::ModeS2 => self.switch_mode(lp, RadioMode::S2)?,
            Command::ModeT2 => self.switch_mode(lp, RadioMode::T2)?,
            Command::Update => return Ok(Flow::Poll),
            Command::LastError => {
                let (code, text) = lp.last_error();
                writeln!(self.out, "Last stick error {}: {}", code, text)?;
            }
            Command::Status => {
                let status = lp.status()?;
                writeln!(self.out, "{}", serde_json::to_string_pretty(&status)?)?;
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        return Ok(Flow::Continue);
    }

    fn read_key(&mut self) -> Result<[u8; KEY_LENGTH], CommandError> {
        let choice = self.ask("AES key (0 = none, 1 = default key, 2 = enter key): ")?;
        return match KeyChoice::from_str(&choice) {
            Some(KeyChoice::Zero) => Ok([0; KEY_LENGTH]),
            Some(KeyChoice::Default) => Ok(MeterDefinition::default_key()),
            Some(KeyChoice::Custom) => {
                let text = self.ask("Key (32 hex digits): ")?;
                match prompt::parse_key(&text) {
                    Some(key) => Ok(key),
                    None => {
                        writeln!(self.out, "Key must be 32 hex digits, using an all zero key")?;
                        Ok([0; KEY_LENGTH])
                    }
                }
            }
            None => {
                writeln!(self.out, "Unknown choice, using an all zero key")?;
                Ok([0; KEY_LENGTH])
            }
        };
    }

    fn add_meter<D: WmbusDriver>(&mut self, lp: &mut AcquisitionLoop<D>) -> Result<(), CommandError> {
        if lp.meter_count() >= lp.registry().capacity() {
            writeln!(self.out, "All {} Meters defined.", lp.registry().capacity())?;
            return Err(AcquisitionError::Registry(RegistryError::RegistryFull).into());
        }
        writeln!(self.out, "Add meter")?;

        let text = self.ask("Manufacturer (hex id or 3 letter code): ")?;
        let manufacturer = prompt::parse_manufacturer(&text)
            .ok_or_else(|| CommandError::InvalidInput(format!("manufacturer '{}'", text.trim())))?;

        let text = self.ask("Ident (up to 8 digits): ")?;
        let ident = prompt::parse_ident(&text)
            .ok_or_else(|| CommandError::InvalidInput(format!("ident '{}'", text.trim())))?;

        let text = self.ask("Type (2 = electricity, 3 = gas, 4 = heat, 7 = water): ")?;
        let (meter_type, known) = prompt::parse_meter_type(&text);
        if !known {
            writeln!(self.out, "Unknown type, using electricity")?;
        }

        let text = self.ask("Version (up to 2 digits): ")?;
        let version = prompt::parse_version(&text)
            .ok_or_else(|| CommandError::InvalidInput(format!("version '{}'", text.trim())))?;

        let key = self.read_key()?;
        let meter = MeterDefinition::new(manufacturer, ident, meter_type, version).with_key(key);
        info!("Adding meter {} ({})", meter.label(), manufacturer_code(manufacturer));

        let slot = lp.add_meter(meter)?;
        writeln!(self.out, "Meter stored as #{}", slot + 1)?;
        console::render_meter_table(&mut self.out, lp.registry())?;
        return Ok(());
    }

    fn remove_meter<D: WmbusDriver>(&mut self, lp: &mut AcquisitionLoop<D>) -> Result<(), CommandError> {
        console::render_meter_table(&mut self.out, lp.registry())?;
        if lp.meter_count() == 0 {
            return Ok(());
        }

        let text = self.ask("Enter Meterindex to remove: ")?;
        let number: usize = text.trim().parse()
            .map_err(|_| CommandError::InvalidInput(format!("meter number '{}'", text.trim())))?;
        if number == 0 {
            return Err(CommandError::InvalidInput("meter numbers start at 1".to_string()));
        }

        match lp.remove_meter(number - 1)? {
            Some(m) => {
                info!("Removed meter {}", m.label());
                writeln!(self.out, "Meter #{} removed", number)?;
            }
            None => {
                warn!("Meter #{} was not defined", number);
                writeln!(self.out, "Meter #{} was not defined", number)?;
            }
        }
        console::render_meter_table(&mut self.out, lp.registry())?;
        return Ok(());
    }

    fn switch_mode<D: WmbusDriver>(&mut self, lp: &mut AcquisitionLoop<D>, mode: RadioMode) -> Result<(), CommandError> {
        let now = lp.switch_mode(mode)?;
        writeln!(self.out, "wM-Bus {} mode", now.to_string())?;
        return Ok(());
    }
}
