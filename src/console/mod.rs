use std::io::{self, Write};
use std::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crate::acquisition::PassReport;
use crate::commands::prompt::Prompter;
use crate::gateway::StickKind;
use crate::models::{manufacturer_code, RadioMode};
use crate::registry::MeterRegistry;

/// Character handed to `Command::from_key` for the escape key
pub const ESCAPE: char = '\x1b';

/// Wait up to `timeout` for a single key press. Raw mode is only active while
/// waiting, prompts run in the normal line mode. Ctrl-C counts as quit.
pub fn poll_key(timeout: Duration) -> io::Result<Option<char>> {
    enable_raw_mode()?;
    let key = read_key(timeout);
    disable_raw_mode()?;
    return key;
}

fn read_key(timeout: Duration) -> io::Result<Option<char>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }
        return Ok(match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some('q'),
            KeyCode::Char(c) => Some(c.to_ascii_lowercase()),
            KeyCode::Esc => Some(ESCAPE),
            _ => None,
        });
    }
    return Ok(None);
}

/// Line input on stdin
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        if io::stdout().flush().is_err() {
            return None;
        }
        let mut line = String::new();
        return match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        };
    }
}

pub fn render_intro(out: &mut dyn Write, version: &str) -> io::Result<()> {
    writeln!(out, "{}", format!("wM-Bus meter monitor {}", version).bold())?;
    writeln!(out)?;
    writeln!(out, "  a  add meter          r  remove meter")?;
    writeln!(out, "  l  list meters        u  update (poll now)")?;
    writeln!(out, "  s  S2 mode            t  T2 mode")?;
    writeln!(out, "  h  last stick error   x  stick status")?;
    writeln!(out, "  q  quit (also Esc)")?;
    writeln!(out)?;
    return out.flush();
}

pub fn render_device(out: &mut dyn Write, stick: StickKind, port: &str, mode: RadioMode) -> io::Result<()> {
    writeln!(out, "{} found on {}, wM-Bus {} mode", stick.to_string().green(), port, mode.to_string())?;
    return out.flush();
}

pub fn render_meter_table(out: &mut dyn Write, registry: &MeterRegistry) -> io::Result<()> {
    let meters = registry.list();
    if meters.is_empty() {
        writeln!(out, "No Meters defined.")?;
        return out.flush();
    }

    writeln!(out, "{}", format!("{:>3}  {:<14} {:<9} {:<12} {:<4} {}", "#", "Manufacturer", "Ident", "Type", "Ver", "Key").bold())?;
    for (slot, m) in meters {
        writeln!(out, "{:>3}  0x{:04x} ({})  {:08}  {:<12} {:02}   {}",
                 slot + 1,
                 m.manufacturer_id,
                 manufacturer_code(m.manufacturer_id),
                 m.ident,
                 m.meter_type.to_string(),
                 m.version,
                 hex::encode_upper(m.key))?;
    }
    return out.flush();
}

/// A heartbeat dot for idle passes, a line per meter otherwise
pub fn render_pass(out: &mut dyn Write, report: &PassReport, idle_passes: u32) -> io::Result<()> {
    if report.is_heartbeat() {
        if idle_passes == 1 {
            writeln!(out)?;
        }
        write!(out, "{}", ".".yellow())?;
        return out.flush();
    }

    for m in report.meters.iter() {
        let line = format!("#{} {} {} {:.1}  {} RSSI {} dBm  #{}",
                           m.slot + 1,
                           manufacturer_code(m.meter.manufacturer_id),
                           m.meter.label(),
                           m.value,
                           m.encryption.to_string(),
                           m.rssi_dbm,
                           m.access_number);
        if m.logged {
            writeln!(out, "{}", line.green())?;
        } else {
            writeln!(out, "{} {}", line.green(), "(not logged)".red())?;
        }
    }
    for (slot, e) in report.failed.iter() {
        writeln!(out, "{}", format!("#{} reading failed: {}", slot + 1, e).red())?;
    }
    return out.flush();
}

pub fn render_error(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "{}", message.red())?;
    return out.flush();
}
