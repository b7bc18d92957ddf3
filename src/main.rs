use std::{env, fs, io, thread};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use chrono::Local;
use clap::Parser;
use log::{debug, error, info, warn};
use wmbus_monitor::commands::{Command, CommandDispatcher, Flow};
use wmbus_monitor::config::{port_from_arg, Config};
use wmbus_monitor::console::{self, StdinPrompter};
use wmbus_monitor::{AcquisitionLoop, DeviceGateway, MeterRegistry, RadioMode, SimulatedStick, TelemetryLogger, WmbusDriver};

/// Poll a wM-Bus stick for meter readings and log them to CSV/XML
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Serial port, a plain number N means /dev/ttyUSBN
    #[arg(short = 'p', long)]
    port: Option<String>,

    /// Radio mode, S or T
    #[arg(short = 'm', long)]
    mode: Option<String>,

    /// Directory for the log files
    #[arg(short = 'f', long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'i', long)]
    info: bool,
}

fn apply_args(config: &mut Config, args: &Args) -> Result<(), String> {
    if let Some(port) = &args.port {
        config.device.port = port_from_arg(port);
    }
    if let Some(mode) = &args.mode {
        config.device.mode = RadioMode::from_str(mode).ok_or_else(|| format!("Unknown radio mode '{}', use S or T", mode))?;
    }
    if let Some(dir) = &args.data_dir {
        config.logging.data_dir = dir.clone();
    }
    return Ok(());
}

fn run<D: WmbusDriver>(lp: &mut AcquisitionLoop<D>, tick: Duration) {
    let mut stdout = io::stdout();
    let mut dispatcher = CommandDispatcher::new(StdinPrompter, io::stdout());
    let mut interactive = true;

    loop {
        let key = if interactive {
            match console::poll_key(tick) {
                Ok(k) => k,
                Err(e) => {
                    warn!("No interactive console ({}), key commands disabled", e);
                    interactive = false;
                    None
                }
            }
        } else {
            thread::sleep(tick);
            None
        };

        let mut forced = false;
        if let Some(c) = key {
            match Command::from_key(c) {
                Some(command) => match dispatcher.dispatch(lp, command) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Poll) => forced = true,
                    Ok(Flow::Continue) => {}
                    Err(e) => {
                        let _ = console::render_error(&mut stdout, &e.to_string());
                    }
                },
                None => debug!("Ignoring key {:?}", c),
            }
        }

        if let Some(result) = lp.tick(Local::now().naive_local(), forced) {
            match result {
                Ok(report) => {
                    let _ = console::render_pass(&mut stdout, &report, lp.idle_passes());
                }
                Err(e) => error!("Polling the stick failed: {}", e),
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.info {
        "debug".to_string()
    } else {
        env::var("WMBUS_LOG_LEVEL").unwrap_or("info".to_string())
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    if let Err(e) = apply_args(&mut config, &args) {
        error!("{}", e);
        return ExitCode::from(1);
    }

    if let Err(e) = fs::create_dir_all(&config.logging.data_dir) {
        error!("Cannot create data directory {:?}: {}", config.logging.data_dir, e);
        return ExitCode::from(1);
    }

    /* An unreadable meter file is fatal */
    let registry = match MeterRegistry::load(&config.registry.path) {
        Ok((registry, count)) => {
            info!("{} meters loaded from {:?}", count, config.registry.path);
            registry
        }
        Err(e) => {
            error!("Cannot load meters from {:?}: {}", config.registry.path, e);
            return ExitCode::from(1);
        }
    };

    let mut stdout = io::stdout();
    let _ = console::render_intro(&mut stdout, env!("CARGO_PKG_VERSION"));

    let driver = SimulatedStick::new(Duration::from_secs(config.simulator.interval_s));
    let gateway = match DeviceGateway::open(driver, &config.device.port, &config.device.sticks) {
        Ok(g) => g,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    let stick = gateway.stick();

    let logger = TelemetryLogger::new(&config.logging.data_dir, config.logging.format);
    let mut lp = AcquisitionLoop::new(gateway, registry, logger, config.device.mode);
    if config.registry.autosave {
        lp = lp.with_autosave(config.registry.path.clone());
    }

    if let Err(e) = lp.start(config.device.mode) {
        error!("Stick does not report its radio mode: {}", e);
        let _ = lp.shutdown(None);
        return ExitCode::from(1);
    }
    let _ = console::render_device(&mut stdout, stick, &config.device.port, lp.mode());
    let _ = console::render_meter_table(&mut stdout, lp.registry());

    lp.prime(Local::now().naive_local());
    run(&mut lp, Duration::from_millis(config.acquisition.tick_ms));

    info!("Shutting down");
    if let Err(e) = lp.shutdown(Some(&config.registry.path)) {
        error!("Saving meters to {:?} failed: {}", config.registry.path, e);
        return ExitCode::from(1);
    }
    return ExitCode::SUCCESS;
}
