/*!
 * Command-line interface for mastersd
 */

use std::io;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use mastersd::config::{Args, Command, Config};
use mastersd::report::{FolderReport, ReportFormat, Reporter, StatusReport};
use mastersd::transport::{HttpTransport, Transport};
use mastersd::{logging, Controller, MasterSd, MasterSdError};

fn main() -> io::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if let Some(shell) = args.generate {
        let mut command = Args::command();
        clap_complete::generate(shell, &mut command, "mastersd", &mut io::stdout());
        return Ok(());
    }

    // Create and validate configuration
    let config = Config::from_args(args);
    logging::init(&config.log);
    config.validate()?;

    let mut transport = HttpTransport::new(&config.base_url, config.timeout)
        .map_err(MasterSdError::from)?
        .with_upload_timeout(config.upload_timeout);
    if let Some(key) = &config.api_key {
        transport = transport.with_api_key(key.clone());
    }

    let mut client = MasterSd::new(transport);
    let reporter = Reporter::new(if config.json {
        ReportFormat::Json
    } else {
        ReportFormat::ConsoleTable
    });

    let result = run(&config, &mut client, &reporter);

    // Give the printer its card back unless asked not to
    if config.needs_card() && !config.keep_control && client.session().holds_card() {
        info!("Returning SD card control to the printer");
        if let Err(e) = client.switch_control() {
            warn!("Failed to return control: {}", e);
            eprintln!("Warning: SD card is still held by MasterSD: {}", e);
        }
    }

    result.map_err(io::Error::from)
}

fn run<T: Transport>(
    config: &Config,
    client: &mut MasterSd<T>,
    reporter: &Reporter,
) -> mastersd::Result<()> {
    client.refresh_ports()?;
    client.connect(&config.ports)?;

    if config.needs_card() {
        take_control(client)?;
    }

    match &config.command {
        Command::Status => print_status(config, client, reporter)?,
        Command::Switch => {
            client.switch_control()?;
            print_status(config, client, reporter)?;
        }
        Command::Disconnect => {
            client.disconnect()?;
            println!("Disconnected from MasterSD");
        }
        Command::Ls { path } => {
            client.enter(path)?;
            let store = client.store();
            let report = FolderReport {
                breadcrumb: store.breadcrumb(store.active_folder()),
                view: store.active_view()?,
                space: store.current_space(),
            };
            println!("{}", reporter.folder_report(&report)?);
        }
        Command::Mkdir { parent, name } => {
            if let Some(path) = client.mkdir(parent, name)?.applied() {
                println!("Created {}", path);
            }
        }
        Command::Rm { path } => {
            client.delete(path)?;
            println!("Deleted {}", path);
        }
        Command::Rmdir { path } => {
            client.rmdir(path)?;
            println!("Deleted {} and everything in it", path);
        }
        Command::Put { file, to, run } => {
            let progress = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
            {
                progress.set_style(style);
            }
            progress.enable_steady_tick(Duration::from_millis(100));
            progress.set_message(format!("Writing {} to {}", file.display(), to));

            let outcome = client.upload(file, to, *run);
            progress.finish_and_clear();

            if let Some(written) = outcome?.applied() {
                println!("Wrote {}/{}", to, written.name);
                if written.autorun {
                    println!("Printing started, the SD card is back with the printer");
                }
            }
        }
    }

    Ok(())
}

/// Make sure MasterSD holds the card before touching it
fn take_control<T: Transport>(client: &mut MasterSd<T>) -> mastersd::Result<()> {
    match client.session().controller() {
        Some(Controller::MasterDevice) => Ok(()),
        Some(Controller::Host) => {
            info!("Taking SD card control from the printer");
            client.switch_control()?;
            Ok(())
        }
        Some(Controller::Unknown) => Err(MasterSdError::ControlUnavailable),
        None => Err(MasterSdError::NotConnected),
    }
}

fn print_status<T: Transport>(
    config: &Config,
    client: &MasterSd<T>,
    reporter: &Reporter,
) -> mastersd::Result<()> {
    let space = client
        .store()
        .is_loaded()
        .then(|| client.store().current_space());
    let report = StatusReport::new(&config.base_url, client.session().controller(), space);
    println!("{}", reporter.status_report(&report)?);
    Ok(())
}
