//! Field diagnostics for the cellular modem.
//!
//! Drives the modem through the same task and AT engine the daemon uses,
//! so a probe that works here works in service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use barrier_monitor::config::{ModemSettings, Settings};
use barrier_monitor::modem::{ModemActor, ModemHandle, ModemOptions, SerialConnector};
use barrier_monitor::tracing::{self, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "barrier-modem-probe")]
#[command(about = "Exercise the barrier-monitor modem from the command line")]
struct Args {
    /// Daemon configuration to take modem settings from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,

    /// Power-cycle the radio (AT+CFUN=1,1) before the first command
    #[arg(long)]
    reset: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report signal quality
    Signal,
    /// Run the initialization sequence only
    Init,
    /// Send one raw AT command and print the reply
    At {
        command: String,
        /// Reply deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Send a command that answers with a "> " prompt, then a body
    Prompt { command: String, body: String },
    /// Send a test SMS
    Sms { recipient: String, text: String },
    /// Activate the data context, print the assigned address, release it
    Attach,
}

fn modem_settings(args: &Args) -> Result<ModemSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            Settings::load(path)
                .with_context(|| format!("loading {}", path.display()))?
                .modem
        }
        None => ModemSettings::default(),
    };

    if let Some(port) = &args.port {
        settings.serial_port = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if args.reset {
        settings.reset_on_init = true;
    }
    Ok(settings)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();
    let args = Args::parse();
    let settings = modem_settings(&args)?;

    info!(port = %settings.serial_port, baud = settings.baud_rate, "Opening modem");
    let cancel = CancellationToken::new();
    let (modem, task) = ModemActor::spawn(
        SerialConnector::from_settings(&settings),
        ModemOptions::from_settings(&settings),
        settings.queue_depth,
        cancel.clone(),
    );

    let outcome = run(&modem, args.command).await;

    drop(modem);
    cancel.cancel();
    let _ = task.await;
    outcome
}

async fn run(modem: &ModemHandle, command: Command) -> Result<()> {
    match command {
        Command::Signal => {
            let quality = modem.signal_quality().await?;
            match quality.dbm() {
                Some(dbm) => println!("rssi {} ({dbm} dBm)", quality.rssi),
                None => println!("no signal"),
            }
            if let Some(ber) = quality.ber {
                println!("ber class {ber}");
            }
        }
        Command::Init => {
            modem.initialize().await?;
            println!("modem initialized");
        }
        Command::At {
            command,
            timeout_ms,
        } => {
            let reply = match timeout_ms {
                Some(ms) => {
                    modem
                        .execute_with_timeout(command, Duration::from_millis(ms))
                        .await?
                }
                None => modem.execute(command).await?,
            };
            println!("{}", reply.trim());
        }
        Command::Prompt { command, body } => {
            let reply = modem.submit_with_prompt(command, body).await?;
            println!("{}", reply.trim());
        }
        Command::Sms { recipient, text } => {
            let receipt = modem.send_sms(recipient, text).await?;
            match receipt.reference {
                Some(reference) => {
                    println!("sent to {} (reference {reference})", receipt.recipient)
                }
                None => println!("sent to {}", receipt.recipient),
            }
        }
        Command::Attach => {
            let address = modem.attach_data().await?;
            println!("data context active, address {address}");
            modem.disconnect().await?;
            println!("data context released");
        }
    }
    Ok(())
}
