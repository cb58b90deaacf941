//! Command-line interface for barrier-monitor.
//!
//! Queries the running daemon through its HTTP API.

use std::env;

use anyhow::Result;

use barrier_monitor::api_client::{self, types::CircuitView};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: barrier-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status          Show every circuit");
        eprintln!("  circuit <id>    Show one circuit");
        eprintln!("  signal          Show modem signal quality");
        eprintln!();
        eprintln!("Environment:");
        eprintln!(
            "  BARRIER_API_URL    API base URL (default: {})",
            api_client::DEFAULT_BASE_URL
        );
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "circuit" => match args.get(2) {
            Some(id) => cmd_circuit(id).await?,
            None => {
                eprintln!("Usage: barrier-cli circuit <id>");
                std::process::exit(1);
            }
        },
        "signal" => cmd_signal().await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring BARRIER_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("BARRIER_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

fn print_circuit(circuit: &CircuitView) {
    let name = match &circuit.description {
        Some(description) => format!("{} ({})", circuit.id, description),
        None => circuit.id.clone(),
    };
    let state = circuit.state.as_deref().unwrap_or("UNKNOWN");

    print!("  - {name}: {state}");
    if let Some(secs) = circuit.fault_duration_secs {
        print!(" for {secs} s");
    }
    println!(", {} alerts today", circuit.notifications_sent_today);

    if circuit.consecutive_read_failures > 0 {
        println!(
            "      input failing ({} consecutive reads)",
            circuit.consecutive_read_failures
        );
    }
}

/// Print a summary of the daemon and its circuits.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let state = client.get_status().await?;

    println!("Version: {}", state.version);
    println!("Uptime:  {} s", state.uptime_secs);
    println!("SMS:     {}", if state.sms_enabled { "enabled" } else { "disabled" });

    if state.circuits.is_empty() {
        println!("Circuits: (none)");
    } else {
        println!("Circuits:");
        for circuit in &state.circuits {
            print_circuit(circuit);
        }
    }

    Ok(())
}

async fn cmd_circuit(id: &str) -> Result<()> {
    let client = make_client();
    let circuit = client.get_circuit(id).await?;
    print_circuit(&circuit);
    if let Some(age) = circuit.last_sample_age_ms {
        println!("      last sample {age} ms ago");
    }
    Ok(())
}

async fn cmd_signal() -> Result<()> {
    let client = make_client();
    let signal = client.get_signal().await?;

    match signal.dbm {
        Some(dbm) => println!("Signal: rssi {} ({dbm} dBm)", signal.rssi),
        None => println!("Signal: none"),
    }
    if let Some(ber) = signal.ber {
        println!("BER class: {ber}");
    }
    Ok(())
}
