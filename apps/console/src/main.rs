use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use client_core::{
    ClientConfig, ClientEvent, DispatchOutcome, FireControlClient, FireRejection, Notification,
    NotificationLevel, Session,
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{fire_blocker, is_confirmation, parse_command, Command, HELP};

#[derive(Parser, Debug)]
struct Args {
    /// TOML settings file (defaults to ./fire_console.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Controller page origin, e.g. http://192.168.4.1:5000.
    #[arg(long)]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(origin) = args.origin {
        settings.origin = origin;
    }
    settings.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("failed to build log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = FireControlClient::start(ClientConfig {
        origin: settings.origin.clone(),
        layout: settings.layout(),
        reconnect: settings.reconnect_policy(),
    })
    .context("failed to start controller client")?;
    info!(origin = %settings.origin, "console: started");

    let printer = tokio::spawn(print_events(client.subscribe_events()));
    println!("{HELP}");

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        let outcome = match command {
            Command::Auth => client.start_auth(),
            Command::Arm(None) => client.toggle_fire_enabled(),
            Command::Arm(Some(enabled)) => client.set_fire_enabled(enabled),
            Command::Fire(target) => {
                if let Some(blocked) = fire_blocker(&client.session(), &target) {
                    println!("{target} {blocked}, nothing sent");
                    continue;
                }
                client.fire(target)
            }
            Command::Reset(target) => client.reset(target),
            Command::ResetAll => {
                prompt("Reset ALL channels? [y/N] ").await?;
                let answer = lines.next_line().await?.unwrap_or_default();
                client.reset_all(|| is_confirmation(&answer))
            }
            Command::Available { nr, available } => {
                if let Err(err) = client.set_available(nr, available).await {
                    warn!(%nr, %err, "console: availability change failed");
                }
                continue;
            }
            Command::Status => {
                print_status(&client.session());
                continue;
            }
            Command::Help => {
                println!("{HELP}");
                continue;
            }
            Command::Quit => break,
        };
        report(outcome);
    }

    info!("console: shutting down");
    printer.abort();
    Ok(())
}

async fn prompt(text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

fn report(outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Sent => {}
        DispatchOutcome::NotConnected => println!("not connected, command dropped"),
        DispatchOutcome::Failed => println!("command could not be sent"),
        DispatchOutcome::Rejected(FireRejection::NotAuthorized) => {
            println!("not authorized, run 'auth' first")
        }
        DispatchOutcome::Rejected(FireRejection::InterlockDisabled) => {
            println!("fire interlock is off, run 'arm on' first")
        }
        DispatchOutcome::Cancelled => println!("cancelled"),
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "console: event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connectivity { connected: true } => println!("[controller] connected"),
        ClientEvent::Connectivity { connected: false } => {
            println!("[controller] disconnected, reconnecting")
        }
        ClientEvent::AuthPrompt { visible: true } => {
            println!("[auth] confirm on the hardware receiver")
        }
        ClientEvent::AuthPrompt { visible: false } => {}
        ClientEvent::AuthorizationChanged(state) => println!("[auth] {state:?}"),
        ClientEvent::FireEnabledChanged(enabled) => {
            println!("[interlock] fire {}", if *enabled { "ENABLED" } else { "disabled" })
        }
        ClientEvent::ChannelsChanged(views) => {
            let ready = views.iter().filter(|view| !view.disabled).count();
            let fired = views.iter().filter(|view| view.state.fired).count();
            println!("[channels] {ready} ready, {fired} fired of {}", views.len());
        }
        ClientEvent::Notification(notification) => print_notification(notification),
    }
}

fn print_notification(notification: &Notification) {
    let tag = match notification.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Info => "info",
        NotificationLevel::Error => "error",
    };
    println!(
        "{} [{tag}] {}",
        notification.at.with_timezone(&Local).format("%H:%M:%S"),
        notification.message
    );
}

fn print_status(session: &Session) {
    println!(
        "connected: {}  authorization: {:?}  fire enabled: {}",
        session.is_connected(),
        session.authorization(),
        session.fire_enabled()
    );
    for view in session.projection() {
        let mut flags = Vec::new();
        if view.state.fired {
            flags.push("fired");
        }
        if !view.state.available {
            flags.push("unavailable");
        }
        if !view.disabled {
            flags.push("READY");
        }
        println!("  {:<28} {}", view.address.to_string(), flags.join(" "));
    }
}
