//! PERMLAY — Attachment Lifecycle Demo CLI
//!
//! Walks a `PermissibleHost` through grant, revoke, conflict resolution, and
//! detachment, printing the attachment and effective permission maps after
//! every step.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- walkthrough
//!   cargo run -p demo -- conflict
//!   cargo run -p demo -- preset --config permlay.toml --preset flight

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use permlay_contracts::error::{PermsError, PermsResult};
use permlay_core::PermissionAttachment;
use permlay_host::{HostConfig, PermissibleHost};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Runtime permission attachments demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "PERMLAY permission attachment demo",
    long_about = "Runs PERMLAY demo scenarios showing case-insensitive grants,\n\
                  per-mutation recalculation, conflict resolution, and removal callbacks."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the walkthrough and conflict scenarios in sequence.
    RunAll,
    /// Grant, overwrite, revoke, and detach a single attachment.
    Walkthrough,
    /// Two attachments granting conflicting values for one permission.
    Conflict,
    /// Load a TOML host config and attach one of its presets.
    Preset {
        /// Path to the host configuration file.
        #[arg(long)]
        config: PathBuf,
        /// Preset id to attach.
        #[arg(long)]
        preset: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug to see every grant and recalculation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::Walkthrough => run_walkthrough(),
        Command::Conflict => run_conflict(),
        Command::Preset { config, preset } => run_preset(config, &preset),
    };

    match result {
        Ok(()) => println!("Done."),
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

fn run_all() -> PermsResult<()> {
    run_walkthrough()?;
    run_conflict()
}

fn run_walkthrough() -> PermsResult<()> {
    section("Walkthrough");

    let host = PermissibleHost::new("player");
    let attachment = host.add_attachment();
    attachment.set_removal_callback(Some(Arc::new(|detached: &PermissionAttachment| {
        println!("  removal callback fired for attachment {}", detached.id());
    })));

    attachment.grant("perms.fly", true)?;
    report("grant perms.fly = true", &host, &attachment)?;

    attachment.grant("Perms.Fly", false)?;
    report("grant Perms.Fly = false", &host, &attachment)?;

    attachment.revoke("nonexistent.key")?;
    report("revoke nonexistent.key", &host, &attachment)?;

    host.remove_attachment(&attachment)?;
    print_map("effective after detach", &host.effective_permissions())?;

    match attachment.grant("perms.fly", true) {
        Err(e @ PermsError::Detached { .. }) => println!("  mutation after detach rejected: {}", e),
        other => other?,
    }
    Ok(())
}

fn run_conflict() -> PermsResult<()> {
    section("Conflict");

    let host = PermissibleHost::new("player");
    let first = host.add_attachment_with("perms.fly", true)?;
    let second = host.add_attachment_with("PERMS.FLY", false)?;

    print_map("first attachment", &first.snapshot())?;
    print_map("second attachment", &second.snapshot())?;
    print_map("effective (later attachment wins)", &host.effective_permissions())?;

    host.remove_attachment(&second)?;
    print_map("effective after removing second", &host.effective_permissions())?;
    Ok(())
}

fn run_preset(path: PathBuf, preset_id: &str) -> PermsResult<()> {
    section("Preset");

    let config = HostConfig::from_file(&path)?;
    let preset = config.preset(preset_id).ok_or_else(|| PermsError::ConfigError {
        reason: format!("no preset '{}' in '{}'", preset_id, path.display()),
    })?;

    let host = PermissibleHost::from_config("player", &config)?;
    print_map("defaults", &host.effective_permissions())?;

    let attachment = host.attach_preset(preset)?;
    info!(preset = %preset.id, attachment_id = %attachment.id(), "preset attached");
    report(&format!("attach preset '{}'", preset.id), &host, &attachment)
}

// ── Output helpers ────────────────────────────────────────────────────────────

fn section(title: &str) {
    println!();
    println!("{}", title);
    println!("{}", "=".repeat(title.len()));
}

fn report(
    step: &str,
    host: &PermissibleHost,
    attachment: &PermissionAttachment,
) -> PermsResult<()> {
    println!("> {} (recalculations: {})", step, host.recalculation_count());
    print_map("attachment", &attachment.snapshot())?;
    print_map("effective", &host.effective_permissions())
}

fn print_map(label: &str, map: &BTreeMap<String, bool>) -> PermsResult<()> {
    let json = serde_json::to_string(map).map_err(|e| PermsError::ConfigError {
        reason: format!("failed to render permissions: {}", e),
    })?;
    println!("  {:<34} {}", label, json);
    Ok(())
}
