//! RethinkDB pull/sync tool
//!
//! Dumps a remote database over an SSH tunnel (or a local database
//! directly) and replays the per-table exports into a local database.

// rethinksync/src/main.rs
mod config;
mod db;
mod dump;
mod errors;
mod pipeline;
mod restore;
mod tunnel;
mod workspace;

use anyhow::{Context, Result};
use config::{Overrides, Task};
use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let task = match choice.as_str() {
        "1" | "pull" => Task::Pull,
        "2" | "sync" => Task::Sync,
        _ => {
            println!("❌ Invalid choice. Please enter '1' (pull) or '2' (sync).");
            anyhow::bail!("Invalid task choice");
        }
    };

    let cfg = config::resolve(task, &Overrides::default())
        .context("Failed to resolve run configuration")?;

    if !cfg.force && !cfg.fetch_only && !confirm_overwrite(&cfg.local_db)? {
        println!("Aborted.");
        return Ok(());
    }

    match cfg.task {
        Task::Pull => {
            println!(
                "🚀 Pulling '{}' into local database '{}'...",
                cfg.remote_db, cfg.local_db
            );
            pipeline::run_pull(&cfg).await.context("Pull failed")?;
        }
        Task::Sync => {
            println!(
                "🔄 Syncing local database '{}' into '{}'...",
                cfg.remote_db, cfg.local_db
            );
            pipeline::run_local_sync(&cfg).await.context("Sync failed")?;
        }
    }
    Ok(())
}

/// Prompts the user to select a task when none was given on the command
/// line.
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Pull remote database (or type 'pull')");
    println!("2. Sync local database to local database (or type 'sync')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

fn confirm_overwrite(local_db: &str) -> Result<bool> {
    use std::io::{Write, stdin, stdout};

    print!("This will overwrite tables in local database '{local_db}'. Continue? [y/N] ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
