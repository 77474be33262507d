//! NoteDesk command-line client.
//!
//! # Responsibility
//! - Drive a `NotesSession` against the configured note service.
//! - Keep stdout limited to command output; diagnostics go to the logger.

use clap::{Parser, Subcommand};
use log::error;
use notedesk_core::{
    init_logging, ExportOptions, NoteId, NoteRecord, NotesConfig, NotesSession, Theme,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "notedesk", version, about = "Manage notes on a NoteDesk server")]
struct Cli {
    /// Log at the configured level on stderr instead of warnings only.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all notes.
    List,
    /// Print one note.
    Show { id: i64 },
    /// Create a note.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    /// Replace the title and/or content of a note.
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a note permanently.
    Delete {
        id: i64,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Export a note as a PDF document.
    Export {
        id: i64,
        /// Output directory; defaults to NOTEDESK_EXPORT_DIR.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
        /// Document heading; defaults to the note title.
        #[arg(long)]
        title: Option<String>,
        /// Include the last-updated time under the heading.
        #[arg(long)]
        timestamp: bool,
        #[arg(long, default_value = "light")]
        theme: Theme,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match NotesConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("notedesk: {err}");
            return ExitCode::from(2);
        }
    };

    let mut logging = config.logging();
    if logging.log_dir.is_none() && !cli.verbose {
        logging.level = "warn".to_string();
    }
    if let Err(err) = init_logging(&logging) {
        eprintln!("notedesk: {err}");
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("notedesk: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=core status=error");
            eprintln!("notedesk: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &NotesConfig) -> Result<(), Box<dyn Error>> {
    if let Command::Delete { id, yes: false } = &command {
        return Err(format!("refusing to delete note {id} without --yes").into());
    }

    let session = NotesSession::from_config(config)?;
    let snapshot = session.refresh().await?;

    match command {
        Command::List => {
            if snapshot.records.is_empty() {
                println!("no notes");
            }
            for note in snapshot.records.iter() {
                print_row(note);
            }
        }
        Command::Show { id } => {
            let id = NoteId(id);
            session.open_view(id)?;
            if let Some(note) = session.cache().find(id) {
                println!("# {}", note.title);
                println!(
                    "created {}  updated {}",
                    note.created_at.to_rfc3339(),
                    note.updated_at.to_rfc3339()
                );
                println!();
                println!("{}", note.content);
            }
            session.close()?;
        }
        Command::Add { title, content } => {
            session.open_add()?;
            session.edit_draft(title, content)?;
            if let Some(note) = session.submit().await?.applied() {
                println!("created note {}", note.id);
            }
        }
        Command::Edit { id, title, content } => {
            let id = NoteId(id);
            session.open_edit(id)?;
            let seeded = session.dialog().draft().cloned().unwrap_or_default();
            session.edit_draft(
                title.unwrap_or(seeded.title),
                content.unwrap_or(seeded.content),
            )?;
            if let Some(note) = session.submit().await?.applied() {
                println!("updated note {} at {}", note.id, note.updated_at.to_rfc3339());
            }
        }
        Command::Delete { id, .. } => {
            if session.delete(NoteId(id)).await?.is_applied() {
                println!("deleted note {id}");
            }
        }
        Command::Export {
            id,
            out,
            title,
            timestamp,
            theme,
        } => {
            let options = ExportOptions {
                title,
                include_timestamp: timestamp,
                theme,
            };
            let artifact = session.export(NoteId(id), &options)?;
            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let path = artifact.write_to_dir(&dir)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn print_row(note: &NoteRecord) {
    let preview = note.preview().unwrap_or_default();
    println!(
        "{:>5}  {}  {}  {}",
        note.id,
        note.updated_at.format("%Y-%m-%d %H:%M"),
        note.title,
        preview
    );
}
