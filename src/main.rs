mod config;
mod db;
mod notes;
mod offline;
mod render;

use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use db::Database;
use notes::NoteStore;
use offline::{HttpFetcher, OfflineCache, Registration, Request, SqliteCacheStorage};

#[derive(Parser, Debug)]
#[command(name = "jotter")]
#[command(about = "Short notes that persist locally, with an offline asset shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jotter/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List notes, newest first
  List,
  /// Create a note
  Add {
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
  },
  /// Print one note
  Show { id: String },
  /// Replace the text of a note
  Edit {
    id: String,
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>,
  },
  /// Delete a note
  Rm { id: String },
  /// Manage the offline asset cache
  Offline {
    #[command(subcommand)]
    action: OfflineCommand,
  },
}

#[derive(Subcommand, Debug)]
enum OfflineCommand {
  /// Install the configured version if needed and activate it
  Register,
  /// Pre-cache the manifest into the configured version's bucket
  Install,
  /// Hand control to the installed version and drop other buckets
  Activate,
  /// Show connectivity, versions and buckets
  Status,
  /// List URLs cached by the active version
  Entries,
  /// Request a URL through the controller
  Fetch {
    /// Absolute URL or path relative to the scope
    url: String,
    /// Treat as a top-level navigation
    #[arg(long)]
    navigate: bool,
    /// Write the response body to stdout
    #[arg(long)]
    body: bool,
  },
}

/// Initialize the tracing subscriber: stderr always, rolling file on request.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
  // RUST_LOG controls the level (e.g., RUST_LOG=jotter=debug)
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let (file_layer, guard) = if config.logging.file {
    let dir = config.log_dir()?;
    std::fs::create_dir_all(&dir)?;
    let appender = tracing_appender::rolling::daily(dir, "jotter.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    (
      Some(fmt::layer().with_writer(writer).with_ansi(false)),
      Some(guard),
    )
  } else {
    (None, None)
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .with(filter)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config)?;
  info!("jotter starting");

  match args.command.unwrap_or(Command::List) {
    Command::Offline { action } => run_offline(&config, action).await,
    command => run_notes(&config, command),
  }
}

fn run_notes(config: &Config, command: Command) -> Result<()> {
  let db = Database::open(&config.database_path()?)?;
  let mut store = NoteStore::load(db, &config.notes)?;
  let mut out = io::stdout().lock();

  let notes = match command {
    Command::List => store.list(),
    Command::Add { text } => {
      let notes = store.create(&text.join(" "))?;
      if let Some(note) = store.last_created() {
        writeln!(out, "Created {}", note.id)?;
      }
      notes
    }
    Command::Show { id } => {
      let id = render::resolve_id(&store.list(), &id).unwrap_or(id);
      match store.get(&id) {
        Some(note) => write!(out, "{}", render::render_notes(&[note.clone()], &Local))?,
        None => writeln!(out, "No note with id {id}")?,
      }
      return Ok(());
    }
    Command::Edit { id, text } => {
      let id = resolve_or_warn(&store.list(), id, &mut out)?;
      store.update(&id, &text.join(" "))?
    }
    Command::Rm { id } => {
      let id = resolve_or_warn(&store.list(), id, &mut out)?;
      store.delete(&id)?
    }
    Command::Offline { .. } => unreachable!("offline commands are dispatched separately"),
  };

  write!(out, "{}", render::render_notes(&notes, &Local))?;
  Ok(())
}

/// Expand an id prefix; unknown ids pass through so the store treats them as no-ops.
fn resolve_or_warn(notes: &[notes::Note], id: String, out: &mut impl Write) -> Result<String> {
  match render::resolve_id(notes, &id) {
    Some(full) => Ok(full),
    None => {
      writeln!(out, "No note with id {id}")?;
      Ok(id)
    }
  }
}

async fn run_offline(config: &Config, action: OfflineCommand) -> Result<()> {
  let storage = SqliteCacheStorage::open(&config.database_path()?)?;
  let scope = url::Url::parse(&config.offline.scope)?;
  let fetcher = HttpFetcher::new(&scope, Duration::from_secs(config.offline.timeout_secs))?;
  let controller = OfflineCache::new(storage, fetcher, &config.offline)?;
  let mut out = io::stdout().lock();

  match action {
    OfflineCommand::Register => match controller.register().await? {
      Registration::AlreadyActive => {
        writeln!(out, "{} is already active", controller.bucket_name())?
      }
      Registration::Activated { removed } => {
        writeln!(out, "Activated {}", controller.bucket_name())?;
        for name in removed {
          writeln!(out, "Removed {name}")?;
        }
      }
    },
    OfflineCommand::Install => {
      controller.install().await?;
      writeln!(out, "Installed {}", controller.bucket_name())?;
    }
    OfflineCommand::Activate => {
      let removed = controller.activate()?;
      writeln!(out, "Activated {}", controller.bucket_name())?;
      for name in removed {
        writeln!(out, "Removed {name}")?;
      }
    }
    OfflineCommand::Status => {
      let status = controller.status()?;
      let network = if controller.is_online().await {
        "online"
      } else {
        "offline"
      };
      writeln!(out, "network: {network}")?;
      writeln!(
        out,
        "active:  {}",
        status.active_version.as_deref().unwrap_or("-")
      )?;
      writeln!(
        out,
        "waiting: {}",
        status.waiting_version.as_deref().unwrap_or("-")
      )?;
      writeln!(out, "entries: {}", status.active_entries)?;
      for bucket in status.buckets {
        writeln!(out, "bucket:  {bucket}")?;
      }
    }
    OfflineCommand::Entries => {
      for url in controller.entries()? {
        writeln!(out, "{url}")?;
      }
    }
    OfflineCommand::Fetch {
      url,
      navigate,
      body,
    } => {
      let target = controller.resolve(&url)?;
      let request = if navigate {
        Request::navigate(target)
      } else {
        Request::get(target)
      };
      let outcome = controller.handle_fetch(&request).await?;
      let response = &outcome.response;
      if body {
        out.write_all(&response.body)?;
      } else {
        writeln!(
          out,
          "{} {} ({:?}) {} bytes {}",
          response.status,
          response.response_type.as_str(),
          outcome.source,
          response.body.len(),
          response.url
        )?;
      }
    }
  }

  Ok(())
}
