//! segwal CLI
//!
//! Command-line interface for inspecting and editing a log directory.

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use segwal::wal::WalRecovery;
use segwal::{Batch, Config, Wal};
use tracing_subscriber::{fmt, EnvFilter};

/// segwal CLI
#[derive(Parser, Debug)]
#[command(name = "segwal-cli")]
#[command(about = "Inspect and edit a segmented write-ahead log")]
#[command(version)]
struct Args {
    /// Log directory
    #[arg(short, long, default_value = "log")]
    dir: String,

    /// Segment size cap in bytes
    #[arg(short, long, default_value = "16384")]
    max_segment_size: u64,

    /// fsync after every single write
    #[arg(short, long)]
    sync_on_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report what recovery would find, without modifying anything
    Verify,

    #[command(flatten)]
    Log(LogCommand),
}

/// Commands that run against an opened log
#[derive(Subcommand, Debug)]
enum LogCommand {
    /// Print index bounds and segments
    Info,

    /// Append one or more entries (several are written as one batch)
    Append {
        /// Payloads to append
        #[arg(required = true)]
        payloads: Vec<String>,
    },

    /// Print the entry at an index
    Read {
        /// The index to read
        index: u64,
    },

    /// Print entries in index order
    Scan {
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Discard every entry before an index
    TruncateFront {
        /// New first index
        index: u64,
    },
}

fn main() -> ExitCode {
    // Logs go to stderr so command output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,segwal=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> segwal::Result<()> {
    let config = Config::builder()
        .base_path(&args.dir)
        .max_segment_size(args.max_segment_size)
        .sync_on_write(args.sync_on_write)
        .build();

    match args.command {
        Commands::Verify => verify(&config.base_path),
        Commands::Log(command) => {
            let wal = Wal::open(config)?;
            execute(&wal, command)?;
            wal.close()
        }
    }
}

fn verify(dir: &Path) -> segwal::Result<()> {
    let result = WalRecovery::verify(dir)?;
    println!("segments:        {}", result.segments_loaded);
    println!("entries:         {}", result.entries_recovered);
    println!("empty segments:  {}", result.empty_segments);
    println!("superseded:      {}", result.superseded_segments);
    println!("torn tail:       {}", result.was_truncated);
    println!("bytes discarded: {}", result.bytes_discarded);
    Ok(())
}

fn execute(wal: &Wal, command: LogCommand) -> segwal::Result<()> {
    match command {
        LogCommand::Info => print!("{}", wal),
        LogCommand::Append { payloads } => {
            let first = wal.last_index()?;
            if let [payload] = payloads.as_slice() {
                wal.write(payload.as_bytes())?;
            } else {
                let batch: Batch = payloads.into_iter().collect();
                wal.write_batch(&batch)?;
            }
            println!("appended {}..{}", first, wal.last_index()?);
        }
        LogCommand::Read { index } => {
            let payload = wal.read(index)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        LogCommand::Scan { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut index = wal.first_index()?;
            let mut printed = 0;
            wal.scan(|payload| {
                if printed >= limit {
                    return false;
                }
                println!("{}\t{}", index, String::from_utf8_lossy(payload));
                index += 1;
                printed += 1;
                true
            })?;
        }
        LogCommand::TruncateFront { index } => {
            wal.truncate_front(index)?;
            println!("first index is now {}", wal.first_index()?);
        }
    }
    Ok(())
}
