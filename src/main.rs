mod commands;

use clap::{Parser, Subcommand};
use gpxtagger::{Settings, TrackId};
use gpxtagger::config::{DEFAULT_CAPACITY, DEFAULT_TIMEZONE};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "gpxtagger",
    about = "Find where photos were taken by matching their timestamps against GPX track logs"
)]
struct Cli {
    /// Directory holding gpx.xsd
    #[arg(long, global = true, env = "GPXTAGGER_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Maximum number of tracks kept at once
    #[arg(long, global = true, env = "GPXTAGGER_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// IANA timezone the camera clock was set to
    #[arg(long, global = true, env = "GPXTAGGER_TZ", default_value = DEFAULT_TIMEZONE)]
    tz: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List the tracks in GPX files with their time window and length")]
    Tracks {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    #[command(about = "Interpolate the position at a local time, e.g. \"2023-06-01 14:30:00\"")]
    Locate {
        #[arg(long)]
        at: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    #[command(about = "Combine the tracks of several GPX files into one document")]
    Merge {
        /// Track id to leave out, as listed by `tracks`
        #[arg(long)]
        exclude: Vec<TrackId>,
        /// Write here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    #[command(about = "Manage a bookmarks file")]
    Bookmarks {
        file: PathBuf,
        #[command(subcommand)]
        action: commands::bookmarks::Action,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let settings = Settings {
        data_dir: cli.data_dir,
        capacity: cli.capacity,
        timezone: cli.tz,
    };

    match cli.command {
        Commands::Tracks { files } => commands::tracks::tracks_command(&settings, &files),
        Commands::Locate { at, files } => commands::locate::locate_command(&settings, &at, &files),
        Commands::Merge {
            exclude,
            output,
            files,
        } => commands::merge::merge_command(&settings, &exclude, output.as_deref(), &files),
        Commands::Bookmarks { file, action } => {
            commands::bookmarks::bookmarks_command(&file, action)
        }
    }
}
