mod config;
mod diagnostic;
mod error;
mod gcode_file;
mod layers;
mod lexer;
mod pattern;
mod select;
mod splice;

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{error::ErrorKind, ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::ChangeConfig;
use gcode_file::GcodeFile;
use pattern::ExtrusionMatch;
use select::{ExplicitValues, PromptKind, TargetSelector};
use splice::Splicer;

/// Insert M600 filament changes at chosen layer heights of a slicer gcode file.
///
/// The slicer must emit "; Layer Z=[layer_z]" as its before-layer-change gcode.
#[derive(Parser, Debug)]
#[command(name = "layerswap", version, about)]
struct Cli {
    /// Gcode file, rewritten in place
    file: PathBuf,

    /// Layer heights to change filament at; prompts when none are given
    #[arg(value_name = "Z")]
    heights: Vec<String>,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ignore commented-out moves when looking for the first extrusion
    #[arg(long)]
    strict: bool,

    /// Ask for one height instead of showing the layer checklist
    #[arg(long)]
    single: bool,

    /// Print the detected layer heights and exit
    #[arg(long, conflicts_with = "dry_run")]
    list: bool,

    /// Print the rewritten gcode instead of overwriting the file
    #[arg(long)]
    dry_run: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn action(&self) -> Action {
        if self.list {
            Action::List
        } else if self.dry_run {
            Action::Print
        } else {
            Action::Overwrite
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    List,
    Print,
    Overwrite,
}

#[derive(Debug)]
enum Error {
    Io(io::Error),
    Config(config::ConfigError),
    Change(error::ChangeError),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<error::ChangeError> for Error {
    fn from(e: error::ChangeError) -> Self {
        Error::Change(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "{}", e),
            Error::Change(e) => write!(f, "{}", e),
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry().with(filter).with(layer).init();
}

/// Config file first, then flags on top
fn settings(cli: &Cli) -> Result<ChangeConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => ChangeConfig::from_file(path)?,
        None => ChangeConfig::default(),
    };
    if cli.strict {
        config.extrusion_match = ExtrusionMatch::Strict;
    }
    if cli.single {
        config.prompt = PromptKind::Single;
    }
    Ok(config)
}

/// Scan, select, resolve and splice. Nothing is written unless every step
/// succeeds.
fn run(
    file: &GcodeFile,
    config: &ChangeConfig,
    selector: &mut dyn TargetSelector,
    action: Action,
    mut out: impl Write,
) -> Result<(), Error> {
    let lines = file.lines();
    let layers = layers::scan_layers(&lines)?;

    if action == Action::List {
        for layer in &layers {
            writeln!(out, "{}\t{}", layer.text, layer.line + 1)?;
        }
        return Ok(());
    }

    info!(selector = selector.name(), layers = layers.len(), "selecting target layers");
    let requested = selector.select(&layers)?;
    let targets = layers::resolve_targets(&requested, &layers)?;
    info!(heights = ?targets.heights(), "changing filament");

    let output = Splicer::new(config.extrusion_match)
        .with_line_ending(file.line_ending())
        .splice(&lines, &targets)?;
    for site in &output.changes {
        info!(
            z = site.z,
            marker = site.marker_line + 1,
            directive = site.directive_line + 1,
            suppressed = site.suppressed,
            "M600 inserted"
        );
    }
    let contents = output.to_string();

    if action == Action::Print {
        out.write_all(&file.encode(&contents))?;
    } else {
        file.overwrite(&contents)?;
    }
    Ok(())
}

/// Explicit heights win; otherwise the configured prompt asks for them
fn choose_selector(heights: &[String], prompt: PromptKind) -> Box<dyn TargetSelector> {
    if heights.is_empty() {
        prompt.terminal_selector()
    } else {
        Box::new(ExplicitValues::new(heights.to_vec()))
    }
}

/// 0 for help/version output, 1 for any other argument error
fn usage_status(e: &clap::Error) -> u8 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => FAILURE,
    }
}

/// A refused transform gets its own status so post-processing hooks can
/// tell it apart from bad arguments or unreadable files.
fn exit_status(e: &Error) -> u8 {
    match e {
        Error::Change(_) => REFUSED,
        Error::Io(_) | Error::Config(_) => FAILURE,
    }
}

const FAILURE: u8 = 1;
const REFUSED: u8 = 2;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_status(&e));
        }
    };
    init_logging(cli.verbose);

    let config = match settings(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(exit_status(&e));
        }
    };

    let file = match GcodeFile::load(&cli.file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", cli.file.display(), e);
            return ExitCode::from(FAILURE);
        }
    };

    if cli.heights.is_empty() && !io::stdin().is_terminal() && cli.action() != Action::List {
        warn!("no layer heights given and stdin is not a terminal");
    }
    let mut selector = choose_selector(&cli.heights, config.prompt);

    match run(&file, &config, selector.as_mut(), cli.action(), io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Error::Change(change) = &e {
                let stderr = io::stderr();
                let color = stderr.is_terminal();
                if diagnostic::write_report(change, &file.source, color, stderr.lock()).is_err() {
                    eprintln!("error: {}", change);
                }
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::from(exit_status(&e))
        }
    }
}
