//! magicbind
//!
//! Identify files, buffers and standard input with the system libmagic, and
//! manage the magic databases it loads.

mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Command, DetectArgs};
use color_eyre::eyre::{Result, bail};
use config::Config;
use magicbind::{Library, Magic};
use magicbind_native::NativeLibrary;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref())?.with_log_level(cli.log_level.clone());
    init_logging(&config.log_level)?;

    let library = open_library(&config)?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting magicbind");

    match cli.command {
        Command::File {
            paths,
            detect,
            jobs,
        } => cmd_file(library, &config, paths, &detect, jobs).await,
        Command::Buffer { detect } => cmd_buffer(library, &config, &detect).await,
        Command::Check { paths } => cmd_check(library, &config, paths).await,
        Command::Compile { paths } => cmd_compile(library, &config, paths).await,
        Command::Paths => cmd_paths(library, &config),
        Command::Version => cmd_version(library),
        Command::Params => cmd_params(library, &config),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn open_library(config: &Config) -> Result<Arc<dyn Library>> {
    match &config.magic.library {
        Some(path) => Ok(Arc::new(NativeLibrary::open(path)?)),
        None => Ok(magicbind_native::library()?),
    }
}

/// Open a detection context from the configuration and command-line options.
fn open_magic(
    library: Arc<dyn Library>,
    config: &Config,
    detect: Option<&DetectArgs>,
    auto_load: bool,
) -> Result<Magic> {
    let mut flags = config.flags()?;
    let mut paths = config.magic.paths.clone();
    let mut stop_on_errors = config.magic.stop_on_errors;
    if let Some(detect) = detect {
        flags |= detect.flags();
        if !detect.magic_file.is_empty() {
            paths = detect.magic_files();
        }
        stop_on_errors &= !detect.keep_going;
    }

    let mut builder = Magic::builder(library)
        .flags(flags)
        .auto_load(auto_load && config.magic.auto_load)
        .stop_on_errors(stop_on_errors);
    if !paths.is_empty() && auto_load {
        builder = builder.paths(paths);
    }
    let magic = builder.open()?;
    tracing::debug!(capabilities = ?magic.capabilities(), "Opened magic handle");

    for (parameter, value) in config.parameters()? {
        magic.set_parameter(parameter, value)?;
        tracing::debug!(%parameter, value, "Applied parameter");
    }

    Ok(magic)
}

async fn cmd_file(
    library: Arc<dyn Library>,
    config: &Config,
    paths: Vec<PathBuf>,
    detect: &DetectArgs,
    jobs: usize,
) -> Result<()> {
    let magic = open_magic(library, config, Some(detect), true)?;
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in paths.into_iter().enumerate() {
        let magic = magic.clone();
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = magic.file_async(path.clone()).await;
            (index, path, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut failures = 0;
    for (_, path, result) in results {
        match result {
            Ok(detection) => println!("{}: {}", path.display(), detection),
            Err(e) => {
                failures += 1;
                println!("{}: ERROR: {}", path.display(), e);
            }
        }
    }

    if let Some(failure) = magic.take_guard_failure() {
        tracing::warn!(error = %failure, "Side channel was not restored");
    }
    magic.close();

    if failures > 0 {
        bail!("{} of the inputs could not be identified", failures);
    }
    Ok(())
}

async fn cmd_buffer(library: Arc<dyn Library>, config: &Config, detect: &DetectArgs) -> Result<()> {
    let mut data = Vec::new();
    tokio::io::stdin().read_to_end(&mut data).await?;
    tracing::debug!(bytes = data.len(), "Read standard input");

    let magic = open_magic(library, config, Some(detect), true)?;
    let detection = magic.buffer_async(data).await?;
    println!("/dev/stdin: {}", detection);
    magic.close();
    Ok(())
}

async fn cmd_check(library: Arc<dyn Library>, config: &Config, paths: Vec<String>) -> Result<()> {
    let magic = open_magic(library, config, None, false)?;
    let paths = if paths.is_empty() {
        config.magic.paths.clone()
    } else {
        paths
    };
    let valid = magic.check_async(paths).await?;
    magic.close();

    if !valid {
        bail!("Magic database check failed");
    }
    println!("OK");
    Ok(())
}

async fn cmd_compile(library: Arc<dyn Library>, config: &Config, paths: Vec<String>) -> Result<()> {
    let magic = open_magic(library, config, None, false)?;
    let paths = if paths.is_empty() {
        config.magic.paths.clone()
    } else {
        paths
    };
    magic.compile_async(paths).await?;
    magic.close();
    println!("Compiled");
    Ok(())
}

fn cmd_paths(library: Arc<dyn Library>, config: &Config) -> Result<()> {
    let magic = open_magic(library, config, None, false)?;
    let paths = if config.magic.paths.is_empty() {
        magic.paths()?
    } else {
        config.magic.paths.clone()
    };
    for path in paths {
        println!("{}", path);
    }
    magic.close();
    Ok(())
}

fn cmd_version(library: Arc<dyn Library>) -> Result<()> {
    println!("magicbind {}", env!("CARGO_PKG_VERSION"));
    match magicbind::version_string(library.as_ref()) {
        Ok(version) => println!("libmagic {}", version),
        Err(e) => println!("libmagic version unavailable: {}", e),
    }
    Ok(())
}

fn cmd_params(library: Arc<dyn Library>, config: &Config) -> Result<()> {
    let magic = open_magic(library, config, None, false)?;
    for (parameter, value) in magic.parameters()? {
        println!("{:<22} {}", parameter.to_string(), value);
    }
    magic.close();
    Ok(())
}
