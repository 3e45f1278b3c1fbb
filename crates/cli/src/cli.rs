//! Command-line interface for magicbind.

use clap::{Args, Parser, Subcommand};
use magicbind::Flags;
use std::path::PathBuf;

/// magicbind - identify files with libmagic
#[derive(Debug, Parser)]
#[command(name = "magicbind")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "MAGICBIND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "MAGICBIND_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Identify files
    File {
        /// Files to identify
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        detect: DetectArgs,

        /// Number of files identified concurrently
        #[arg(short, long, default_value = "4")]
        jobs: usize,
    },

    /// Identify data read from standard input
    Buffer {
        #[command(flatten)]
        detect: DetectArgs,
    },

    /// Validate magic databases (default: the configured paths)
    Check {
        paths: Vec<String>,
    },

    /// Compile magic databases into .mgc files
    Compile {
        paths: Vec<String>,
    },

    /// Show the database paths that would be loaded
    Paths,

    /// Show the libmagic version
    Version,

    /// Show every parameter the linked libmagic supports
    Params,
}

/// Options shared by the detection commands.
#[derive(Debug, Clone, Default, Args)]
pub struct DetectArgs {
    /// Report MIME type and encoding
    #[arg(short = 'i', long)]
    pub mime: bool,

    /// Report MIME type only
    #[arg(long)]
    pub mime_type: bool,

    /// Report MIME encoding only
    #[arg(long)]
    pub mime_encoding: bool,

    /// Report valid extensions
    #[arg(long)]
    pub extension: bool,

    /// Report every match, not just the first
    #[arg(long = "continue")]
    pub continue_: bool,

    /// Do not escape unprintable characters
    #[arg(short, long)]
    pub raw: bool,

    /// Let libmagic print debugging output
    #[arg(short, long)]
    pub debug: bool,

    /// Treat OS errors while opening files as errors
    #[arg(short, long)]
    pub error: bool,

    /// Print libmagic's error text for unreadable files instead of failing
    #[arg(short, long)]
    pub keep_going: bool,

    /// Magic database to use instead of the configured ones (repeatable)
    #[arg(short, long = "magic-file")]
    pub magic_file: Vec<PathBuf>,
}

impl DetectArgs {
    /// Flags selected on the command line.
    pub fn flags(&self) -> Flags {
        let pairs = [
            (self.mime, Flags::MIME),
            (self.mime_type, Flags::MIME_TYPE),
            (self.mime_encoding, Flags::MIME_ENCODING),
            (self.extension, Flags::EXTENSION),
            (self.continue_, Flags::CONTINUE),
            (self.raw, Flags::RAW),
            (self.debug, Flags::DEBUG),
            (self.error, Flags::ERROR),
        ];
        pairs
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(Flags::NONE, |acc, (_, flag)| acc | flag)
    }

    /// `--magic-file` values as database paths.
    pub fn magic_files(&self) -> Vec<String> {
        self.magic_file
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}
