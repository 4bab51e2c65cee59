use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "buddyzip")]
#[command(version)]
#[command(about = "Add, remove and extract ZIP entries in place", long_about = None)]
#[command(after_help = "Examples:\n  \
  buddyzip add assets.zip textures/ --level 9   add a directory tree\n  \
  buddyzip remove assets.zip 'textures/*.tga'   remove matching entries\n  \
  buddyzip extract -p assets.zip config.json    send one entry to stdout")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Log library activity at debug level
    #[arg(long = "verbose-log", global = true)]
    pub verbose_log: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List entries (short format)
    #[command(visible_alias = "l")]
    List {
        /// ZIP file path
        #[arg(value_name = "FILE")]
        file: String,

        /// List verbosely
        #[arg(short = 'v')]
        verbose: bool,
    },

    /// Add files or directory trees, replacing entries with the same name
    #[command(visible_alias = "a")]
    Add {
        /// ZIP file path (created if missing)
        #[arg(value_name = "FILE")]
        file: String,

        /// Files or directories to add
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<String>,

        /// Prepend this directory to every entry name
        #[arg(long, value_name = "DIR")]
        prefix: Option<String>,

        /// Compression level (0-9)
        #[arg(long, value_name = "N", default_value_t = 7,
              value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// Remove entries matching names or patterns
    #[command(visible_alias = "rm")]
    Remove {
        /// ZIP file path
        #[arg(value_name = "FILE")]
        file: String,

        /// Entry names or glob patterns
        #[arg(value_name = "FILES", required = true)]
        files: Vec<String>,
    },

    /// Extract entries (default: all)
    #[command(visible_alias = "x")]
    Extract(ExtractArgs),

    /// Open for writing, normalizing the layout, and report it
    Repair {
        /// ZIP file path
        #[arg(value_name = "FILE")]
        file: String,
    },
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || matches!(&self.command, Command::Extract(args) if args.pipe)
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
