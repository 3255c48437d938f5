// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `ghostctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ghostctl",
    version,
    about = "Install, operate and back up a containerized Ghostwriter deployment.",
    long_about = None
)]
pub struct CliArgs {
    /// Target the development environment instead of production.
    #[arg(long, global = true)]
    pub dev: bool,

    /// Installation directory holding the compose descriptors and `.env`.
    ///
    /// Default: `GHOSTCTL_ROOT`, else the directory of the ghostctl binary.
    #[arg(long, global = true, value_name = "DIR", env = "GHOSTCTL_ROOT")]
    pub root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GHOSTCTL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the containers and perform first-time setup.
    Install,

    /// Rebuild the containers (for upgrades) and re-seed the database.
    #[command(alias = "upgrade")]
    Build {
        /// Skip re-seeding the database after the rebuild.
        #[arg(long)]
        skip_seed: bool,
    },

    /// Start stopped containers.
    Start,

    /// Stop running containers without removing them.
    Stop,

    /// Restart all containers.
    Restart,

    /// Create and start containers in the background.
    Up,

    /// Stop and remove containers.
    Down {
        /// Also delete the data volumes. Irreversible.
        #[arg(long)]
        volumes: bool,
    },

    /// Remove containers, images and volumes of the environment.
    Uninstall {
        /// Do not ask for confirmation.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Back up the database and media files into the backups volume.
    Backup(BackupArgs),

    /// Restore a database backup and, optionally, a media archive.
    Restore {
        /// Database backup file name inside the backups volume.
        dump: String,

        /// Media archive file name inside the backups volume.
        #[arg(long, value_name = "FILE")]
        media: Option<String>,

        /// Do not ask for confirmation.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Print recent log output of one container, or `all`.
    Logs {
        /// Container name (`django`, `ghostwriter_postgres`, `all`, ...).
        container: String,

        /// Number of lines to display per container.
        #[arg(long, short = 'l', default_value_t = 500)]
        lines: usize,
    },

    /// Check containers and application services.
    #[command(alias = "healthcheck")]
    Health,

    /// List the running deployment containers.
    Running,

    /// Display or adjust the deployment configuration.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Upgrade the database data volume to the server's major version.
    ///
    /// Take a backup first.
    PgUpgrade {
        /// Do not ask for confirmation.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Deduplicate tags and optionally remove orphaned ones.
    #[command(alias = "tagcleanup")]
    TagCleanup {
        /// Remove orphaned tags without asking.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Migrate TOTP secrets and recovery codes from a 1.x installation.
    #[command(alias = "migrate_totp")]
    MigrateTotp {
        /// Do not ask for confirmation.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Run the application's unit tests in the development environment.
    Test,

    /// Print ghostctl's own version.
    Version,

    /// Compare the installed application version with the latest release.
    Update,
}

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    /// List the backup files in the backups volume instead.
    #[arg(long, conflicts_with = "download")]
    pub list: bool,

    /// Copy the backups volume into the installation directory instead.
    #[arg(long)]
    pub download: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the values of one or more variables.
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Set a variable.
    Set { key: String, value: String },
    /// Add a hostname to the allowed hosts.
    AllowHost { host: String },
    /// Remove a hostname from the allowed hosts.
    DisallowHost { host: String },
    /// Add an origin to the trusted CSRF origins.
    TrustOrigin { origin: String },
    /// Remove an origin from the trusted CSRF origins.
    DistrustOrigin { origin: String },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
