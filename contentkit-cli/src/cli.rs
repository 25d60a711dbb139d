use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use contentkit_validator::output::{write_human, write_json};
use contentkit_validator::{FsSourceConfig, ReadmeConfig, ValidationConfig, validate_fs};

use crate::client::{ClientConfig, ContentClient, HttpContentClient};
use crate::logging;
use crate::upload::Uploader;

#[derive(Debug, Parser)]
#[command(name = "contentkit", version, about = "Validate and upload content packs")]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace); `RUST_LOG` overrides it
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a pack, a content entity directory or a single file to the server
    Upload(UploadArgs),
    /// Validate content files and packs on disk
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Pack, entity directory or file to upload
    #[arg(short, long)]
    pub input: PathBuf,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Unlock system integrations and playbooks the server refuses to
    /// overwrite, then retry the upload
    #[arg(long = "override")]
    pub override_locked: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Files or directories to validate
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Glob patterns to skip
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Checkout of the previous revision, for backward-compatibility checks
    #[arg(long)]
    pub previous_root: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Image that counts as a placeholder in addition to the bundled ones
    #[arg(long = "default-image", value_name = "PNG")]
    pub default_images: Vec<PathBuf>,
}

/// Parse the command line, set up logging and run the selected command.
///
/// Returns the process exit code.
///
/// # Errors
///
/// Returns an error if the command fails before producing a report.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Upload(args) => {
            let mut config = ClientConfig::from_env()?;
            if args.insecure {
                config.verify_tls = false;
            }
            let client = HttpContentClient::new(config)?;
            run_upload(&client, &args, &mut out)
        }
        Commands::Validate(args) => run_validate(&args, &mut out),
    }
}

/// Upload `args.input` and print the summary. Exit code 1 when any item failed.
///
/// # Errors
///
/// Returns an error if the server version cannot be fetched or the input
/// path cannot be resolved.
pub fn run_upload(
    client: &dyn ContentClient,
    args: &UploadArgs,
    out: &mut dyn Write,
) -> anyhow::Result<i32> {
    let summary = Uploader::new(client, &mut *out)?
        .override_locked(args.override_locked)
        .upload(&args.input)?;
    summary.write(out)?;
    Ok(summary.status_code())
}

/// Validate `args.input` and print the report. Exit code 1 unless it is ok.
///
/// # Errors
///
/// Returns an error if the inputs are missing or the report cannot be written.
pub fn run_validate(args: &ValidateArgs, out: &mut dyn Write) -> anyhow::Result<i32> {
    let mut fs_config = FsSourceConfig::default();
    fs_config.paths.clone_from(&args.input);
    fs_config.exclude.clone_from(&args.exclude);

    let mut validation_config = ValidationConfig::default();
    validation_config.previous_root.clone_from(&args.previous_root);
    validation_config.readme = ReadmeConfig::from_env();
    validation_config
        .extra_default_images
        .clone_from(&args.default_images);

    let report = validate_fs(&fs_config, &validation_config)?;
    if args.json {
        write_json(&report, out).context("Failed to write the JSON report")?;
    } else {
        write_human(&report, out).context("Failed to write the report")?;
    }
    Ok(i32::from(!report.ok))
}
