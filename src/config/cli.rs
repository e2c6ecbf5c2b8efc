//! Command-line interface

use super::file::FileConfig;
use super::params::{Command, Grant, Parameters, RequestOptions, SyncOptions, DEFAULT_PAGE_SIZE};
use crate::filter::{FilterKind, FilterPattern};
use crate::types::SyncError;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Synchronize local trees with object storage
#[derive(Debug, Parser)]
#[command(name = "objsync", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// TOML file with default settings
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory backing the object store (one sub-directory per bucket)
    #[arg(long, global = true, value_name = "DIR")]
    pub store_root: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Copy files or objects
    Cp(TransferArgs),
    /// Move files or objects
    Mv(TransferArgs),
    /// Delete objects
    Rm(RmArgs),
    /// Make the destination match the source
    Sync(SyncArgs),
}

#[derive(Debug, Args)]
pub struct TransferArgs {
    /// Source path (`s3://bucket/key`, local path, or `-` for stdin)
    pub src: String,

    /// Destination path (`s3://bucket/key`, local path, or `-` for stdout)
    pub dest: String,

    /// Operate on every object under the given prefix or directory
    #[arg(long)]
    pub recursive: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    /// Remote path to delete
    pub path: String,

    #[arg(long)]
    pub recursive: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    pub src: String,
    pub dest: String,

    /// Delete destination files that do not exist in the source
    #[arg(long)]
    pub delete: bool,

    /// Only compare sizes
    #[arg(long)]
    pub size_only: bool,

    /// Treat same-size files with different timestamps as changed on download
    #[arg(long)]
    pub exact_timestamps: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by every command.
#[derive(Debug, Default, Args)]
pub struct CommonArgs {
    /// Show what would be done without doing it
    #[arg(long)]
    pub dryrun: bool,

    /// Print nothing
    #[arg(long)]
    pub quiet: bool,

    /// Print only warnings and errors
    #[arg(long)]
    pub only_show_errors: bool,

    /// Print results but no progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Keys requested per listing page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Include files matching the pattern (order relative to --exclude matters)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Exclude files matching the pattern
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    #[arg(long, conflicts_with = "no_follow_symlinks")]
    pub follow_symlinks: bool,

    #[arg(long)]
    pub no_follow_symlinks: bool,

    /// Do not guess content types of uploads from file names
    #[arg(long)]
    pub no_guess_mime_type: bool,

    /// Size in bytes of a stdin upload
    #[arg(long)]
    pub expected_size: Option<u64>,

    /// Transfer archived objects even if they look unrestored
    #[arg(long)]
    pub force_glacier_transfer: bool,

    /// Skip archived objects without a warning
    #[arg(long)]
    pub ignore_glacier_warnings: bool,

    #[arg(long)]
    pub acl: Option<String>,

    /// `permission=grantee`, repeatable
    #[arg(long = "grants", value_name = "GRANT")]
    pub grants: Vec<String>,

    #[arg(long)]
    pub storage_class: Option<String>,

    #[arg(long)]
    pub website_redirect: Option<String>,

    #[arg(long)]
    pub content_type: Option<String>,

    #[arg(long)]
    pub cache_control: Option<String>,

    #[arg(long)]
    pub content_disposition: Option<String>,

    #[arg(long)]
    pub content_encoding: Option<String>,

    #[arg(long)]
    pub content_language: Option<String>,

    #[arg(long)]
    pub expires: Option<String>,

    #[arg(long)]
    pub sse: Option<String>,

    #[arg(long)]
    pub sse_kms_key_id: Option<String>,

    #[arg(long)]
    pub sse_c: Option<String>,

    #[arg(long)]
    pub sse_c_key: Option<String>,

    #[arg(long)]
    pub sse_c_copy_source: Option<String>,

    #[arg(long)]
    pub sse_c_copy_source_key: Option<String>,

    /// JSON object of user metadata, e.g. `{"team":"infra"}`
    #[arg(long, value_name = "JSON")]
    pub metadata: Option<String>,

    #[arg(long)]
    pub metadata_directive: Option<String>,

    #[arg(long)]
    pub request_payer: Option<String>,
}

/// A parsed command line with its include/exclude order recovered.
///
/// Clap collects `--include` and `--exclude` into separate lists; the
/// relative order between them decides which pattern wins, so it is
/// rebuilt from argument indices.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    pub filters: Vec<FilterPattern>,
}

impl Invocation {
    /// Parse the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        match Self::try_parse_from(std::env::args_os()) {
            Ok(invocation) => invocation,
            Err(err) => err.exit(),
        }
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Cli::command().try_get_matches_from(args)?;
        let cli = Cli::from_arg_matches(&matches)?;
        let filters = matches
            .subcommand()
            .map(|(_, sub)| ordered_filters(sub))
            .unwrap_or_default();
        Ok(Self { cli, filters })
    }

    /// Turn the command line into validated parameters.
    ///
    /// # Arguments
    /// * `defaults` - Values from the config file, used when a flag is absent
    pub fn parameters(&self, defaults: &FileConfig) -> Result<Parameters, SyncError> {
        let (command, src, dest, mut options, common) = match &self.cli.command {
            CliCommand::Cp(args) | CliCommand::Mv(args) => {
                let command = if matches!(self.cli.command, CliCommand::Mv(_)) {
                    Command::Mv
                } else {
                    Command::Cp
                };
                let options = SyncOptions {
                    recursive: args.recursive,
                    ..SyncOptions::default()
                };
                (command, &args.src, Some(&args.dest), options, &args.common)
            }
            CliCommand::Rm(args) => {
                let options = SyncOptions {
                    recursive: args.recursive,
                    ..SyncOptions::default()
                };
                (Command::Rm, &args.path, None, options, &args.common)
            }
            CliCommand::Sync(args) => {
                let options = SyncOptions {
                    delete: args.delete,
                    size_only: args.size_only,
                    exact_timestamps: args.exact_timestamps,
                    ..SyncOptions::default()
                };
                (Command::Sync, &args.src, Some(&args.dest), options, &args.common)
            }
        };

        apply_common(&mut options, common, defaults)?;
        options.filters = self.filters.clone();
        Parameters::new(command, src, dest.map(String::as_str), options)
    }
}

fn apply_common(options: &mut SyncOptions, common: &CommonArgs, defaults: &FileConfig) -> Result<(), SyncError> {
    options.dryrun = common.dryrun;
    options.quiet = common.quiet;
    options.only_show_errors = common.only_show_errors;
    options.no_progress = common.no_progress;
    options.page_size = common
        .page_size
        .or(defaults.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    options.follow_symlinks = if common.no_follow_symlinks {
        false
    } else if common.follow_symlinks {
        true
    } else {
        defaults.follow_symlinks.unwrap_or(true)
    };
    options.guess_mime_type = !common.no_guess_mime_type && defaults.guess_mime_type.unwrap_or(true);
    options.expected_size = common.expected_size;
    options.force_glacier_transfer = common.force_glacier_transfer;
    options.ignore_glacier_warnings = common.ignore_glacier_warnings;
    options.request = request_options(common)?;
    Ok(())
}

fn request_options(common: &CommonArgs) -> Result<RequestOptions, SyncError> {
    let grants = common
        .grants
        .iter()
        .map(|raw| raw.parse::<Grant>())
        .collect::<Result<Vec<_>, _>>()?;
    let metadata = match &common.metadata {
        Some(json) => serde_json::from_str::<BTreeMap<String, String>>(json)
            .map_err(|e| SyncError::Validation(format!("invalid --metadata JSON: {}", e)))?,
        None => BTreeMap::new(),
    };

    Ok(RequestOptions {
        acl: common.acl.clone(),
        grants,
        storage_class: common.storage_class.clone(),
        website_redirect: common.website_redirect.clone(),
        content_type: common.content_type.clone(),
        cache_control: common.cache_control.clone(),
        content_disposition: common.content_disposition.clone(),
        content_encoding: common.content_encoding.clone(),
        content_language: common.content_language.clone(),
        expires: common.expires.clone(),
        sse: common.sse.clone(),
        sse_kms_key_id: common.sse_kms_key_id.clone(),
        sse_c: common.sse_c.clone(),
        sse_c_key: common.sse_c_key.clone(),
        sse_c_copy_source: common.sse_c_copy_source.clone(),
        sse_c_copy_source_key: common.sse_c_copy_source_key.clone(),
        metadata,
        metadata_directive: common.metadata_directive.clone(),
        request_payer: common.request_payer.clone(),
    })
}

fn ordered_filters(matches: &ArgMatches) -> Vec<FilterPattern> {
    let mut indexed: Vec<(usize, FilterPattern)> = Vec::new();
    for (id, kind) in [("include", FilterKind::Include), ("exclude", FilterKind::Exclude)] {
        if let (Some(indices), Some(values)) = (matches.indices_of(id), matches.get_many::<String>(id)) {
            indexed.extend(indices.zip(values).map(|(index, value)| {
                let pattern = FilterPattern {
                    kind,
                    pattern: value.clone(),
                };
                (index, pattern)
            }));
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, pattern)| pattern).collect()
}
