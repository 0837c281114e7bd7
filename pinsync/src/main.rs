mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{
    GcOutput, ImportOutput, InitOutput, LinkInfo, LsData, LsOutput, NameInfo, NameOutput,
    NamesHistoryOutput, NamesListOutput, NamesRmOutput, OutputWriter, PinAddOutput, PinInfo,
    PinListOutput, PinRmOutput, RecordOutput, StatOutput, UpdateOutput,
};
use pinsync_core::{
    Algorithm, Cid, Config, JsonFileRepository, LocalStore, Locator, Node, ObjectStore, PinMode,
    RecordRepository, Updater, gateway_url,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

/// pinsync - mirror a build tree and maintain latest-build pointers
#[derive(Parser)]
#[command(name = "pinsync")]
#[command(about = "Mirror a content-addressed build tree into raw and production trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to PINSYNC_STORE env var or ./pinsync-store)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store and an empty build record
    Init {
        /// Hash algorithm to use
        #[arg(long, default_value = "blake3")]
        algo: String,

        /// Build record path (defaults to PINSYNC_RECORD or ./current/build.json)
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Import a local file or directory
    Import {
        /// Path to import
        path: PathBuf,

        /// Publish the imported root under this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Synchronize the raw and production trees
    Update {
        /// Source root locator (defaults to PINSYNC_SOURCE)
        #[arg(long)]
        source: Option<String>,

        /// Build record path (defaults to PINSYNC_RECORD or ./current/build.json)
        #[arg(long)]
        record: Option<PathBuf>,

        /// Fetch every submitted node back after writing it
        #[arg(long)]
        verify: bool,
    },

    /// List the links of a directory
    Ls {
        /// Locator (/ipfs/<cid>/path, /ipns/<name>/path, or a bare CID)
        locator: String,
    },

    /// Output blob content to stdout
    Cat {
        /// Locator of the blob
        locator: String,
    },

    /// Show object metadata
    Stat {
        /// Locator of the object
        locator: String,
    },

    /// Show the build record
    Record {
        /// Build record path (defaults to PINSYNC_RECORD or ./current/build.json)
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Manage mutable names
    #[command(subcommand)]
    Names(NamesCommands),

    /// Manage pins
    #[command(subcommand)]
    Pin(PinCommands),

    /// Garbage collect unpinned, unnamed objects
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum NamesCommands {
    /// Point a name at a locator's target
    Publish { name: String, locator: String },

    /// Show a name's current value
    Resolve { name: String },

    /// Show every value a name has held, oldest first
    History { name: String },

    /// List all names
    List,

    /// Remove a name and its history
    Rm { name: String },
}

#[derive(Subcommand)]
enum PinCommands {
    /// Pin a locator's target
    Add {
        locator: String,

        /// recursive or direct
        #[arg(long, default_value = "recursive")]
        mode: String,
    },

    /// Remove a pin
    Rm { locator: String },

    /// List pins
    Ls,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.write_error(&e, 1);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "pinsync=debug,pinsync_core=debug"
    } else {
        "pinsync=info,pinsync_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // CLI flags > PINSYNC_* env vars > defaults
    let mut config = Config::from_env().context("Failed to read configuration")?;
    if let Some(store) = cli.store {
        config.store = store;
    }

    match cli.command {
        Commands::Init { algo, record } => {
            if let Some(record) = record {
                config.record = record;
            }
            cmd_init(&config, &algo, output)
        }
        Commands::Import { path, name } => cmd_import(&config, &path, name, output),
        Commands::Update {
            source,
            record,
            verify,
        } => {
            if let Some(source) = source {
                config.source = Some(
                    Locator::parse(&source)
                        .with_context(|| format!("Invalid source locator: {}", source))?,
                );
            }
            if let Some(record) = record {
                config.record = record;
            }
            config.verify |= verify;
            cmd_update(&config, output)
        }
        Commands::Ls { locator } => cmd_ls(&config, &locator, output),
        Commands::Cat { locator } => cmd_cat(&config, &locator),
        Commands::Stat { locator } => cmd_stat(&config, &locator, output),
        Commands::Record { record } => {
            if let Some(record) = record {
                config.record = record;
            }
            cmd_record(&config, output)
        }
        Commands::Names(names_cmd) => match names_cmd {
            NamesCommands::Publish { name, locator } => {
                cmd_names_publish(&config, &name, &locator, output)
            }
            NamesCommands::Resolve { name } => cmd_names_resolve(&config, &name, output),
            NamesCommands::History { name } => cmd_names_history(&config, &name, output),
            NamesCommands::List => cmd_names_list(&config, output),
            NamesCommands::Rm { name } => cmd_names_rm(&config, &name, output),
        },
        Commands::Pin(pin_cmd) => match pin_cmd {
            PinCommands::Add { locator, mode } => cmd_pin_add(&config, &locator, &mode, output),
            PinCommands::Rm { locator } => cmd_pin_rm(&config, &locator, output),
            PinCommands::Ls => cmd_pin_ls(&config, output),
        },
        Commands::Gc { dry_run } => cmd_gc(&config, dry_run, output),
    }
}

fn open_store(root: &Path) -> Result<LocalStore> {
    let store = LocalStore::open(root)
        .with_context(|| format!("Failed to open store at {}", root.display()))?;
    debug!(root = %root.display(), algorithm = store.algorithm().as_str(), "opened store");
    Ok(store)
}

fn resolve(store: &LocalStore, config: &Config, locator: &str) -> Result<Cid> {
    Locator::parse(locator)
        .and_then(|l| l.resolve(store, &config.timeouts))
        .with_context(|| format!("Failed to resolve {}", locator))
}

fn cmd_init(config: &Config, algo: &str, output: &OutputWriter) -> Result<()> {
    let algorithm = Algorithm::parse(algo).with_context(|| format!("Unsupported algorithm: {}", algo))?;

    LocalStore::init(&config.store, algorithm)
        .with_context(|| format!("Failed to initialize store at {}", config.store.display()))?;

    JsonFileRepository::new(&config.record)
        .create()
        .with_context(|| format!("Failed to create build record at {}", config.record.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: config.store.display().to_string(),
        algorithm: algorithm.as_str().to_string(),
        record: config.record.display().to_string(),
    };
    output.write(&data, || {
        format!(
            "Initialized pinsync store at {}\nAlgorithm: {}\nBuild record: {}\n",
            data.root, data.algorithm, data.record
        )
    })
}

fn cmd_import(config: &Config, path: &Path, name: Option<String>, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let added = store
        .add_path(path)
        .with_context(|| format!("Failed to import path: {}", path.display()))?;

    if let Some(ref name) = name {
        store
            .names()
            .publish(name, &added.cid)
            .with_context(|| format!("Failed to publish name: {}", name))?;
    }

    let data = ImportOutput {
        success: true,
        result_code: 0,
        cid: added.cid,
        size: added.size,
        path: path.display().to_string(),
        name,
    };
    output.write(&data, || {
        let mut text = format!("{} {}\n", data.cid, data.path);
        if let Some(name) = &data.name {
            text.push_str(&format!("Published: {} -> {}\n", name, data.cid));
        }
        text
    })
}

fn cmd_update(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let records = JsonFileRepository::new(&config.record);

    let updater = Updater::from_config(&store, &records, config)
        .context("Cannot update without a source (use --source or PINSYNC_SOURCE)")?;
    let report = updater
        .run()
        .with_context(|| format!("Update stopped at stage {}", updater.stage()))?;

    let data = UpdateOutput {
        success: true,
        result_code: 0,
        report,
    };
    output.write(&data, || {
        format!(
            "raw        {}{}\nproduction {}{}\n",
            data.report.raw.locator,
            if data.report.raw.changed { "" } else { " (unchanged)" },
            data.report.production.locator,
            if data.report.production.changed { "" } else { " (unchanged)" },
        )
    })
}

fn cmd_ls(config: &Config, locator: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let cid = resolve(&store, config, locator)?;

    let node = store
        .load(&cid)
        .with_context(|| format!("Failed to read object {}", cid))?;

    let data = LsOutput {
        success: true,
        result_code: 0,
        data: match node {
            Node::Directory(dir) => LsData::Directory {
                cid,
                links: dir
                    .links()
                    .iter()
                    .map(|l| LinkInfo {
                        name: l.name.clone(),
                        cid: l.target,
                        size: l.size,
                    })
                    .collect(),
            },
            Node::Blob(bytes) => LsData::Blob {
                cid,
                size: bytes.len() as u64,
            },
        },
    };
    output.write(&data, || match &data.data {
        LsData::Directory { links, .. } => links
            .iter()
            .map(|l| format!("{} {:>10} {}\n", l.cid, l.size, l.name))
            .collect(),
        LsData::Blob { size, .. } => format!("blob {} bytes\n", size),
    })
}

fn cmd_cat(config: &Config, locator: &str) -> Result<()> {
    let store = open_store(&config.store)?;
    let cid = resolve(&store, config, locator)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    store
        .cat_blob(&cid, &mut handle)
        .with_context(|| format!("Failed to output blob {}", cid))?;

    Ok(())
}

fn cmd_stat(config: &Config, locator: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let cid = resolve(&store, config, locator)?;

    let stat = store
        .stat_node(&cid, config.timeouts.short)
        .with_context(|| format!("Failed to stat {}", cid))?;

    let data = StatOutput {
        success: true,
        result_code: 0,
        cid,
        kind: stat.kind.as_str().to_string(),
        cumulative_size: stat.cumulative_size,
        locator: gateway_url(&config.gateway, &cid),
    };
    output.write(&data, || {
        format!(
            "CID: {}\nType: {}\nCumulative size: {} bytes\nLocator: {}\n",
            data.cid, data.kind, data.cumulative_size, data.locator
        )
    })
}

fn cmd_record(config: &Config, output: &OutputWriter) -> Result<()> {
    let record = JsonFileRepository::new(&config.record)
        .load()
        .with_context(|| format!("Failed to read build record at {}", config.record.display()))?;

    let data = RecordOutput {
        success: true,
        result_code: 0,
        path: config.record.display().to_string(),
        record,
    };
    output.write(&data, || {
        let show = |cid: &Option<Cid>| {
            cid.map(|c| gateway_url(&config.gateway, &c))
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "currentRawBuild  {}\npreviousRawBuild {}\ncurrentBuild     {}\npreviousBuild    {}\n",
            show(&data.record.current_raw_build),
            show(&data.record.previous_raw_build),
            show(&data.record.current_build),
            show(&data.record.previous_build),
        )
    })
}

fn cmd_names_publish(config: &Config, name: &str, locator: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let cid = resolve(&store, config, locator)?;

    store
        .publish_name(name, &cid, config.timeouts.short)
        .with_context(|| format!("Failed to publish name: {}", name))?;

    let data = NameOutput {
        success: true,
        result_code: 0,
        name: NameInfo {
            name: name.to_string(),
            cid,
        },
    };
    output.write(&data, || format!("{} -> {}\n", name, cid))
}

fn cmd_names_resolve(config: &Config, name: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let cid = store
        .resolve_name(name, config.timeouts.short)
        .with_context(|| format!("Failed to resolve name: {}", name))?;

    let data = NameOutput {
        success: true,
        result_code: 0,
        name: NameInfo {
            name: name.to_string(),
            cid,
        },
    };
    output.write(&data, || format!("{}\n", cid))
}

fn cmd_names_history(config: &Config, name: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let history = store
        .names()
        .history(name)
        .with_context(|| format!("Failed to read history of name: {}", name))?;

    let data = NamesHistoryOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
        history,
    };
    output.write(&data, || {
        if data.history.is_empty() {
            format!("{} has never been published\n", name)
        } else {
            data.history.iter().map(|cid| format!("{}\n", cid)).collect()
        }
    })
}

fn cmd_names_list(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let names = store
        .names()
        .list()
        .context("Failed to list names")?;

    let data = NamesListOutput {
        success: true,
        result_code: 0,
        names: names
            .into_iter()
            .map(|(name, cid)| NameInfo { name, cid })
            .collect(),
    };
    output.write(&data, || {
        if data.names.is_empty() {
            "No names\n".to_string()
        } else {
            data.names
                .iter()
                .map(|n| format!("{} -> {}\n", n.name, n.cid))
                .collect()
        }
    })
}

fn cmd_names_rm(config: &Config, name: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    store
        .names()
        .remove(name)
        .with_context(|| format!("Failed to remove name: {}", name))?;

    let data = NamesRmOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
    };
    output.write(&data, || format!("Removed name: {}\n", name))
}

fn cmd_pin_add(config: &Config, locator: &str, mode: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let mode = PinMode::parse(mode).with_context(|| format!("Invalid pin mode: {}", mode))?;
    let cid = resolve(&store, config, locator)?;

    store
        .pin(&cid, mode)
        .with_context(|| format!("Failed to pin {}", cid))?;

    let data = PinAddOutput {
        success: true,
        result_code: 0,
        pin: PinInfo { cid, mode },
    };
    output.write(&data, || format!("pinned {} {}\n", cid, mode))
}

fn cmd_pin_rm(config: &Config, locator: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;
    let cid = resolve(&store, config, locator)?;

    store
        .unpin(&cid)
        .with_context(|| format!("Failed to unpin {}", cid))?;

    let data = PinRmOutput {
        success: true,
        result_code: 0,
        cid,
    };
    output.write(&data, || format!("unpinned {}\n", cid))
}

fn cmd_pin_ls(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let pins = store.pins().list().context("Failed to list pins")?;

    let data = PinListOutput {
        success: true,
        result_code: 0,
        pins: pins
            .into_iter()
            .map(|(cid, mode)| PinInfo { cid, mode })
            .collect(),
    };
    output.write(&data, || {
        if data.pins.is_empty() {
            "No pins\n".to_string()
        } else {
            data.pins
                .iter()
                .map(|p| format!("{} {}\n", p.cid, p.mode))
                .collect()
        }
    })
}

fn cmd_gc(config: &Config, dry_run: bool, output: &OutputWriter) -> Result<()> {
    let store = open_store(&config.store)?;

    let stats = store
        .gc(dry_run)
        .context("Failed to run garbage collection")?;

    let data = GcOutput {
        success: true,
        result_code: 0,
        dry_run,
        objects_deleted: stats.objects_deleted,
        bytes_freed: stats.bytes_freed,
    };
    output.write(&data, || {
        if dry_run {
            format!(
                "Dry run - no objects deleted\nWould delete {} objects\nWould free {} bytes\n",
                stats.objects_deleted, stats.bytes_freed
            )
        } else {
            format!(
                "Deleted {} objects\nFreed {} bytes\n",
                stats.objects_deleted, stats.bytes_freed
            )
        }
    })
}
