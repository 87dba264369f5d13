use anyhow::{anyhow, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use refbroker::{
    get_real_path, Broker, BrokerConfig, BrokerError, ClassFilter, DeclarationBuilder,
    EntityKind, FileTokenizer, MemoryBackend,
};
use report::{EntitySummary, LookupResult, ProcessReport, UnitSummary};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod report;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "refbroker")]
#[command(about = "Static reflection over PHP-style sources", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a file, directory or archive bundle and print a JSON report
    Process(ProcessArgs),

    /// Print the normalized form of a path, or fail if it does not exist
    #[command(name = "real-path")]
    RealPath(RealPathArgs),
}

#[derive(Args)]
struct ProcessArgs {
    /// File, directory or archive bundle to process
    path: PathBuf,

    /// TOML file with broker settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop token streams after building
    #[arg(long)]
    no_retain_tokens: bool,

    /// Keep at most this many units tokenized
    #[arg(long)]
    max_tokenized_units: Option<usize>,

    /// Skip dot-files and dot-directories
    #[arg(long)]
    skip_hidden: bool,

    /// Externally declared class names (repeatable)
    #[arg(long = "internal-class", value_name = "NAME")]
    internal_classes: Vec<String>,

    /// List classes declared in processed units
    #[arg(long)]
    classes: bool,

    /// List classes including internal ones
    #[arg(long)]
    all_classes: bool,

    /// List functions
    #[arg(long)]
    functions: bool,

    /// List constants
    #[arg(long)]
    constants: bool,

    /// Resolve a class by qualified name (repeatable)
    #[arg(long = "lookup-class", value_name = "NAME")]
    lookup_classes: Vec<String>,

    /// Resolve a function by qualified name (repeatable)
    #[arg(long = "lookup-function", value_name = "NAME")]
    lookup_functions: Vec<String>,

    /// Resolve a constant by qualified name (repeatable)
    #[arg(long = "lookup-constant", value_name = "NAME")]
    lookup_constants: Vec<String>,
}

#[derive(Args)]
struct RealPathArgs {
    path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Process(args) => run_process(args)?,
        Commands::RealPath(args) => run_real_path(&args.path)?,
    }

    Ok(())
}

fn load_config(args: &ProcessArgs) -> Result<BrokerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<BrokerConfig>(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => BrokerConfig::default(),
    };

    if args.no_retain_tokens {
        config.retain_token_streams = false;
    }
    if args.max_tokenized_units.is_some() {
        config.max_tokenized_units = args.max_tokenized_units;
    }
    if args.skip_hidden {
        config.skip_hidden = true;
    }
    config
        .validate()
        .map_err(|msg| anyhow!("Invalid config: {msg}"))?;
    Ok(config)
}

fn build_broker(config: BrokerConfig, internal_classes: &[String]) -> Broker {
    let backend = MemoryBackend::new(config.retain_token_streams)
        .with_max_tokenized_units(config.max_tokenized_units)
        .with_internal_classes(internal_classes.iter().cloned());
    Broker::with_components(
        config,
        Box::new(backend),
        Box::new(FileTokenizer::default()),
        Box::new(DeclarationBuilder),
    )
}

fn broker_error(err: BrokerError, path: &Path) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(format!("{kind:?}: cannot process {}", path.display()))
}

fn run_process(args: ProcessArgs) -> Result<()> {
    let config = load_config(&args)?;
    let mut broker = build_broker(config, &args.internal_classes);

    let processed = broker
        .process(&args.path)
        .map_err(|err| broker_error(err, &args.path))?;
    let units: Vec<UnitSummary> = processed
        .units()
        .into_iter()
        .map(UnitSummary::new)
        .collect();

    let class_filter = if args.all_classes {
        Some(ClassFilter::ALL)
    } else if args.classes {
        Some(ClassFilter::TOKENIZED)
    } else {
        None
    };
    let classes = class_filter.map(|filter| EntitySummary::list(&broker.get_classes(filter)));
    let functions = args
        .functions
        .then(|| EntitySummary::list(&broker.get_functions()));
    let constants = args
        .constants
        .then(|| EntitySummary::list(&broker.get_constants()));

    let mut lookups = Vec::new();
    for name in &args.lookup_classes {
        let found = broker.get_class(name);
        lookups.push(lookup_result(EntityKind::Class, name, found.as_deref()));
    }
    for name in &args.lookup_functions {
        let found = broker.get_function(name);
        lookups.push(lookup_result(EntityKind::Function, name, found.as_deref()));
    }
    for name in &args.lookup_constants {
        let found = broker.get_constant(name);
        lookups.push(lookup_result(EntityKind::Constant, name, found.as_deref()));
    }

    log::info!(
        "Processed {} units ({} tokenized, {} reused)",
        processed.len(),
        broker.stats().units_tokenized,
        broker.stats().units_reused
    );

    let report = ProcessReport {
        target: args.path.display().to_string(),
        units,
        classes,
        functions,
        constants,
        lookups,
        stats: broker.stats().clone(),
    };
    print_stdout(&serde_json::to_string_pretty(&report)?)
}

fn lookup_result(kind: EntityKind, name: &str, found: Option<&refbroker::Entity>) -> LookupResult {
    LookupResult {
        kind,
        name: name.to_string(),
        found: found.map(EntitySummary::new),
    }
}

fn run_real_path(path: &Path) -> Result<()> {
    let real = get_real_path(path)
        .with_context(|| format!("TargetNotFound: {} does not exist", path.display()))?;
    print_stdout(real.as_str())
}
