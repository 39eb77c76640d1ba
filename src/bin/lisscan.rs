//! Command-line scanning tool
//!
//! Lists scanners, prints their options and scans pages to PNG, JPEG or
//! PDF files. Built without the `libinsane` feature, only the `--mock`
//! demo scanner is available.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use lisrs::mock::MockScanner;
use lisrs::output::write_image;
use lisrs::{Api, ApiConfig, Error, Item, LogLevel, OutputFormat, PdfWriter, RetryPolicy};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Scan documents through libinsane
#[derive(Parser, Debug)]
#[command(name = "lisscan")]
#[command(version)]
#[command(about = "Scan documents through libinsane", long_about = None)]
struct Cli {
    /// Show debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the built-in demo scanner instead of real hardware
    #[arg(long, global = true)]
    mock: bool,

    /// Pause between reads while the scanner lamp warms up
    #[arg(long, global = true, default_value_t = 1000)]
    warmup_interval_ms: u64,

    /// Give up after this many warm-up pauses (default: wait forever)
    #[arg(long, global = true)]
    max_warmup_retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find and print available scanners
    PrintScanners,
    /// Print scanner and paper source options
    PrintOptions(SourceArgs),
    /// Scan using the specified scanner and paper source
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Id of the scanner
    #[arg(short, long)]
    device: String,

    /// Paper source
    #[arg(short, long)]
    source: String,

    /// Option to set before printing or scanning, as name=value.
    /// "name=" passes an empty string; a bare "name" only filters the
    /// printed options. May be repeated.
    #[arg(short = 'o', long = "option", value_name = "NAME[=VALUE]")]
    options: Vec<OptionArg>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output file format: png, jpg or pdf
    #[arg(short = 'f', long, default_value = "pdf")]
    format: OutputFormat,

    /// Directory for page{N}.{ext} or result.pdf
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

/// A `-o` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OptionArg {
    name: String,
    /// `None` when the option is only a filter.
    value: Option<String>,
}

impl FromStr for OptionArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(format!("invalid option '{s}': missing name"));
        }
        Ok(OptionArg {
            name: name.to_string(),
            value,
        })
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "error" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("LISSCAN_LOG").unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    if verbose {
        lisrs::set_library_log_level(LogLevel::Debug);
    }
}

fn config(cli: &Cli) -> ApiConfig {
    let mut retry = RetryPolicy::new(Duration::from_millis(cli.warmup_interval_ms));
    if let Some(max) = cli.max_warmup_retries {
        retry = retry.max_retries(max);
    }
    ApiConfig::new().retry(retry)
}

fn connect(cli: &Cli) -> lisrs::Result<Api> {
    if cli.mock {
        return Api::with_driver(MockScanner::demo(), config(cli));
    }
    connect_libinsane(cli)
}

#[cfg(feature = "libinsane")]
fn connect_libinsane(cli: &Cli) -> lisrs::Result<Api> {
    Api::safebet(config(cli))
}

#[cfg(not(feature = "libinsane"))]
fn connect_libinsane(_cli: &Cli) -> lisrs::Result<Api> {
    Err(Error::Io(std::io::Error::other(
        "built without libinsane support; rebuild with --features libinsane or pass --mock",
    )))
}

fn print_scanners(api: &Api) -> lisrs::Result<()> {
    for dev in api.list_devices()? {
        println!(
            "{}",
            "---------------------------------------------------------------------".cyan()
        );
        println!("Device Id: {}", dev.dev_id.cyan());
        println!("Vendor: {}\nModel: {}", dev.vendor, dev.model);

        let device = match api.get_device(&dev.dev_id) {
            Ok(device) => device,
            Err(err) => {
                tracing::error!(error = %err, "cannot acquire scanner");
                continue;
            }
        };
        let listed = api.iterate_sources(&dev.dev_id, Some(&device), |source| {
            println!("Paper source: {}", source.name().green());
            true
        });
        if let Err(err) = listed {
            tracing::error!(error = %err, "cannot get paper sources");
        }
    }
    Ok(())
}

fn apply_options(source: &Item<'_>, options: &[OptionArg]) -> lisrs::Result<()> {
    for opt in options {
        if let Some(value) = &opt.value {
            source.set_option(&opt.name, value)?;
        }
    }
    Ok(())
}

fn print_options(api: &Api, args: &SourceArgs) -> lisrs::Result<()> {
    tracing::info!(scanner = %args.device, paper_source = %args.source, "printing options");
    let device = api.get_device(&args.device)?;
    let source = device
        .source(&args.source)?
        .ok_or_else(|| Error::SourceNotFound(args.source.clone()))?;
    apply_options(&source, &args.options)?;

    source.for_each_option(|opt| {
        if args.options.is_empty() || args.options.iter().any(|o| o.name == opt.name()) {
            println!("{}", format!("------- {} ------", opt.name()).cyan());
            println!("{opt}");
        }
        true
    })
}

fn scan(api: &Api, args: &ScanArgs) -> lisrs::Result<Vec<PathBuf>> {
    let device = api.get_device(&args.source.device)?;
    let source = device
        .source(&args.source.source)?
        .ok_or_else(|| Error::SourceNotFound(args.source.source.clone()))?;
    apply_options(&source, &args.source.options)?;

    std::fs::create_dir_all(&args.output_dir)?;
    let mut written = Vec::new();
    let mut pdf = PdfWriter::new();
    let mut session = source.scan_start()?;
    let mut page_num = 1;

    while !session.end_of_feed() {
        let mut page = session.page_reader()?;
        let params = *page.params();
        tracing::debug!(
            format = %params.format,
            w = params.width,
            h = params.height,
            image_size = params.image_size,
            "scanning parameters"
        );
        let img = page.image()?;

        match args.format {
            OutputFormat::Pdf => pdf.add_page(&img)?,
            format => {
                let path = args
                    .output_dir
                    .join(format!("page{page_num}.{}", format.extension()));
                write_image(&img, &path, format)?;
                written.push(path);
            }
        }
        page_num += 1;
    }

    if args.format == OutputFormat::Pdf {
        let path = args.output_dir.join("result.pdf");
        pdf.save(&path)?;
        written.push(path);
    }
    Ok(written)
}

fn run(cli: &Cli) -> lisrs::Result<()> {
    let api = connect(cli)?;
    match &cli.command {
        Command::PrintScanners => print_scanners(&api),
        Command::PrintOptions(args) => print_options(&api, args),
        Command::Scan(args) => {
            for path in scan(&api, args)? {
                eprintln!("wrote {}", path.display());
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("{} {err}", "error:".red().bold());
        process::exit(1);
    }
}
