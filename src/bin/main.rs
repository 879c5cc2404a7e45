use clap::{Arg, ArgMatches, Command};
use deglyph::config::{
    discover_config_file, load_config_from_source, load_cookies, ConfigSource, DeglyphConfig,
};
use deglyph::debug::DumpingClassifier;
use deglyph::ocr::{GlyphClassifier, TesseractClassifier};
use deglyph::store::ChapterStore;
use deglyph::walker::{ChapterWalker, PageSource, StopReason, WalkSummary};
use deglyph::{DeglyphError, PipelineSettings};
use log::{debug, error, info, LevelFilter};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// sysexits.h EX_CONFIG
const EXIT_CONFIG: i32 = 78;

#[derive(Debug)]
enum AppError {
    /// Cookie file missing or empty
    Credentials(DeglyphError),
    /// OCR engine unusable
    Ocr(DeglyphError),
    /// A chapter could not be fetched or saved
    Walk(DeglyphError),
    Setup(DeglyphError),
    #[cfg(not(feature = "fetch"))]
    FetchDisabled,
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::Credentials(_) => EXIT_CONFIG,
            _ => 1,
        }
    }
}

/// Verbosity level for output
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verbosity {
    Quiet,   // Errors only
    Normal,  // Per-chapter progress
    Verbose, // Per-glyph detail
}

impl Verbosity {
    fn from_matches(matches: &ArgMatches) -> Self {
        if matches.get_flag("quiet") {
            Verbosity::Quiet
        } else if matches.get_flag("verbose") {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Error,
            Verbosity::Normal => LevelFilter::Info,
            Verbosity::Verbose => LevelFilter::Debug,
        }
    }
}

/// Loads the configuration.
///
/// Priority order:
/// 1. If `--config` is explicitly provided, use that file
/// 2. If `deglyphrc.toml` exists in the current or user configuration directory, use it
/// 3. Otherwise use default configuration
///
/// Command line flags then override the file.
fn get_config(matches: &ArgMatches) -> DeglyphConfig {
    let mut config = if let Some(config_file) = matches.get_one::<String>("config") {
        load_config_from_source(ConfigSource::File(config_file))
    } else if let Some(found) = discover_config_file() {
        let path = found.to_string_lossy();
        info!("Using configuration {}", path);
        load_config_from_source(ConfigSource::File(&*path))
    } else {
        load_config_from_source(ConfigSource::Default)
    };

    if let Some(dir) = matches.get_one::<String>("output") {
        config.download.directory = PathBuf::from(dir);
    }
    if let Some(cookies) = matches.get_one::<String>("cookies") {
        config.download.cookie_file = PathBuf::from(cookies);
    }
    config
}

fn walk_with<S, C>(
    source: S,
    classifier: C,
    store: ChapterStore,
    settings: PipelineSettings,
    chapter_delay: Duration,
    start_url: &str,
    auto: bool,
) -> WalkSummary
where
    S: PageSource,
    C: GlyphClassifier,
{
    ChapterWalker::new(source, classifier, store, settings)
        .with_chapter_delay(chapter_delay)
        .walk(start_url, auto)
}

#[cfg(feature = "fetch")]
fn open_source(
    config: &DeglyphConfig,
    cookies: String,
) -> Result<deglyph::fetch::HttpPageSource, AppError> {
    let session = deglyph::fetch::SessionConfig::new(&config.http, cookies);
    deglyph::fetch::HttpPageSource::new(&session).map_err(AppError::Setup)
}

#[cfg(not(feature = "fetch"))]
fn open_source(_config: &DeglyphConfig, _cookies: String) -> Result<NoSource, AppError> {
    Err(AppError::FetchDisabled)
}

#[cfg(not(feature = "fetch"))]
struct NoSource;

#[cfg(not(feature = "fetch"))]
impl PageSource for NoSource {
    fn fetch(&mut self, url: &str) -> Result<String, DeglyphError> {
        Err(DeglyphError::network(url, "built without the 'fetch' feature"))
    }
}

fn run(matches: ArgMatches) -> Result<(), AppError> {
    let verbosity = Verbosity::from_matches(&matches);
    let config = get_config(&matches);

    // Nothing is fetched without credentials.
    let cookies = load_cookies(&config.download.cookie_file).map_err(AppError::Credentials)?;

    let start_url = matches
        .get_one::<String>("url")
        .cloned()
        .unwrap_or_default();
    let auto = matches.get_flag("auto");
    let settings = config.pipeline_settings(matches.get_flag("punct"));
    debug!("Pipeline settings: {:?}", settings);

    let classifier = TesseractClassifier::from_config(&config.recognition);
    classifier.probe().map_err(AppError::Ocr)?;

    let store = ChapterStore::new(&config.download.directory).map_err(AppError::Setup)?;
    let source = open_source(&config, cookies)?;
    let delay = config.http.chapter_delay;

    let summary = match matches.get_one::<String>("dump-glyphs") {
        Some(dir) => {
            let dumping = DumpingClassifier::new(classifier, dir).map_err(AppError::Setup)?;
            walk_with(source, dumping, store, settings, delay, &start_url, auto)
        }
        None => walk_with(source, classifier, store, settings, delay, &start_url, auto),
    };

    if verbosity != Verbosity::Quiet {
        println!(
            "✅ {} chapter(s) processed, {} restored, saved in {}",
            summary.chapters.len(),
            summary.restored_count(),
            config.download.directory.display()
        );
        for chapter in summary.chapters.iter().filter(|c| !c.is_restored()) {
            println!(
                "⚠️  Chapter {} '{}' left unrestored: {}",
                chapter.index,
                chapter.title,
                chapter.raw_path.display()
            );
        }
    }

    match summary.stopped {
        StopReason::Failed { error, .. } => Err(AppError::Walk(error)),
        StopReason::SingleChapter | StopReason::NoNextChapter => Ok(()),
    }
}

fn build_cli() -> Command {
    Command::new("deglyph")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download font-scrambled chapters and restore their text through glyph OCR")
        .after_help(
            "EXAMPLES:\n  \
            deglyph https://example.com/book/1/section/1\n  \
            deglyph --auto --punct https://example.com/book/1/section/1\n  \
            deglyph -o novel --cookies ~/cookies.txt --dump-glyphs glyphs URL\n",
        )
        .arg(
            Arg::new("url")
                .value_name("URL")
                .help("URL of the (first) chapter to download")
                .required_unless_present("get-default-configuration"),
        )
        .arg(
            Arg::new("auto")
                .long("auto")
                .help("Keep following the next-chapter link until the last chapter")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("punct")
                .long("punct")
                .help("Rewrite every 'o' as '。' and every 'I' as '！' (lossy OCR fix)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to configuration file (TOML format). Auto-detects deglyphrc.toml if not specified"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Download directory (defaults to ./download)"),
        )
        .arg(
            Arg::new("cookies")
                .long("cookies")
                .value_name("FILE")
                .help("File holding the browser cookie string (defaults to ./cookies.txt)"),
        )
        .arg(
            Arg::new("dump-glyphs")
                .long("dump-glyphs")
                .value_name("DIR")
                .help("Save every rendered glyph as U+XXXX.png in DIR"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every recognized glyph")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("quiet"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress all output except errors")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("get-default-configuration")
                .long("get-default-configuration")
                .help("Print a default deglyphrc.toml to stdout and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

fn main() {
    let matches = build_cli().get_matches();

    // RUST_LOG wins over -v/-q
    let level = Verbosity::from_matches(&matches).level().to_string().to_lowercase();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if matches.get_flag("get-default-configuration") {
        println!("{}", deglyph::config::default_config_toml());
        process::exit(0);
    }

    if let Err(e) = run(matches) {
        match &e {
            AppError::Credentials(e) => error!("[X] {}", e),
            AppError::Ocr(e) => error!("[X] {}", e),
            AppError::Walk(e) => error!("[X] Walk stopped: {}", e),
            AppError::Setup(e) => error!("[X] {}", e),
            #[cfg(not(feature = "fetch"))]
            AppError::FetchDisabled => {
                error!("[X] This build cannot download pages; rebuild with the 'fetch' feature")
            }
        }
        process::exit(e.exit_code());
    }
}
