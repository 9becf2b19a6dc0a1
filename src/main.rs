//! bookbuilder - 把保存的阅读器页面整理成 EPUB 和 PDF

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bookbuilder::core::load_stylesheet;
use bookbuilder::env::{core::LogLevel, core::NoColor, generate_env_docs, EnvVar};
use bookbuilder::{
    BookError, BookProcessor, BuildConfig, BuildOptions, Metadata, OutputTargets, SortMode,
};

#[derive(Parser, Debug)]
#[command(name = "bookbuilder")]
#[command(version, about = "Assemble saved reader-view HTML pages into an EPUB and/or a PDF", long_about = None)]
#[command(after_help = "EXAMPLES:
    bookbuilder --input pages --output book.epub
    bookbuilder --input pages --pdf-output book.pdf --sort ctime
    bookbuilder --input pages --output book.epub --lang it --lang-out cs")]
#[command(after_long_help = generate_env_docs())]
struct Cli {
    /// Directory with the saved .html pages
    #[arg(long, value_name = "DIR")]
    input: PathBuf,

    /// EPUB output file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// PDF output file (rendered with wkhtmltopdf)
    #[arg(long, value_name = "FILE")]
    pdf_output: Option<PathBuf>,

    /// Page order
    #[arg(long, value_enum, default_value_t = SortMode::Name)]
    sort: SortMode,

    /// Book title
    #[arg(long)]
    title: Option<String>,

    /// Book author
    #[arg(long)]
    author: Option<String>,

    /// Book language (e.g. en, cs, it)
    #[arg(long)]
    lang: Option<String>,

    /// Custom stylesheet
    #[arg(long, value_name = "FILE")]
    css: Option<PathBuf>,

    /// Ask for title, author and language on start
    #[arg(long)]
    ask_metadata: bool,

    /// Path to the wkhtmltopdf binary
    #[arg(long, value_name = "FILE")]
    wkhtmltopdf: Option<PathBuf>,

    /// Save the flattened HTML used for the PDF (debugging)
    #[arg(long, value_name = "FILE")]
    dump_pdf_html: Option<PathBuf>,

    /// Translate the content to this language
    #[arg(long, value_name = "LANG")]
    lang_out: Option<String>,

    /// TOML build configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Book title repeated as a banner on every page
    #[arg(long)]
    chrome_title: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            error!("{e}");
            process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<(), BookError> {
    // 在读取配置和提问之前先检查参数
    if !cli.input.is_dir() {
        return Err(BookError::InvalidInput(cli.input.display().to_string()));
    }
    let outputs = OutputTargets {
        epub: cli.output.clone(),
        pdf: cli.pdf_output.clone(),
        pdf_dump: cli.dump_pdf_html.clone(),
    };
    if outputs.is_empty() {
        return Err(BookError::NoOutputRequested);
    }

    let mut config = match &cli.config {
        Some(path) => BuildConfig::from_file(path)?,
        None => BuildConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(wkhtmltopdf) = &cli.wkhtmltopdf {
        config.render.wkhtmltopdf = wkhtmltopdf.display().to_string();
    }
    if cli.chrome_title.is_some() {
        config.vocabulary.chrome_title = cli.chrome_title.clone();
    }

    let defaults = Metadata::default();
    let mut metadata = Metadata {
        title: cli.title.clone().unwrap_or(defaults.title),
        author: cli.author.clone().unwrap_or(defaults.author),
        language: cli.lang.clone().unwrap_or(defaults.language),
    };
    if cli.ask_metadata {
        metadata = prompt_metadata(metadata)?;
    }

    let stylesheet = load_stylesheet(cli.css.as_deref())?;

    let options = BuildOptions {
        input_dir: cli.input,
        sort: cli.sort,
        metadata,
        stylesheet: Some(stylesheet),
        lang_out: cli.lang_out,
        outputs,
    };

    let summary = BookProcessor::new(options, config).run()?;

    info!(
        chapters = summary.chapters,
        skipped = summary.skipped,
        images = summary.assets,
        "done"
    );
    if let Some(reason) = summary.pdf_error {
        warn!("PDF was not created: {reason}");
    }
    Ok(())
}

/// 交互式询问元数据，空输入保留方括号中的默认值
fn prompt_metadata(defaults: Metadata) -> io::Result<Metadata> {
    println!("Enter the book metadata. Leave a field empty to keep the default.");
    let stdin = io::stdin();
    let mut lines = stdin.lock();

    let mut ask = |label: &str, default: String| -> io::Result<String> {
        print!("{label} [{default}]: ");
        io::stdout().flush()?;
        let mut line = String::new();
        lines.read_line(&mut line)?;
        let answer = line.trim();
        Ok(if answer.is_empty() {
            default
        } else {
            answer.to_string()
        })
    };

    Ok(Metadata {
        title: ask("Title", defaults.title)?,
        author: ask("Author", defaults.author)?,
        language: ask("Language (en, cs, it, ...)", defaults.language)?,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::get_or_default("info".to_string())));
    let ansi = atty::is(atty::Stream::Stderr) && !NoColor::get_or_default(false);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
