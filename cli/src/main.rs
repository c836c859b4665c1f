//! pagemark CLI - PDF to editable HTML and back

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pagemark::model::MarkupKind;
use pagemark::{
    detect_from_path, extract_file_with_config, rebuild_file, render_html, render_json, Diagnostics,
    HtmlOptions, InputKind, JsonFormat, LopdfBackend, PageSelection, PipelineConfig, Severity,
};

/// Diagnostics printed before the list is cut short.
const MAX_LISTED_DIAGNOSTICS: usize = 20;

#[derive(Parser)]
#[command(name = "pagemark")]
#[command(version)]
#[command(about = "Turn PDF pages into editable HTML and rebuild PDFs from it", long_about = None)]
struct Cli {
    /// Input file (PDF to extract, HTML to rebuild)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a PDF into positioned HTML
    Extract {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (<name>.html if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write images into this directory instead of inlining them
        #[arg(long, value_name = "DIR")]
        assets: Option<PathBuf>,

        /// Write the extraction as JSON instead of HTML
        #[arg(long)]
        json: bool,

        /// Render a text-free background image under each page
        #[arg(long)]
        background: bool,

        /// Paint text boxes white on the background image
        #[arg(long, requires = "background")]
        blank_text: bool,

        /// Drop images smaller than a few pixels
        #[arg(long)]
        skip_decorative: bool,

        /// Page range (e.g., "1-10", "1,3,5")
        #[arg(long)]
        pages: Option<String>,

        /// Process pages one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Rebuild a PDF from edited HTML
    Rebuild {
        /// Input HTML file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output PDF file (<name>.pdf if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Original PDF, copied verbatim if nothing in the HTML can be placed
        #[arg(long, value_name = "PDF")]
        original: Option<PathBuf>,

        /// Place elements without a position at the page origin instead of skipping them
        #[arg(long)]
        default_to_origin: bool,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Extract {
            input,
            output,
            assets,
            json,
            background,
            blank_text,
            skip_decorative,
            pages,
            sequential,
        }) => {
            let options = ExtractArgs {
                assets,
                json,
                background,
                blank_text,
                skip_decorative,
                pages,
                sequential,
            };
            cmd_extract(&input, output.as_deref(), options)
        }
        Some(Commands::Rebuild {
            input,
            output,
            original,
            default_to_origin,
        }) => cmd_rebuild(&input, output.as_deref(), original.as_deref(), default_to_origin),
        Some(Commands::Info { input }) => cmd_info(&input),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: pick the direction from the input itself
            if let Some(input) = cli.input {
                cmd_auto(&input, cli.output.as_deref())
            } else {
                println!("{}", "Usage: pagemark <FILE> [OUTPUT]".yellow());
                println!("       pagemark --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[derive(Default)]
struct ExtractArgs {
    assets: Option<PathBuf>,
    json: bool,
    background: bool,
    blank_text: bool,
    skip_decorative: bool,
    pages: Option<String>,
    sequential: bool,
}

fn cmd_auto(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let kind = detect_from_path(input)?;
    log::info!("Detected {:?} input: {}", kind, input.display());
    match kind {
        InputKind::Pdf(_) => cmd_extract(input, output, ExtractArgs::default()),
        InputKind::Markup => cmd_rebuild(input, output, None, false),
    }
}

fn progress(len: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_extract(
    input: &Path,
    output: Option<&Path>,
    args: ExtractArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let extension = if args.json { "json" } else { "html" };
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension(extension));

    let mut config = PipelineConfig::new()
        .with_background(args.background)
        .with_blank_text_regions(args.blank_text)
        .with_skip_decorative_images(args.skip_decorative);
    if let Some(pages) = args.pages.as_deref() {
        let selection =
            PageSelection::parse(pages).map_err(|e| format!("Invalid page range: {}", e))?;
        config = config.with_pages(selection);
    }
    if let Some(dir) = args.assets {
        config = config.with_asset_dir(dir);
    }
    if args.sequential {
        config = config.sequential();
    }

    let pb = progress(2)?;
    pb.set_message("Extracting pages...");
    let extraction = extract_file_with_config(input, config)?;
    pb.inc(1);

    pb.set_message("Writing output...");
    let content = if args.json {
        render_json(&extraction, JsonFormat::Pretty)?
    } else {
        let title = extraction
            .metadata
            .title
            .clone()
            .or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();
        render_html(&extraction, &HtmlOptions::new().with_title(title))
    };
    fs::write(&output, content)?;
    pb.inc(1);
    pb.finish_with_message("Done!");

    println!(
        "\n{} {} pages to {}",
        "Extracted".green().bold(),
        extraction.page_count(),
        output.display()
    );
    print_diagnostics(&extraction.diagnostics);
    Ok(())
}

fn cmd_rebuild(
    input: &Path,
    output: Option<&Path>,
    original: Option<&Path>,
    default_to_origin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("pdf"));

    let mut config = PipelineConfig::new();
    if default_to_origin {
        config = config.with_missing_position(pagemark::MissingPositionPolicy::DefaultToOrigin);
    }

    let pb = progress(2)?;
    pb.set_message("Rebuilding PDF...");
    let rebuilt = rebuild_file(input, original, config)?;
    pb.inc(1);

    pb.set_message("Writing output...");
    fs::write(&output, &rebuilt.pdf)?;
    pb.inc(1);
    pb.finish_with_message("Done!");

    if rebuilt.fallback {
        println!(
            "\n{} nothing in {} could be placed; copied {} original pages",
            "Fallback:".yellow().bold(),
            input.display(),
            rebuilt.page_count
        );
    } else {
        println!(
            "\n{} {} pages to {}",
            "Rebuilt".green().bold(),
            rebuilt.page_count,
            output.display()
        );
    }
    print_diagnostics(&rebuilt.diagnostics);
    Ok(())
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let backend = LopdfBackend::load_file(input)?;
    let metadata = pagemark::DocumentEngine::metadata(&backend);

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), metadata.pdf_version);
    println!("{}: {}", "Pages".bold(), metadata.page_count);
    println!(
        "{}: {}",
        "Encrypted".bold(),
        if backend.is_encrypted() { "Yes" } else { "No" }
    );
    for (name, value) in metadata.text_fields() {
        println!("{}: {}", capitalize(name).bold(), value);
    }
    if let Some(ref created) = metadata.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(ref modified) = metadata.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }
    if backend.is_encrypted() {
        return Ok(());
    }

    let extraction = pagemark::DocumentAssembler::new(PipelineConfig::new())?.extract(&backend)?;

    println!();
    println!("{}", "Page Content".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for page in &extraction.pages {
        let markup = &page.markup;
        println!(
            "{} {:>3}: {:.0}x{:.0}pt  text {}  images {}  shapes {}  lines {}  tables {}",
            "Page".bold(),
            page.info.number,
            page.info.width,
            page.info.height,
            markup.count(MarkupKind::Text),
            markup.count(MarkupKind::Image),
            markup.count(MarkupKind::Vector),
            markup.count(MarkupKind::Line),
            markup.count(MarkupKind::Table),
        );
    }
    print_diagnostics(&extraction.diagnostics);
    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    println!(
        "\n{} {} recovered problems",
        "Diagnostics:".yellow().bold(),
        diagnostics.len()
    );
    for diagnostic in diagnostics.iter().take(MAX_LISTED_DIAGNOSTICS) {
        let marker = match diagnostic.severity {
            Severity::Element => "·".dimmed(),
            Severity::Page => "!".yellow(),
            Severity::Document => "!!".red(),
        };
        println!("  {} {}", marker, diagnostic);
    }
    if diagnostics.len() > MAX_LISTED_DIAGNOSTICS {
        println!(
            "  {} {} more",
            "…".dimmed(),
            diagnostics.len() - MAX_LISTED_DIAGNOSTICS
        );
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn cmd_version() {
    println!("{} {}", "pagemark".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF to editable HTML and back");
    println!();
    println!("License: MIT");
}
