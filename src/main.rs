use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use overlay_translator::{
    DetectionOutcome, OffsetStore, OutputFormat, OverlayScene, OverlayView, Session, annotation,
    export, logging, settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "overlay-translator",
    version,
    about = "Detect, translate and label text in images"
)]
struct Cli {
    /// API key (overrides GEMINI_API_KEY / GOOGLE_API_KEY)
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect and translate text regions, printing annotations as JSON
    Detect {
        image: PathBuf,
        /// Target language (default from settings)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,
        /// Write annotations here instead of stdout
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Render boxes and labels onto the image at native resolution
    Export {
        image: PathBuf,
        #[arg(short = 'a', long = "annotations")]
        annotations: PathBuf,
        /// Label offsets as a JSON object keyed by annotation index
        #[arg(long = "offsets")]
        offsets: Option<PathBuf>,
        /// Output format (jpeg or png; default from settings)
        #[arg(short = 'f', long = "format")]
        format: Option<String>,
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Render the interactive preview at a display size (.svg or .png)
    Preview {
        image: PathBuf,
        #[arg(short = 'a', long = "annotations")]
        annotations: PathBuf,
        #[arg(long = "offsets")]
        offsets: Option<PathBuf>,
        #[arg(long = "max-width", default_value_t = 1024.0)]
        max_width: f32,
        #[arg(long = "max-height", default_value_t = 768.0)]
        max_height: f32,
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
    },
    /// Edit the whole image with a free-text instruction
    Edit {
        image: PathBuf,
        #[arg(short = 'i', long = "instruction")]
        instruction: String,
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long = "addr", default_value = "127.0.0.1:8787")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let settings = settings::load_settings(cli.read_settings.as_deref())?;

    match cli.command {
        Command::Detect { image, lang, out } => {
            let mut session = upload(&image)?;
            let provider = overlay_translator::build_gemini(&settings, cli.key.as_deref())?;
            let lang = lang.unwrap_or_else(|| settings.target_lang.clone());
            let outcome = overlay_translator::detect_into(&mut session, &provider, &lang).await?;
            if outcome == DetectionOutcome::NothingFound {
                eprintln!("no text detected");
            }
            let json = serde_json::to_string_pretty(session.annotations())?;
            match out {
                Some(path) => write_file(&path, json.as_bytes())?,
                None => println!("{}", json),
            }
        }
        Command::Export {
            image,
            annotations,
            offsets,
            format,
            out,
        } => {
            let mut session = upload(&image)?;
            session.apply_detection(read_annotations(&annotations)?);
            *session.offsets_mut() = read_offsets(offsets.as_deref())?;
            let mut options = settings.export_options()?;
            if let Some(format) = format {
                options.format = OutputFormat::parse(&format, settings.export_quality)
                    .ok_or_else(|| anyhow!("unsupported format '{}'", format))?;
            }
            let style = settings.overlay_style();
            let artifact = overlay_translator::export_session(&session, &style, &options).await?;
            let out = out.unwrap_or_else(|| {
                default_output(&image, "annotated", options.format.extension())
            });
            write_file(&out, &artifact.bytes)?;
            eprintln!("wrote {} ({}x{})", out.display(), artifact.width, artifact.height);
        }
        Command::Preview {
            image,
            annotations,
            offsets,
            max_width,
            max_height,
            out,
        } => {
            let bytes = read_file(&image)?;
            let annotations = read_annotations(&annotations)?;
            let offsets = read_offsets(offsets.as_deref())?;
            let style = settings.overlay_style();
            let scene = OverlayScene {
                annotations: &annotations,
                offsets: &offsets,
                style: &style,
                options: settings.layout_options(),
            };
            let loaded = export::load_source(bytes.clone(), settings.asset_timeout).await?;
            let view = OverlayView::fit(loaded.width(), loaded.height(), max_width, max_height);
            let is_svg = out
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
            if is_svg {
                let svg = view.render_svg_embedded(&bytes, &loaded.mime, &scene);
                write_file(&out, svg.as_bytes())?;
            } else {
                let png = view.render_png(&loaded, &scene)?;
                write_file(&out, &png)?;
            }
            eprintln!("wrote {}", out.display());
        }
        Command::Edit {
            image,
            instruction,
            out,
        } => {
            let mut session = upload(&image)?;
            let provider = overlay_translator::build_gemini(&settings, cli.key.as_deref())?;
            let edited =
                overlay_translator::edit_into(&mut session, &provider, &instruction).await?;
            let extension = edited.mime.strip_prefix("image/").unwrap_or("png");
            let out = out.unwrap_or_else(|| default_output(&image, "edited", extension));
            write_file(&out, &edited.bytes)?;
            eprintln!("wrote {}", out.display());
        }
        Command::Serve { addr } => {
            overlay_translator::server::run_server(settings, addr).await?;
        }
    }
    Ok(())
}

fn upload(path: &Path) -> Result<Session> {
    let mut session = Session::new();
    session
        .upload(read_file(path)?)
        .with_context(|| format!("failed to load image: {}", path.display()))?;
    Ok(session)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn read_annotations(path: &Path) -> Result<Vec<annotation::Annotation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    annotation::parse_annotations_json(&text)
}

fn read_offsets(path: Option<&Path>) -> Result<OffsetStore> {
    let Some(path) = path else {
        return Ok(OffsetStore::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse offsets: {}", path.display()))
}

fn default_output(image: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image");
    image.with_file_name(format!("{}.{}.{}", stem, suffix, extension))
}
