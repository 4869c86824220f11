use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::Level;
use uspkg::{BuildOptions, Compression, Package, Progress, Verification};

#[derive(Parser)]
#[command(name = "uspkg", about = "Create, extract and preview .uspkg packages")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a folder into a new .uspkg file
    Create {
        folder:      PathBuf,
        output:      PathBuf,
        /// 1-100 characters
        title:       String,
        description: String,
        /// Preview image (png, jpg)
        image:       Option<PathBuf>,
        /// Free-form category tag
        #[arg(short, long, default_value = "")]
        kind:        String,
        /// Path of the primary executable inside the package
        #[arg(short, long, default_value = "")]
        entry_point: String,
        /// Bundle compression: deflate (default), zstd, stored
        #[arg(short, long, default_value = "deflate", value_parser = parse_compression)]
        compression: Compression,
        /// Compression level (method specific)
        #[arg(short, long)]
        level:       Option<i64>,
    },
    /// Extract a .uspkg file
    Extract {
        file:       PathBuf,
        output_dir: PathBuf,
        /// Refuse to extract a package that fails verification
        #[arg(long)]
        verify:     bool,
    },
    /// Verify a package and show its metadata
    Preview {
        file:      PathBuf,
        /// Write the preview image to this path
        #[arg(long)]
        image_out: Option<PathBuf>,
        /// Print metadata as JSON (image omitted)
        #[arg(long)]
        json:      bool,
    },
    /// Check every integrity layer of a package
    Verify {
        file: PathBuf,
        /// Derive the key from this id instead of the embedded one
        #[arg(long)]
        id:   Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create {
            folder, output, title, description, image, kind, entry_point, compression, level,
        } => {
            let mut opts = BuildOptions::new(title, description)
                .kind(kind)
                .entry_point(entry_point)
                .compression(compression, level);
            if let Some(path) = &image {
                opts = opts.image(std::fs::read(path)?);
            }

            let (tx, rx) = mpsc::channel::<Progress>();
            let out = output.clone();
            let worker = thread::spawn(move || {
                let mut report = |p: &Progress| {
                    let _ = tx.send(p.clone());
                };
                uspkg::build(&folder, &out, &opts, Some(&mut report))
            });

            let pb = make_progress_bar()?;
            for p in rx {
                pb.set_length(p.total as u64);
                pb.set_position(p.processed as u64);
                pb.set_message(p.member);
            }
            pb.finish_and_clear();

            let meta = worker.join().map_err(|_| "build worker panicked")??;
            println!("Created: {} ({} files, id {})", output.display(), meta.member_hashes.len(), meta.id);
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { file, output_dir, verify } => {
            let pkg = Package::open(&file)?;
            if verify {
                if let Some(reason) = failure_reason(pkg.verify(None)) {
                    return Err(format!("refusing to extract {}: {reason}", file.display()).into());
                }
            }
            let written = pkg.extract_to(&output_dir)?;
            println!("Extracted {} file(s) to: {}", written, output_dir.display());
        }

        // ── Preview ──────────────────────────────────────────────────────────
        Commands::Preview { file, image_out, json } => {
            let pkg = Package::open(&file)?;
            if let Some(reason) = failure_reason(pkg.verify(None)) {
                return Err(format!("package is invalid: {reason}").into());
            }
            let meta = pkg.metadata();

            if json {
                let mut value = serde_json::to_value(meta)?;
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("image");
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let image = meta.image.as_ref()
                    .map(|img| format!("{} B", img.len()))
                    .unwrap_or_else(|| "none".into());

                println!("── Package ──────────────────────────────────────────────");
                println!("  Path           {}", file.display());
                println!("  Status         valid");
                println!("  Title          {}", meta.title);
                println!("  Description    {}", meta.description);
                println!("  Kind           {}", or_dash(&meta.kind));
                println!("  Entry point    {}", or_dash(&meta.entry_point));
                println!("  Id             {}", meta.id);
                println!("  Files          {}", meta.member_hashes.len());
                println!("  Image          {}", image);
            }

            if let Some(path) = image_out {
                let img = meta.image.as_ref().ok_or("package has no preview image")?;
                std::fs::write(&path, img)?;
                println!("Image written: {}", path.display());
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { file, id } => {
            match failure_reason(uspkg::verify_file(&file, id.as_deref())) {
                None => println!("{}: valid", file.display()),
                Some(reason) => return Err(format!("{}: invalid ({reason})", file.display()).into()),
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn make_progress_bar() -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_prefix("packing");
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn failure_reason(verification: Verification) -> Option<String> {
    match verification {
        Verification::Verified    => None,
        Verification::Mismatch(m) => Some(format!("{} check failed: {m}", m.layer())),
        Verification::Unreadable(e) => Some(e.to_string()),
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    Compression::from_name(s).ok_or_else(|| format!("unknown compression '{s}' (deflate, zstd, stored)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_print_as_ascii_dash() {
        assert_eq!(or_dash(""), "-");
        assert_eq!(or_dash("bin/game"), "bin/game");
    }

    #[test]
    fn compression_flag_parses_known_methods() {
        assert_eq!(parse_compression("stored"), Ok(Compression::Stored));
        assert!(parse_compression("brotli").is_err());
    }
}
