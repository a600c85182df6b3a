use std::path::{Path, PathBuf};

use anyhow::Context as _;
use avatar_compositor::{
    Bitmap, Collection, Configurable, LayerCompositor, LayerKind, LayerSelection, LayerSource,
    SaveOutcome,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avatar-compositor", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose an icon from layer images and write it out.
    Compose(ComposeArgs),
    /// Compose an icon and store it in a content-addressed collection.
    Save(SaveArgs),
    /// Print the content hash of an image.
    Hash(HashArgs),
    /// Scale an image's alpha channel.
    Fade(FadeArgs),
}

#[derive(Args, Debug)]
struct LayerArgs {
    /// Layer selection JSON; explicit layer flags override its entries.
    #[arg(long)]
    selection: Option<PathBuf>,

    /// Frame layer image.
    #[arg(long)]
    frame: Option<PathBuf>,

    /// Character layer image.
    #[arg(long)]
    character: Option<PathBuf>,

    /// Background layer image.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Use this image as the result instead of merging the layers.
    #[arg(long)]
    working: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ComposeArgs {
    #[command(flatten)]
    layers: LayerArgs,

    /// Output path; the extension is forced to match the format.
    #[arg(long)]
    out: PathBuf,

    /// Write JPEG instead of PNG.
    #[arg(long, default_value_t = false)]
    jpeg: bool,

    /// Also write the layer selection as JSON to this path.
    #[arg(long)]
    export_selection: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SaveArgs {
    #[command(flatten)]
    layers: LayerArgs,

    /// Collection directory.
    #[arg(long)]
    collection: PathBuf,
}

#[derive(Args, Debug)]
struct HashArgs {
    /// Image to hash.
    path: PathBuf,
}

#[derive(Args, Debug)]
struct FadeArgs {
    /// Input image.
    path: PathBuf,

    /// Alpha factor, clamped to 0..=1.
    #[arg(long)]
    alpha: f32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Compose(args) => cmd_compose(args),
        Command::Save(args) => cmd_save(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Fade(args) => cmd_fade(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_selection(layers: &LayerArgs) -> anyhow::Result<LayerSelection> {
    let mut selection = match &layers.selection {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("read selection '{}'", path.display()))?;
            LayerSelection::from_json(&json)
                .with_context(|| format!("parse selection '{}'", path.display()))?
        }
        None => LayerSelection::new(),
    };

    let overrides = [
        (LayerKind::Frame, &layers.frame),
        (LayerKind::Character, &layers.character),
        (LayerKind::Background, &layers.background),
        (LayerKind::Working, &layers.working),
    ];
    for (kind, path) in overrides {
        if let Some(path) = path {
            selection = selection.with_layer(kind, path);
        }
    }
    Ok(selection)
}

fn compose(layers: &LayerArgs) -> anyhow::Result<LayerCompositor> {
    let selection = read_selection(layers)?;
    let mut compositor = LayerCompositor::new()?;
    compositor.apply_selection(&selection)?;

    for kind in LayerKind::ALL {
        if let LayerSource::Failed { path, reason } = compositor.source(kind) {
            tracing::warn!(layer = %kind, path = %path.display(), %reason, "layer left blank");
        }
    }
    Ok(compositor)
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let compositor = compose(&args.layers)?;
    let working = compositor.working();

    ensure_parent(&args.out)?;
    let written = if args.jpeg {
        working.write_jpeg(&args.out)
    } else {
        working.write_png(&args.out)
    }
    .with_context(|| format!("write icon '{}'", args.out.display()))?;

    if let Some(path) = &args.export_selection {
        let json = compositor.export_selection().to_json_pretty()?;
        std::fs::write(path, json)
            .with_context(|| format!("write selection '{}'", path.display()))?;
    }

    eprintln!("wrote {}", written.display());
    Ok(())
}

fn cmd_save(args: SaveArgs) -> anyhow::Result<()> {
    let compositor = compose(&args.layers)?;
    let collection = Collection::new(&args.collection);

    match collection.save(compositor.working())? {
        SaveOutcome::Saved(path) => eprintln!("saved {}", path.display()),
        SaveOutcome::AlreadyPresent(path) => eprintln!("already saved as {}", path.display()),
    }
    Ok(())
}

fn cmd_hash(args: HashArgs) -> anyhow::Result<()> {
    let bitmap = Bitmap::open(&args.path)
        .with_context(|| format!("decode image '{}'", args.path.display()))?;
    println!("{}", bitmap.hash());
    Ok(())
}

fn cmd_fade(args: FadeArgs) -> anyhow::Result<()> {
    let mut bitmap = Bitmap::open(&args.path)
        .with_context(|| format!("decode image '{}'", args.path.display()))?;
    bitmap.apply_alpha(args.alpha);

    ensure_parent(&args.out)?;
    let written = bitmap
        .write_png(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {}", written.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}
