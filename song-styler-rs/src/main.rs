use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use song_styler::{
    char_counter, expand_audio_files, read_audio_file, render_ascii, AmplitudeEnvelope, Catalog,
    DummyBackend, EmbeddingBackend, Styler, StylerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "song-styler",
    about = "Prompt-to-style music tags and waveform inspection"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build include / exclude style strings for a prompt
    Style(StyleArgs),
    /// Show the descriptor ranking for a prompt
    Rank(RankArgs),
    /// Embed the descriptors and write a stacked embeddings file
    EmbedCatalog(EmbedArgs),
    /// Summarize audio files as scrubbable waveforms
    Waveform(WaveformArgs),
}

#[derive(Args, Debug)]
#[cfg_attr(not(feature = "tract"), allow(dead_code))]
struct CatalogArgs {
    /// descriptors.json
    #[arg(long = "descriptors")]
    descriptors: PathBuf,

    /// Stacked embeddings (model-descriptors.json); embedded on the fly when omitted
    #[arg(long = "embeddings")]
    embeddings: Option<PathBuf>,

    /// Styler config (JSON)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Backend: dummy | tract (requires --features tract)
    #[arg(long = "backend", default_value = "dummy")]
    backend: String,

    /// Sentence encoder ONNX (when backend=tract)
    #[arg(long = "text-model")]
    text_model: Option<PathBuf>,

    /// tokenizer.json or its directory (when backend=tract)
    #[arg(long = "tokenizer")]
    tokenizer: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StyleArgs {
    prompt: String,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Character budget per output
    #[arg(long = "budget")]
    budget: Option<usize>,

    /// Max ranked entries feeding each side
    #[arg(long = "window")]
    window: Option<usize>,

    /// Output JSON to stdout only
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct RankArgs {
    prompt: String,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Rows to show
    #[arg(long = "top-k", default_value_t = 10)]
    top_k: usize,

    /// Output JSON (array) to stdout only
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct EmbedArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Where to write the stacked embeddings
    #[arg(long = "out")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct WaveformArgs {
    /// Files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Envelope buckets (columns)
    #[arg(long = "buckets", default_value_t = 80)]
    buckets: usize,

    /// Rows of the text rendering
    #[arg(long = "height", default_value_t = 9)]
    height: usize,

    /// Playhead position in seconds
    #[arg(long = "at")]
    at: Option<f32>,

    /// Output JSON (array) to stdout only
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_backend(args: &CatalogArgs) -> anyhow::Result<Box<dyn EmbeddingBackend>> {
    let backend: Box<dyn EmbeddingBackend> = match args.backend.as_str() {
        #[cfg(feature = "tract")]
        "tract" => {
            use song_styler::TractBackend;
            let model = args
                .text_model
                .as_ref()
                .context("--text-model required for tract")?;
            let tokenizer = args
                .tokenizer
                .as_ref()
                .context("--tokenizer required for tract")?;
            Box::new(TractBackend::from_paths(model, tokenizer).context("load tract model")?)
        }
        "dummy" => Box::new(DummyBackend::new()),
        other => anyhow::bail!("unknown backend {other:?}"),
    };
    Ok(backend)
}

fn build_styler(
    args: &CatalogArgs,
    config: StylerConfig,
) -> anyhow::Result<Styler<Box<dyn EmbeddingBackend>>> {
    let backend = build_backend(args)?;
    let catalog = Catalog::load_or_embed(&args.descriptors, args.embeddings.as_deref(), &backend)
        .with_context(|| format!("load catalog {}", args.descriptors.display()))?;
    Ok(Styler::new(backend, Arc::new(catalog), config))
}

fn load_config(args: &CatalogArgs) -> anyhow::Result<StylerConfig> {
    match &args.config {
        Some(path) => StylerConfig::from_path(path)
            .with_context(|| format!("read config {}", path.display())),
        None => Ok(StylerConfig::default()),
    }
}

fn run_style(args: StyleArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.catalog)?;
    if let Some(budget) = args.budget {
        config.budget = budget;
    }
    if args.window.is_some() {
        config.window = args.window;
    }
    config.validate()?;
    let budget = config.budget;
    let styler = build_styler(&args.catalog, config)?;
    let styles = styler.song_styles(&args.prompt)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&styles)?);
        return Ok(());
    }
    for (label, text) in [
        ("Include", styles.include_text()),
        ("Exclude", styles.exclude_text()),
    ] {
        println!(
            "{} {}",
            label.green().bold(),
            char_counter(&text, budget).dimmed()
        );
        println!("{}", text);
    }
    Ok(())
}

fn run_rank(args: RankArgs) -> anyhow::Result<()> {
    let config = load_config(&args.catalog)?;
    let styler = build_styler(&args.catalog, config)?;
    let ranked = styler.rank(&args.prompt)?;
    let shown = &ranked[..args.top_k.min(ranked.len())];
    if args.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }
    let mut table = comfy_table::Table::new();
    table.set_header(vec![
        "#".bold(),
        "Score".bold(),
        "Category".bold(),
        "Group".bold(),
        "Tag".bold(),
    ]);
    for r in shown {
        table.add_row(vec![
            r.rank.to_string(),
            format!("{:.4}", r.score),
            r.descriptor.category.clone(),
            r.descriptor.group.clone(),
            r.descriptor.tag.clone(),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_embed(args: EmbedArgs) -> anyhow::Result<()> {
    let backend = build_backend(&args.catalog)?;
    let records = Catalog::read_records(&args.catalog.descriptors)?;
    let catalog = Catalog::embed_with(records, &backend)?;
    catalog
        .write_embeddings(&args.out)
        .with_context(|| format!("write {}", args.out.display()))?;
    eprintln!(
        "{} {} descriptors x {} dims with {}",
        "Embedded".green().bold(),
        catalog.len(),
        catalog.dim(),
        backend.model_name()
    );
    Ok(())
}

#[derive(serde::Serialize)]
struct WaveformReport {
    file: PathBuf,
    duration_secs: f32,
    playhead_bucket: Option<usize>,
    envelope: AmplitudeEnvelope,
}

fn run_waveform(args: WaveformArgs) -> anyhow::Result<()> {
    let files = expand_audio_files(args.paths)?;
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        let audio = read_audio_file(&file)?;
        let envelope = AmplitudeEnvelope::from_audio(&audio, args.buckets)
            .with_context(|| format!("summarize {}", file.display()))?;
        reports.push(WaveformReport {
            file,
            duration_secs: envelope.duration_secs(),
            playhead_bucket: args.at.map(|t| envelope.bucket_at(t)),
            envelope,
        });
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for r in &reports {
        let fname = r.file.file_name().and_then(|s| s.to_str()).unwrap_or("?");
        eprintln!("{} {:.2}s", fname.bold(), r.duration_secs);
        for row in render_ascii(&r.envelope, args.height, r.playhead_bucket) {
            println!("{}", row.cyan());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Style(args) => run_style(args),
        Command::Rank(args) => run_rank(args),
        Command::EmbedCatalog(args) => run_embed(args),
        Command::Waveform(args) => run_waveform(args),
    }
}
