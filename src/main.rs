use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use fragmentarium::config;
use fragmentarium::db;
use fragmentarium::export::{self, ExportFormat};
use fragmentarium::ingest;
use fragmentarium::migrate;
use fragmentarium::models::Fragment;
use fragmentarium::server;
use fragmentarium::similarity;
use fragmentarium::store::FragmentStore;

#[derive(Parser)]
#[command(name = "frag", version, about = "Local-first fragment engine")]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "./config/frag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the fragment database
    Init,
    /// Ingest files (or a directory) into fragments
    Ingest {
        /// Files to ingest
        paths: Vec<PathBuf>,
        /// Ingest every file under this directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// List fragments, newest first
    List {
        /// Substring filter on fragment content
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 25)]
        page_size: i64,
    },
    /// Show related fragments for the current page
    Similar {
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 25)]
        page_size: i64,
        /// Minimum similarity score (overrides config)
        #[arg(long)]
        threshold: Option<f64>,
        /// Maximum related fragments per fragment (overrides config)
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Run batch similarity over the whole store and write the signal log
    Batch {
        /// Minimum similarity score (overrides config)
        #[arg(long)]
        threshold: Option<f64>,
        /// Signal log path (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Export selected fragments as md, txt, or zip
    Export {
        /// Fragment ids, comma or whitespace separated
        ids: String,
        #[arg(long, default_value = "md")]
        format: String,
        /// Output file (defaults to fragments.<ext> in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the HTTP server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest { paths, dir } => {
            let store = open_store(&config).await?;
            let mut all_paths = paths;
            if let Some(dir) = dir {
                all_paths.extend(ingest::collect_dir(&dir)?);
            }
            if all_paths.is_empty() {
                anyhow::bail!("nothing to ingest: pass file paths or --dir");
            }
            let report = ingest::ingest_paths(&store, &config, &all_paths).await?;
            println!("ingested: {}", report.ingested);
            println!("skipped: {}", report.skipped);
            println!("batch id: {}", report.batch_id);
            println!("ok");
        }
        Commands::List {
            query,
            page,
            page_size,
        } => {
            let store = open_store(&config).await?;
            let fragments = browse(&store, query.as_deref(), page, page_size).await?;
            if fragments.is_empty() {
                println!("No fragments found.");
            }
            for fragment in &fragments {
                print_fragment_line(fragment);
            }
        }
        Commands::Similar {
            query,
            page,
            page_size,
            threshold,
            top_k,
        } => {
            let store = open_store(&config).await?;
            let threshold = threshold.unwrap_or(config.similarity.threshold);
            let top_k = top_k.unwrap_or(config.similarity.top_k);
            let fragments = browse(&store, query.as_deref(), page, page_size).await?;
            let inputs: Vec<(i64, String)> = fragments
                .iter()
                .map(|f| (f.id, f.content.clone()))
                .collect();
            let related = similarity::related(&inputs, threshold, top_k);
            for fragment in &fragments {
                print_fragment_line(fragment);
                match related.get(&fragment.id) {
                    Some(entries) if !entries.is_empty() => {
                        for entry in entries {
                            println!("    ~ #{} ({:.3})", entry.id, entry.similarity);
                        }
                    }
                    _ => println!("    ~ no related fragments"),
                }
            }
        }
        Commands::Batch { threshold, output } => {
            let store = open_store(&config).await?;
            let threshold = threshold.unwrap_or(config.similarity.batch_threshold);
            let output = output.unwrap_or_else(|| config.similarity.signal_log.clone());

            let fragments = collect_all(&store).await?;
            let inputs: Vec<(i64, String)> = fragments
                .iter()
                .map(|f| (f.id, f.content.clone()))
                .collect();
            let signals = similarity::pairwise(&inputs, threshold);
            let log = similarity::write_signal_log(&output, threshold, signals)?;
            println!(
                "wrote {} signal(s) to {}",
                log.signals.len(),
                output.display()
            );
        }
        Commands::Export {
            ids,
            format,
            output,
        } => {
            let format = ExportFormat::parse(&format)
                .ok_or_else(|| anyhow::anyhow!("unknown export format: {format}"))?;
            let ids = export::parse_ids(&ids);
            if ids.is_empty() {
                anyhow::bail!("no valid fragment ids given");
            }
            let store = open_store(&config).await?;
            let fragments = store.get_by_ids(&ids).await?;
            let bytes = export::assemble(&fragments, format)?;
            match output {
                Some(output) => {
                    std::fs::write(&output, bytes)?;
                    println!(
                        "exported {} fragment(s) to {}",
                        fragments.len(),
                        output.display()
                    );
                }
                // Text renderings stream to stdout; a zip always needs a file.
                None if format == ExportFormat::Zip => {
                    let output = PathBuf::from(format.file_name());
                    std::fs::write(&output, bytes)?;
                    println!(
                        "exported {} fragment(s) to {}",
                        fragments.len(),
                        output.display()
                    );
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        Commands::Serve => {
            migrate::run_migrations(&config).await?;
            server::run_server(&config).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &config::Config) -> anyhow::Result<FragmentStore> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;
    Ok(FragmentStore::new(pool))
}

async fn browse(
    store: &FragmentStore,
    query: Option<&str>,
    page: i64,
    page_size: i64,
) -> anyhow::Result<Vec<Fragment>> {
    if page < 1 {
        anyhow::bail!("--page must be >= 1");
    }
    if page_size < 1 {
        anyhow::bail!("--page-size must be >= 1");
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| anyhow::anyhow!("--page is out of range"))?;
    let fragments = match query.map(str::trim) {
        Some(q) if !q.is_empty() => store.search(q, page_size, offset).await?,
        _ => store.list(page_size, offset).await?,
    };
    Ok(fragments)
}

/// Page through the whole store, ascending by id. Batch mode wants every
/// fragment, not a view.
async fn collect_all(store: &FragmentStore) -> anyhow::Result<Vec<Fragment>> {
    const PAGE: i64 = 500;
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = store.list(PAGE, offset).await?;
        let len = page.len();
        all.extend(page);
        if (len as i64) < PAGE {
            break;
        }
        offset += PAGE;
    }
    all.sort_by_key(|f| f.id);
    Ok(all)
}

fn print_fragment_line(fragment: &Fragment) {
    let kind = fragment
        .source_type
        .map(|t| t.as_str())
        .unwrap_or("unknown");
    let source = fragment.source.as_deref().unwrap_or("-");
    let page = fragment
        .source_page
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let date = chrono::DateTime::from_timestamp(fragment.created_at, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| fragment.created_at.to_string());
    println!(
        "#{} [{}] {} p{} {}",
        fragment.id, kind, source, page, date
    );
    println!("    {}", excerpt(&fragment.content, 80));
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat: String = content
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}
