use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use km_core::{Config, MemoryFilter, TagSet, UploadFile};
use km_daemon::{Daemon, DaemonConfig, ExecutionMode, UploadRequest};

#[derive(Parser)]
#[command(name = "kernel-memory")]
#[command(about = "Long-term memory service: ingest documents, search, and ask grounded questions over them")]
struct Cli {
  /// Directory documents and the vector store are persisted under.
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Run pipelines through the queue's background worker instead of inline.
  #[arg(long, global = true)]
  queued: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Import a document: one or more files plus optional tags.
  Import {
    /// Index to import into (normalized per the index naming rules).
    #[arg(short, long, default_value = "default")]
    index: String,
    /// Client-supplied document id; a uuid is generated if omitted.
    #[arg(long)]
    document_id: Option<String>,
    /// Files to ingest.
    files: Vec<PathBuf>,
    /// Tags as `key=value`, repeatable.
    #[arg(short, long = "tag")]
    tags: Vec<String>,
  },
  /// Import raw text as a single-file document.
  ImportText {
    #[arg(short, long, default_value = "default")]
    index: String,
    #[arg(long)]
    document_id: Option<String>,
    /// Name to give the synthesized file (e.g. "note.txt").
    #[arg(long, default_value = "note.txt")]
    file_name: String,
    text: String,
    #[arg(short, long = "tag")]
    tags: Vec<String>,
  },
  /// Begin tearing down a document.
  DeleteDocument {
    #[arg(short, long, default_value = "default")]
    index: String,
    document_id: String,
  },
  /// Begin tearing down an entire index (refused for the default index).
  DeleteIndex {
    index: String,
  },
  /// Report whether a document's pipeline has completed.
  Status {
    #[arg(short, long, default_value = "default")]
    index: String,
    document_id: String,
    #[arg(long)]
    json: bool,
  },
  /// Similarity search, grouped into citations.
  Search {
    #[arg(short, long, default_value = "default")]
    index: String,
    query: String,
    #[arg(short, long)]
    limit: Option<usize>,
    #[arg(long)]
    min_relevance: Option<f32>,
    /// Tag filters as `key=value`, repeatable; all in one flag group AND,
    /// passing the flag again starts a new OR'd filter group.
    #[arg(long = "filter")]
    filters: Vec<String>,
    #[arg(long)]
    json: bool,
  },
  /// Grounded question answering with citations.
  Ask {
    #[arg(short, long, default_value = "default")]
    index: String,
    question: String,
    #[arg(long)]
    min_relevance: Option<f32>,
    #[arg(long = "filter")]
    filters: Vec<String>,
    #[arg(long)]
    json: bool,
  },
  /// Run the background worker loop and sweep scheduler until interrupted.
  Serve,
  /// Print the resolved configuration as TOML.
  Config,
}

/// Console-only logging for one-shot CLI commands.
fn init_cli_logging() {
  tracing_subscriber::registry()
    .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .with(tracing_subscriber::fmt::layer().with_target(false))
    .init();
}

/// Console plus daily rolling-file logging for the long-running `Serve`
/// subcommand. Returns the guard that must be kept alive for the duration
/// of the process, or `None` if the log directory couldn't be created (in
/// which case console-only logging has already been initialized).
fn init_daemon_logging(data_dir: &std::path::Path) -> Option<WorkerGuard> {
  let log_dir = data_dir.join("logs");
  if std::fs::create_dir_all(&log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(&log_dir, "kernel-memory.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
  let console_layer = tracing_subscriber::fmt::layer().with_target(false);
  let file_layer = tracing_subscriber::fmt::layer().with_target(false).with_ansi(false).with_writer(file_writer);

  tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();

  Some(guard)
}

/// `key=value` tag arguments into a [`TagSet`]; bare `key` means a
/// presence-only (null-valued) tag.
fn parse_tags(raw: &[String]) -> Result<TagSet> {
  let mut tags = TagSet::new();
  for entry in raw {
    let (key, value) = match entry.split_once('=') {
      Some((k, v)) => (k, Some(v.to_string())),
      None => (entry.as_str(), None),
    };
    tags.insert_user(key, value).map_err(|e| anyhow::anyhow!("invalid tag {entry:?}: {e}"))?;
  }
  Ok(tags)
}

/// One `--filter` value is a comma-separated set of `key=value` predicates
/// ANDed together; repeating `--filter` ORs the groups.
fn parse_filters(raw: &[String]) -> Result<Vec<MemoryFilter>> {
  raw
    .iter()
    .map(|group| {
      let mut filter = MemoryFilter::new();
      for predicate in group.split(',') {
        let (key, value) = predicate.split_once('=').with_context(|| format!("filter predicate {predicate:?} must be key=value"))?;
        if let Some(negated_key) = key.strip_prefix('!') {
          filter = filter.by_tag_not(negated_key, value);
        } else {
          filter = filter.by_tag(key, value);
        }
      }
      Ok(filter)
    })
    .collect()
}

async fn build_daemon(cli: &Cli) -> Result<Daemon> {
  let mode = if cli.queued { ExecutionMode::Queued } else { ExecutionMode::InProcess };
  let data_dir = cli.data_dir.clone().unwrap_or_else(km_daemon::default_data_dir);
  let config = Config::load_for_project(&std::env::current_dir().unwrap_or_default());
  let daemon_config = DaemonConfig { data_dir, execution_mode: mode, config };
  Daemon::new(daemon_config).await.context("failed to start kernel-memory service")
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let _guard: Option<WorkerGuard> = if matches!(cli.command, Commands::Serve) {
    let data_dir = cli.data_dir.clone().unwrap_or_else(km_daemon::default_data_dir);
    init_daemon_logging(&data_dir)
  } else {
    init_cli_logging();
    None
  };

  match &cli.command {
    Commands::Config => {
      print!("{}", Config::generate_template());
      return Ok(());
    }
    Commands::Serve => {
      let daemon = build_daemon(&cli).await?;
      tracing::info!("kernel-memory service running, press ctrl-c to stop");
      daemon.run().await?;
      return Ok(());
    }
    _ => {}
  }

  let daemon = build_daemon(&cli).await?;

  match cli.command {
    Commands::Import { index, document_id, files, tags } => {
      let mut upload_files = Vec::with_capacity(files.len());
      for path in &files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string_lossy().into_owned());
        upload_files.push(UploadFile { name, bytes });
      }
      let request = UploadRequest { document_id, tags: parse_tags(&tags)?, files: upload_files, steps: None };
      let id = daemon.orchestrator().import_document(&index, request).await?;
      println!("{id}");
    }
    Commands::ImportText { index, document_id, file_name, text, tags } => {
      let request = UploadRequest { document_id, tags: parse_tags(&tags)?, files: vec![UploadFile { name: file_name, bytes: text.into_bytes() }], steps: None };
      let id = daemon.orchestrator().import_document(&index, request).await?;
      println!("{id}");
    }
    Commands::DeleteDocument { index, document_id } => {
      daemon.orchestrator().start_document_deletion(&index, &document_id).await?;
      println!("deletion pipeline started for {index}/{document_id}");
    }
    Commands::DeleteIndex { index } => {
      daemon.orchestrator().start_index_deletion(&index).await?;
      println!("deletion pipeline started for index {index}");
    }
    Commands::Status { index, document_id, json } => {
      let summary = daemon.orchestrator().read_pipeline_summary(&index, &document_id).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
      } else {
        println!("completed={} failed={} empty={} remaining={:?}", summary.completed, summary.failed, summary.empty, summary.remaining_steps);
      }
    }
    Commands::Search { index, query, limit, min_relevance, filters, json } => {
      let filters = parse_filters(&filters)?;
      let result = daemon.retrieval().search(&index, &query, &filters, limit, min_relevance).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
      } else if result.no_result {
        println!("no results");
      } else {
        for citation in &result.results {
          println!("{} ({})", citation.document_id, citation.source_name);
          for partition in &citation.partitions {
            println!("  [{:.3}] {}", partition.relevance, truncate(&partition.text, 160));
          }
        }
      }
    }
    Commands::Ask { index, question, min_relevance, filters, json } => {
      let filters = parse_filters(&filters)?;
      let answer = daemon.retrieval().ask(&index, &question, &filters, min_relevance).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
      } else {
        println!("{}", answer.text);
        if !answer.no_result {
          println!("\nsources:");
          for citation in &answer.relevant_sources {
            println!("  {} ({})", citation.document_id, citation.source_name);
          }
        }
      }
    }
    Commands::Serve | Commands::Config => unreachable!("handled above"),
  }

  Ok(())
}

fn truncate(text: &str, max: usize) -> String {
  if text.len() <= max {
    text.to_string()
  } else {
    format!("{}…", &text[..max])
  }
}
