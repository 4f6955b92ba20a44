use anyhow::{bail, Context};
use blog_rag_core::{
    format_context, ChangeFeedProcessor, DocumentStore, EmbeddingConfig, MongoStore,
    OpenAiEmbedder, RetrievalEngine, RetrievalOptions, StoreError, SweepController, VersionPolicy,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "blog-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// MongoDB connection string
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// Database name
    #[arg(long, default_value = "blog")]
    database: String,

    /// Posts collection name
    #[arg(long, default_value = "posts")]
    collection: String,

    /// Vector search index over the embedding field
    #[arg(long, default_value = "vector_index_1")]
    vector_index: String,

    /// Embedding model identifier
    #[arg(long, default_value = "text-embedding-3-large")]
    embedding_model: String,

    /// Output dimensions of the embedding model
    #[arg(long, default_value = "3072")]
    dimensions: usize,

    /// Superseded embedding dimensions still present on legacy posts
    #[arg(long = "superseded-dimension", default_values_t = [1536_usize])]
    superseded_dimensions: Vec<usize>,

    /// OpenAI API key; required for any command that embeds text
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// One-shot reconciliation sweep over the whole collection.
    Reconcile,
    /// Consume the insert change stream until ctrl-c or stream termination.
    Watch,
    /// Reconcile once, then watch the change stream.
    Run,
    /// Retrieve posts relevant to a query.
    Query {
        /// Query text
        #[arg(long)]
        query: String,
        /// Maximum number of results.
        #[arg(long, default_value = "5")]
        limit: usize,
        /// Minimum similarity score a result must clear.
        #[arg(long, default_value = "0.3")]
        threshold: f64,
        /// Print results as a prompt-ready context block.
        #[arg(long, default_value_t = false)]
        as_context: bool,
    },
    /// Check that the vector search index exists on the collection.
    CheckIndex,
    /// List posts with their embedding status.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = Arc::new(
        MongoStore::connect(
            &cli.mongodb_uri,
            &cli.database,
            &cli.collection,
            &cli.vector_index,
        )
        .await?,
    );
    let policy = VersionPolicy::new(EmbeddingConfig {
        model: cli.embedding_model.clone(),
        dimensions: cli.dimensions,
        superseded_dimensions: cli.superseded_dimensions.clone(),
    });

    match cli.command {
        Command::Reconcile => {
            let provider = Arc::new(build_provider(&cli)?);
            let sweep = SweepController::new(store, provider, policy);
            print_reconcile(sweep.reconcile().await?);
        }
        Command::Watch => {
            let provider = Arc::new(build_provider(&cli)?);
            watch_feed(store, provider, policy).await?;
        }
        Command::Run => {
            let provider = Arc::new(build_provider(&cli)?);
            let sweep = SweepController::new(store.clone(), provider.clone(), policy.clone());
            print_reconcile(sweep.reconcile().await?);
            watch_feed(store, provider, policy).await?;
        }
        Command::Query {
            ref query,
            limit,
            threshold,
            as_context,
        } => {
            let provider = Arc::new(build_provider(&cli)?);
            let engine = RetrievalEngine::new(
                store,
                provider,
                RetrievalOptions {
                    limit,
                    threshold,
                    ..RetrievalOptions::default()
                },
            );

            let results = engine.retrieve(&query, limit, threshold).await?;
            if results.is_empty() {
                println!("no posts cleared the threshold");
            }
            for hit in &results {
                println!(
                    "score={:.4} id={} title={}",
                    hit.score, hit.post.id, hit.post.title
                );
            }
            if as_context && !results.is_empty() {
                println!("{}", format_context(&results));
            }
        }
        Command::CheckIndex => {
            if store.vector_index_exists().await? {
                println!("vector index '{}' found", store.vector_index());
            } else {
                bail!("vector index '{}' not found", store.vector_index());
            }
        }
        Command::List => {
            let posts = store.find_all().await?;
            println!("{} posts", posts.len());
            for post in posts {
                let status = describe_embedding(&post, &policy);
                println!("{}  {}  [{status}]", post.id, post.title);
            }
        }
    }

    Ok(())
}

fn build_provider(cli: &Cli) -> anyhow::Result<OpenAiEmbedder> {
    let api_key = cli
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY is required for embedding calls")?;
    Ok(OpenAiEmbedder::new(
        api_key,
        cli.embedding_model.clone(),
        cli.dimensions,
    )?)
}

async fn watch_feed(
    store: Arc<MongoStore>,
    provider: Arc<OpenAiEmbedder>,
    policy: VersionPolicy,
) -> anyhow::Result<()> {
    let handle = ChangeFeedProcessor::new(store, provider, policy).start();

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, stopping change feed");
            canceller.cancel();
        }
    });

    match handle.join().await {
        Ok(report) => {
            println!(
                "change feed stopped: {} embedded, {} skipped, {} failed",
                report.embedded, report.skipped, report.failed
            );
            Ok(())
        }
        Err(StoreError::StreamTerminated(reason)) => {
            // Resubscription is left to the operator or supervisor.
            error!(%reason, "change stream terminated");
            bail!("change stream terminated: {reason}");
        }
        Err(error) => Err(error.into()),
    }
}

fn print_reconcile(report: blog_rag_core::ReconcileReport) {
    println!(
        "reconcile complete: {} created, {} migrated, {} skipped, {} failed",
        report.created, report.migrated, report.skipped, report.failed
    );
    for (post_id, reason) in &report.failures {
        println!("  failed {post_id}: {reason}");
    }
}

fn describe_embedding(post: &blog_rag_core::BlogPost, policy: &VersionPolicy) -> String {
    match (&post.embedding, &post.embedding_model) {
        (None, _) => "pending".to_string(),
        (Some(vector), Some(model)) => format!("{model} ({} dims)", vector.len()),
        (Some(vector), None) if policy.is_known_stale(vector.len()) => {
            format!("stale ({} dims)", vector.len())
        }
        (Some(vector), None) => format!("untagged ({} dims)", vector.len()),
    }
}
