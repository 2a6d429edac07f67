//! mealtax-ai - meal note classification CLI
//!
//! Maps free-text meal notes onto categories of a hierarchical food
//! taxonomy and stores the results in the local SQLite database.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mealtax_ai::config::{self as ai_config, ClassifierSettings};
use mealtax_ai::models::{normalize_language, Meal};
use mealtax_ai::services::{InferenceService, OpenAiClient};
use mealtax_ai::taxonomy::{self, TaxonomyIndex};
use mealtax_ai::workflow::{
    render_outcome, ClassificationPipeline, MealRecorder, SqliteStore, TaskSupervisor,
};
use mealtax_common::config::{self as common_config, TomlConfig};
use mealtax_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_USER: &str = "local";

/// Upper bound on waiting for background classification at exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Parser)]
#[command(name = "mealtax-ai", version, about = "Classify meal notes against a food taxonomy")]
struct Cli {
    /// TOML config file (defaults to the platform config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and default taxonomy file
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Taxonomy definition file
    #[arg(long, global = true)]
    taxonomy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a meal note now and print the result
    Classify {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
        /// Reclassify an existing meal id instead of storing a new meal
        #[arg(long)]
        meal: Option<String>,
    },
    /// Store a meal note and classify it in the background
    LogMeal {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
    },
    /// Fuzzy-search the taxonomy
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "en")]
        lang: String,
    },
    /// Print structural statistics of the taxonomy
    TaxonomyStats {
        #[arg(long)]
        json: bool,
    },
    /// Classify stored meals that have no items yet
    Backfill {
        /// Maximum meals to process (0 = all)
        #[arg(long)]
        limit: Option<u32>,
        /// Reclassify meals that already have items
        #[arg(long)]
        force: bool,
        /// Pause between meals
        #[arg(long, default_value_t = 0)]
        sleep_ms: u64,
    },
    /// Store the inference API key
    SetApiKey { key: String },
}

struct AppContext {
    toml: TomlConfig,
    root_folder: PathBuf,
    taxonomy_path: PathBuf,
    settings: ClassifierSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml = common_config::load_toml_config(cli.config.as_deref())?;
    init_tracing(&toml);

    info!(
        "mealtax-ai {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let root_folder = common_config::resolve_root_folder(cli.root.as_deref(), &toml);
    let taxonomy_path =
        common_config::resolve_taxonomy_path(cli.taxonomy.as_deref(), &toml, &root_folder);
    let settings = ClassifierSettings::from_toml(&toml)?;
    let ctx = AppContext {
        toml,
        root_folder,
        taxonomy_path,
        settings,
    };

    match cli.command {
        Command::Classify {
            text,
            lang,
            user,
            meal,
        } => classify(&ctx, &text, &lang, &user, meal).await,
        Command::LogMeal { text, lang, user } => log_meal(&ctx, &text, &lang, &user).await,
        Command::Search { query, limit, lang } => search(&ctx, &query, limit, &lang),
        Command::TaxonomyStats { json } => taxonomy_stats(&ctx, json),
        Command::Backfill {
            limit,
            force,
            sleep_ms,
        } => backfill(&ctx, limit, force, sleep_ms).await,
        Command::SetApiKey { key } => set_api_key(&ctx, &key, cli.config.as_deref()).await,
    }
}

/// Filter priority: RUST_LOG → TOML `[logging] level` → info
fn init_tracing(toml: &TomlConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&toml.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_index(ctx: &AppContext) -> Result<Arc<TaxonomyIndex>> {
    let index = taxonomy::shared::get_or_load(&ctx.taxonomy_path, &ctx.settings.load_options)
        .with_context(|| format!("Failed to load taxonomy {}", ctx.taxonomy_path.display()))?;
    info!(nodes = index.len(), "Taxonomy ready");
    Ok(index)
}

async fn open_database(ctx: &AppContext) -> Result<SqlitePool> {
    let db_path = common_config::database_path(&ctx.root_folder);
    info!("Database: {}", db_path.display());
    Ok(mealtax_common::db::init_database(&db_path).await?)
}

struct Runtime {
    store: SqliteStore,
    pipeline: Arc<ClassificationPipeline>,
    has_key: bool,
}

async fn build_runtime(ctx: &AppContext) -> Result<Runtime> {
    let index = load_index(ctx)?;
    let pool = open_database(ctx).await?;
    let store = SqliteStore::from_settings(pool.clone(), EventBus::new(100)).await?;

    let api_key = ai_config::resolve_openai_api_key(&pool, &ctx.toml)
        .await?
        .unwrap_or_default();
    if api_key.is_empty() {
        warn!("No inference API key configured; meals will not be classified");
    }

    let client = OpenAiClient::new(ctx.settings.inference_settings(&api_key))?;
    let service: Arc<dyn InferenceService> = Arc::new(client);
    let store_arc = Arc::new(store.clone());
    let pipeline = ClassificationPipeline::new(
        ctx.settings.pipeline_config(&api_key),
        index,
        service,
        store_arc.clone(),
        store_arc,
    );

    Ok(Runtime {
        store,
        pipeline: Arc::new(pipeline),
        has_key: !api_key.is_empty(),
    })
}

async fn classify(
    ctx: &AppContext,
    text: &str,
    lang: &str,
    user: &str,
    meal_id: Option<String>,
) -> Result<()> {
    let rt = build_runtime(ctx).await?;
    let lang = normalize_language(lang);

    let meal_id = match meal_id {
        Some(id) => id,
        None => {
            let meal = Meal::new(user, text, lang);
            mealtax_ai::db::meals::insert_meal(rt.store.pool(), &meal).await?;
            meal.id
        }
    };

    let results = rt.pipeline.try_process_meal(user, &meal_id, text, lang).await?;
    println!("meal {}", meal_id);
    println!("{}", render_outcome(&results, lang, rt.has_key));
    Ok(())
}

async fn log_meal(ctx: &AppContext, text: &str, lang: &str, user: &str) -> Result<()> {
    let rt = build_runtime(ctx).await?;
    let store = Arc::new(rt.store.clone());
    let supervisor = TaskSupervisor::new();
    let recorder = MealRecorder::new(store.clone(), store, rt.pipeline, supervisor.clone());

    let meal = recorder.record_meal(user, text, lang).await?;
    println!("meal {} saved", meal.id);

    if !supervisor.drain_timeout(DRAIN_TIMEOUT).await {
        warn!(in_flight = supervisor.in_flight(), "Classification still running at exit");
    }

    let items = mealtax_ai::db::meal_items::list_meal_items(rt.store.pool(), &meal.id).await?;
    println!("{} item(s) stored", items.len());
    Ok(())
}

fn search(ctx: &AppContext, query: &str, limit: usize, lang: &str) -> Result<()> {
    let index = load_index(ctx)?;
    let lang = normalize_language(lang);
    for candidate in index.search(query, limit) {
        println!(
            "{:>3}  L{:<2} {}  {}",
            candidate.lexical_score,
            candidate.level,
            candidate.category_id,
            index.get_label(&candidate.category_id, lang)
        );
    }
    Ok(())
}

fn taxonomy_stats(ctx: &AppContext, json: bool) -> Result<()> {
    let index = load_index(ctx)?;
    let stats = index.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        if let Some(source) = index.source() {
            println!("Source:                {}", source.display());
        }
        print!("{}", stats);
    }
    Ok(())
}

async fn backfill(ctx: &AppContext, limit: Option<u32>, force: bool, sleep_ms: u64) -> Result<()> {
    let rt = build_runtime(ctx).await?;
    if !rt.has_key {
        bail!("Backfill needs an inference API key (set-api-key, OPENAI_API_KEY or [inference] api_key)");
    }

    let pool = rt.store.pool();
    let meals = mealtax_ai::db::meals::list_meals(pool, limit).await?;
    let total = meals.len();
    let (mut processed, mut skipped, mut failed) = (0usize, 0usize, 0usize);

    for (i, meal) in meals.iter().enumerate() {
        if !force && mealtax_ai::db::meals::meal_has_items(pool, &meal.id).await? {
            skipped += 1;
            continue;
        }

        let lang = normalize_language(&meal.language);
        match rt
            .pipeline
            .try_process_meal(&meal.user_id, &meal.id, &meal.notes_text, lang)
            .await
        {
            Ok(results) => {
                processed += 1;
                println!("[{}/{}] {}: {} item(s)", i + 1, total, meal.id, results.len());
            }
            Err(e) => {
                failed += 1;
                println!("[{}/{}] {}: failed: {}", i + 1, total, meal.id, e);
            }
        }

        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
    }

    println!(
        "processed={} skipped={} failed={} total={}",
        processed, skipped, failed, total
    );
    Ok(())
}

async fn set_api_key(ctx: &AppContext, key: &str, explicit_config: Option<&Path>) -> Result<()> {
    let pool = open_database(ctx).await?;
    let toml_path = match explicit_config {
        Some(path) => path.to_path_buf(),
        None => common_config::user_config_file()?,
    };
    ai_config::store_api_key(&pool, key, &toml_path).await?;
    println!("API key stored");
    Ok(())
}
