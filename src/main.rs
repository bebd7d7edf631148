use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use research_pipeline::artifacts::ArtifactStore;
use research_pipeline::chat;
use research_pipeline::classifier::QueryClassifier;
use research_pipeline::config::{ConfigManager, FileConfigManager};
use research_pipeline::llm::{LanguageModel, OllamaClient};
use research_pipeline::pipeline::Pipeline;
use research_pipeline::scrape::ScrapeStage;
use research_pipeline::search::{DuckDuckGoProvider, SearchStage};

#[derive(Parser)]
#[command(name = "research-pipeline")]
#[command(about = "Classify a query, search the web, and scrape the results", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the classify/search/scrape pipeline for one query
    Run { query: String },
    /// Chat with the configured local model, streaming tokens to the terminal
    Chat,
}

#[tokio::main]
async fn main() -> research_pipeline::error::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config_manager = FileConfigManager::new(cli.config);
    let config = config_manager.load_config().await?;

    let model: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(&config.model)?);

    match cli.command {
        Commands::Run { query } => {
            let store = ArtifactStore::new(config.output.directory.clone());
            store.ensure_dir()?;

            let classifier = QueryClassifier::new(model);
            let provider = Arc::new(DuckDuckGoProvider::new(&config.search)?);
            let search = SearchStage::new(provider, store.clone(), config.search.max_results);
            let scrape = ScrapeStage::new(
                store,
                Duration::from_secs(config.scrape.page_timeout_secs),
            );

            let pipeline = Pipeline::new(classifier, search, scrape);
            let report = pipeline.run(&query).await?;
            println!("{}", report.render());
        }
        Commands::Chat => {
            chat::run_repl(model.as_ref()).await?;
        }
    }

    Ok(())
}
