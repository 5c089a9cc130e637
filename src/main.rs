#![deny(clippy::all)]

mod console;

use anyhow::Context;
use consult_script::config::{self, Config};
use consult_script::openai::OpenAIClient;
use consult_script::storage::ConsultationStore;
use tracing::info;
use zeroize::Zeroize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;

    let mut api_key = config::api_key()?;
    let client = OpenAIClient::new(&config.openai, &api_key);
    api_key.zeroize();
    let client = client?;
    info!(model = %config.openai.model, "OpenAI client ready");

    let root = config
        .storage
        .data_dir()
        .or_else(ConsultationStore::default_root)
        .context("Could not determine a data directory; set CONSULT_DATA_DIR")?;
    info!("Saving consultations under {:?}", root);
    let store = ConsultationStore::new(root);

    console::Console::new(config, Box::new(client), store)
        .run()
        .await
}
