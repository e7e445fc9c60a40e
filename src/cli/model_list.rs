use std::error::Error;

use crate::api::models::{fetch_models, sort_models};
use crate::core::config::Config;

/// Print the models installed on the server, one per line.
pub async fn list_models(base_url: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let base_url = base_url.unwrap_or_else(|| config.resolved_base_url());

    let client = reqwest::Client::new();
    let mut tags = fetch_models(&client, &base_url).await?;

    if tags.models.is_empty() {
        println!("No models installed at {base_url}. Pull one with: ollama pull <model>");
        return Ok(());
    }

    sort_models(&mut tags.models);
    println!("Models at {base_url}:");
    for model in &tags.models {
        println!("  {}", model.name);
    }
    Ok(())
}
