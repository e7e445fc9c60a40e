use crate::api::TagsResponse;
use crate::utils::url::construct_api_url;

pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<TagsResponse, Box<dyn std::error::Error>> {
    let tags_url = construct_api_url(base_url, "api/tags");
    let response = client
        .get(tags_url)
        .header("Content-Type", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("Server request failed with status {status}: {error_text}").into());
    }

    let tags = response.json::<TagsResponse>().await?;
    Ok(tags)
}

pub fn sort_models(models: &mut [crate::api::ModelEntry]) {
    // Alphabetical, case-insensitive, for a stable selector order
    models.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}
