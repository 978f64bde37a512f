//! Writes the gateway's OpenAPI document, by default to `openapi.json`.

use anyhow::Context;
use utoipa::OpenApi;
use voicegate_api::router::ApiDoc;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    let spec_json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize OpenAPI document")?;
    std::fs::write(&path, spec_json).with_context(|| format!("Failed to write {path}"))?;
    println!("Wrote {path}");
    Ok(())
}
