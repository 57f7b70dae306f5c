//! `macrodesk generate`: one direct generation, printed as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};

use macrodesk::clock::{Clock, SystemClock};
use macrodesk::config::Config;
use macrodesk::insights::SectionGenerator;
use macrodesk::providers::GeminiProvider;

pub(crate) async fn cmd_generate(config: Config, section: &str) -> Result<()> {
    let provider = GeminiProvider::from_config(
        config.gemini.api_key.as_deref(),
        &config.gemini.model,
        config.gemini.timeout(),
    )
    .with_context(|| "Failed to configure the Gemini provider")?;
    let generator = SectionGenerator::new(Arc::new(provider));
    let today = SystemClock.today();

    let payload = if section == "podcast" {
        generator.generate_podcast(today).await
    } else {
        generator.generate_key(section, today).await
    }
    .with_context(|| format!("Generation failed for {section}"))?;

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
