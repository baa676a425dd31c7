//! `datalyst ask`: answer one question about the files in the data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use datalyst_agent::AgentLoop;
use datalyst_config::AppConfig;
use datalyst_core::event::EventBus;
use datalyst_core::{Error, Result};
use tracing::{debug, info};

pub async fn run(
    config: AppConfig,
    question: &str,
    input_file: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let files = prepare_data_dir(&config.tools.data_dir, input_file)?;
    info!(
        data_dir = %config.tools.data_dir.display(),
        files = files.len(),
        "Offering files to the agent"
    );

    let provider = datalyst_providers::build_from_config(&config)?;
    let tools = Arc::new(datalyst_tools::default_registry(&config.tools));
    let event_bus = Arc::new(EventBus::default());

    if verbose {
        let mut rx = event_bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                debug!(event = ?event, "Agent event");
            }
        });
    }

    let agent = AgentLoop::from_config(&config, provider, tools, event_bus);
    let outcome = agent.run(question, files).await?;

    println!("\nRESPONSE: {}", outcome.answer);
    Ok(())
}

/// Make sure the data directory exists, copy `input_file` into it when
/// given, and list every file it holds.
pub fn prepare_data_dir(data_dir: &Path, input_file: Option<&Path>) -> Result<Vec<String>> {
    std::fs::create_dir_all(data_dir)?;

    if let Some(source) = input_file {
        let name = source
            .file_name()
            .ok_or_else(|| Error::Internal(format!("'{}' is not a file path", source.display())))?;
        std::fs::copy(source, data_dir.join(name)).map_err(|e| {
            Error::Internal(format!(
                "Could not copy {} into {}: {e}",
                source.display(),
                data_dir.display()
            ))
        })?;
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    Ok(files
        .into_iter()
        .map(|path| path.display().to_string())
        .collect())
}
