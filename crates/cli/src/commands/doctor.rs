//! `datalyst doctor`: diagnose configuration and backend health.

use std::path::Path;

use datalyst_config::AppConfig;
use datalyst_core::provider::Provider;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("datalyst doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found. Fix the config before running other checks.");
            return Ok(());
        }
    };

    let data_dir = &config.tools.data_dir;
    match std::fs::read_dir(data_dir) {
        Ok(entries) => {
            let count = entries.filter_map(|e| e.ok()).filter(|e| e.path().is_file()).count();
            println!("  [ok]   Data directory {} ({count} files)", data_dir.display());
        }
        Err(_) => {
            println!("  [warn] No data directory at {} — run `datalyst init`", data_dir.display());
            issues += 1;
        }
    }

    if cfg!(feature = "pdf") {
        println!("  [ok]   PDF extraction enabled");
    } else {
        println!("  [info] PDF extraction disabled (build with --features pdf)");
    }

    match datalyst_providers::build_from_config(&config) {
        Ok(provider) => {
            issues += check_backend(provider.as_ref(), &config).await;
        }
        Err(e) => {
            println!("  [fail] Backend not configured: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

async fn check_backend(provider: &dyn Provider, config: &AppConfig) -> u32 {
    match provider.health_check().await {
        Ok(true) => println!("  [ok]   Backend reachable at {}", config.provider.base_url),
        Ok(false) | Err(_) => {
            println!("  [fail] Backend unreachable at {}", config.provider.base_url);
            return 1;
        }
    }

    match provider.list_models().await {
        Ok(models) if models.iter().any(|m| m == &config.provider.model) => {
            println!("  [ok]   Model {} available", config.provider.model);
            0
        }
        Ok(models) => {
            println!(
                "  [warn] Model {} not listed by the backend ({} models available)",
                config.provider.model,
                models.len()
            );
            1
        }
        Err(e) => {
            println!("  [warn] Could not list models: {e}");
            1
        }
    }
}
