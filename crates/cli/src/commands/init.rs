//! `datalyst init`: first-time setup.

use datalyst_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("datalyst — First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    let data_dir = &config.tools.data_dir;
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)?;
        println!("Created data directory: {}", data_dir.display());
    }

    println!("\nNext steps:");
    println!("   1. Start a local OpenAI-compatible server (LM Studio, Ollama) or set DATALYST_BASE_URL");
    println!("   2. Put CSV, JSON, TXT or PDF files in {}", data_dir.display());
    println!("   3. Run: datalyst ask \"What is the average salary by position?\"\n");

    Ok(())
}
