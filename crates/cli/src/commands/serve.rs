//! `datalyst serve`: start the HTTP gateway.

use datalyst_config::AppConfig;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("datalyst gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {} ({})", config.provider.name, config.provider.base_url);
    println!("   Auth:      {}", if config.gateway.bearer_token.is_some() { "bearer token" } else { "none" });

    datalyst_gateway::start(config).await?;

    Ok(())
}
