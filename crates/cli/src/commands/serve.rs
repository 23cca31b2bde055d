//! `dealroom serve`: Start the HTTP API server.

use dealroom_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Dealroom Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!(
        "   Auth:      {}",
        if config.gateway.api_keys.is_empty() {
            "development (identity from headers)".to_string()
        } else {
            format!("{} API key(s)", config.gateway.api_keys.len())
        }
    );

    dealroom_gateway::start(config)
        .await
        .map_err(|e| format!("Gateway failed: {e}"))?;

    Ok(())
}
