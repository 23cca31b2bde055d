//! `dealroom status`: Show the effective configuration.

use dealroom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Dealroom Status");
    println!("===============");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Model:          {}", config.provider.model);
    println!("  Temperature:    {}", config.provider.temperature);
    println!("  Max rounds:     {}", config.assistant.max_rounds);
    println!("  History window: {}", config.assistant.history_window);
    println!("  Turn timeout:   {}s", config.assistant.turn_timeout_secs);
    println!("  Store:          {}", config.store.backend);
    if config.store.backend == "sqlite" {
        println!("  Database:       {}", config.store.database_path());
    }
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);
    println!("  API keys:       {}", config.gateway.api_keys.len());

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file — run `dealroom init` first");
    }

    Ok(())
}
