//! `dealroom doctor`: Diagnose configuration and storage.

use dealroom_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Dealroom Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file — defaults in use (run `dealroom init`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Configuration valid");
            config
        }
        Err(e) => {
            println!("  [fail] Configuration invalid: {e}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  [ok]   API key configured");
        match dealroom_providers::from_config(&config) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  [ok]   Provider reachable ({})", provider.name()),
                Ok(false) => {
                    println!("  [fail] Provider rejected the health check (check the API key)");
                    issues += 1;
                }
                Err(e) => {
                    println!("  [fail] Provider unreachable: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  [fail] Provider could not be built: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  [fail] No API key — set ANTHROPIC_API_KEY or api_key in config.toml");
        issues += 1;
    }

    match dealroom_store::open(&config.store).await {
        Ok(store) => println!("  [ok]   Conversation store opened ({})", store.name()),
        Err(e) => {
            println!("  [fail] Conversation store: {e}");
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
