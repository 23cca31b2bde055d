//! `dealroom tools`: List the tools the assistant can call.

use std::sync::Arc;

use dealroom_tools::InMemoryDealDirectory;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = dealroom_tools::default_registry(Arc::new(InMemoryDealDirectory::new()));

    println!("Assistant Tools");
    println!("===============");
    println!();
    for definition in registry.definitions() {
        println!("  {}", definition.name);
        println!("      {}", definition.description);
        let params: Vec<&str> = definition.parameters["properties"]
            .as_object()
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if !params.is_empty() {
            println!("      params: {}", params.join(", "));
        }
        println!();
    }
    println!("  {} tool(s). Every call is scoped to the caller's organization.", registry.len());

    Ok(())
}
