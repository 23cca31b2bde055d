//! `dealroom chat`: Single-message or interactive chat from the terminal.
//!
//! Runs as the development principal, so conversations started here show up
//! in a development-mode gateway and vice versa.

use std::io::Write;

use dealroom_assistant::{AssistantService, ChatRequest, StreamEvent};
use dealroom_config::AppConfig;
use dealroom_core::identity::Principal;
use dealroom_gateway::{DEV_ORGANIZATION_ID, DEV_USER_ID};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    message: Option<String>,
    conversation: Option<String>,
    deal: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for the API key before building anything
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!("    DEALROOM_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let assistant = dealroom_gateway::build_assistant(&config)
        .await
        .map_err(|e| format!("Failed to start assistant: {e}"))?;
    let principal = Principal::new(DEV_USER_ID, DEV_ORGANIZATION_ID);

    if let Some(msg) = message {
        let id = send(&assistant, &principal, msg, conversation, deal).await?;
        eprintln!("  conversation: {id}");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Dealroom Assistant — Interactive Mode");
    println!();
    println!("  Model:     {}", config.provider.model);
    println!(
        "  Tools:     {}",
        assistant
            .tool_definitions()
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(deal_id) = &deal {
        println!("  Deal:      {deal_id}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation = conversation;

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            prompt()?;
            continue;
        }

        print!("  Assistant > ");
        std::io::stdout().flush()?;
        match send(
            &assistant,
            &principal,
            line.to_string(),
            conversation.clone(),
            deal.clone(),
        )
        .await
        {
            Ok(id) => conversation = Some(id),
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
        prompt()?;
    }

    println!();
    if let Some(id) = conversation {
        println!("  Resume with: dealroom chat --conversation {id}");
    }
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Run one turn, printing text as it streams. Returns the conversation id.
async fn send(
    assistant: &AssistantService,
    principal: &Principal,
    message: String,
    conversation_id: Option<String>,
    deal_id: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut rx = assistant
        .start_turn(
            principal.clone(),
            ChatRequest {
                message,
                conversation_id,
                deal_id,
            },
        )
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Text { content } => {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            StreamEvent::Done { conversation_id } => {
                writeln!(stdout)?;
                return Ok(conversation_id);
            }
            StreamEvent::Error { content } => {
                writeln!(stdout)?;
                return Err(content.into());
            }
        }
    }
    Err("The response stream ended unexpectedly".into())
}
