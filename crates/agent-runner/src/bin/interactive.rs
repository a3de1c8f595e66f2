//! Interactive agent session
//!
//! Reads user input line by line and runs each as one turn against a
//! persistent chat. `reset` starts a new logical conversation, `quit`
//! exits. Turn records land in `results/` as JSONL.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_anthropic::AnthropicProvider;
use agent_core::tool::{JsonMap, ParamKind, ParamSpec, ToolRegistry, ToolSpec};
use agent_runner::{AgentProfile, AgentRunner, JsonlLogger};

const CHAT_ID: &str = "interactive";

fn demo_tools() -> anyhow::Result<Arc<ToolRegistry>> {
    let mut tools = ToolRegistry::new();

    tools.register(ToolSpec::new(
        "current_time",
        "Returns the current date and time in UTC",
        vec![],
        |_args: JsonMap| async move {
            Ok(serde_json::Value::from(chrono::Utc::now().to_rfc3339()))
        },
    ))?;

    tools.register(ToolSpec::new(
        "add",
        "Adds two numbers and returns the sum",
        vec![
            ParamSpec::new("a", ParamKind::Number).with_description("First number"),
            ParamSpec::new("b", ParamKind::Number).with_description("Second number"),
        ],
        |args: JsonMap| async move {
            let a = args.get("a").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            Ok(serde_json::Value::from(a + b))
        },
    ))?;

    Ok(Arc::new(tools))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let provider = Arc::new(AnthropicProvider::from_env()?);
    let model = std::env::var("AGENT_MODEL")
        .unwrap_or_else(|_| "claude-3-5-haiku-20241022".into());

    let profile = AgentProfile::new("interactive_v1", model)
        .with_system_prompt(
            "You are a helpful assistant. Use the available tools when they \
             help answer the question; otherwise answer directly. Be concise.",
        )
        .with_tools(demo_tools()?);

    let run_stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let logger = Arc::new(JsonlLogger::new(
        "results",
        &format!("interactive_{run_stamp}"),
    )?);
    tracing::info!(path = %logger.path().display(), "logging turns");

    let mut runner = AgentRunner::new(profile, provider, logger);
    println!("Interactive session started (type 'quit' to exit, 'reset' for a new conversation).");

    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.lock().lines().next() else {
            break;
        };
        let input = line?.trim().to_string();

        match input.as_str() {
            "" => continue,
            "quit" => break,
            "reset" => {
                runner.reset_session();
                println!("--- Session reset ---");
                continue;
            }
            _ => {
                let reply = runner.run_turn(CHAT_ID, &input).await;
                println!("Agent: {reply}");
            }
        }
    }

    Ok(())
}
