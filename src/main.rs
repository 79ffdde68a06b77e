mod actions;
mod cache;
mod config;
mod interpreter;
mod responder;
mod session;
mod store;
mod types;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::interpreter::{CompletionBackend, GeminiClient, Interpreter};
use crate::responder::Responder;
use crate::session::ChatSession;
use crate::store::DocStore;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("doceai {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("doceai {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: doceai [--config <path>]\n");
                println!("Reads config.toml from the working directory by default.");
                println!("Environment: GEMINI_API_KEY, GLM_API_KEY, SHEETS_ACCESS_TOKEN.");
                println!("Type messages on stdin; \"sair\" ends the session.");
                return Ok(());
            }
            _ => {}
        }
    }

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = AppConfig::load(&config_path)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store = Arc::new(DocStore::open(Path::new(&config.store.path))?);
    let registry = Arc::new(actions::builtin_registry(store.clone(), &config));

    let backend = GeminiClient::from_config(&config.classifier)
        .map(|client| Arc::new(client) as Arc<dyn CompletionBackend>);
    let interpreter = Arc::new(Interpreter::new(
        registry.clone(),
        backend,
        Duration::from_secs(config.classifier.cache_ttl_secs),
    ));
    let responder = Responder::from_config(&config.responder);
    let mut session = ChatSession::new(interpreter, responder, store);

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{}\n\n", responder::greeting()).as_bytes())
        .await?;
    let mut menu = String::from("O que eu sei fazer:\n");
    for action in registry.list_by_category("trabalho") {
        menu.push_str(&format!("  - {}\n", action.description));
    }
    stdout.write_all(format!("{}\n", menu).as_bytes()).await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if matches!(utterance.to_lowercase().as_str(), "sair" | "exit" | "quit") {
            stdout.write_all("Até logo! 👋\n".as_bytes()).await?;
            break;
        }

        let reply = session.handle(utterance).await;
        stdout.write_all(format!("{}\n\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
