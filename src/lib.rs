pub mod agent;
pub mod cli;
pub mod config;
pub mod export;
pub mod files;
pub mod history;
pub mod llm;
pub mod models;
pub mod presentation;
pub mod server;

use cli::Args;
use log::info;
use server::{ AppState, Server };
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Model Credential: {}", if args.api_key().is_some() { "set" } else { "missing" });
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Upload Dir: {} (max {} bytes)", args.upload_dir, args.max_upload_bytes);
    info!("PDF Converter: {} (timeout {}s)", args.pdf_converter, args.pdf_timeout_secs);
    info!(
        "History: capacity={} ttl={}s",
        args.history_max_conversations,
        args.history_ttl_secs
    );
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let state = AppState::from_args(&args)?;
    let server = Server::new(state, args);
    server.run().await?;

    Ok(())
}
