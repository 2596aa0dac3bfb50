//! CLI command: `flowlens status`
//!
//! Prints the resolved configuration with the token masked.

use crate::settings::AppConfig;
use anyhow::Result;

/// Run the status subcommand.
pub fn run(config: &AppConfig, json: bool) -> Result<()> {
    let config = masked(config);
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let transport = config.transport();
    println!();
    println!("  flowlens v{}", env!("CARGO_PKG_VERSION"));
    println!("  {}", "-".repeat(48));
    println!(
        "  {:<20} {}",
        "Project",
        config.project().as_deref().unwrap_or("(none)")
    );
    println!("  {:<20} {}", "WebSocket", config.server.ws_url);
    println!("  {:<20} {}", "API", config.server.api_url);
    println!(
        "  {:<20} {}",
        "Token",
        config.server.token.as_deref().unwrap_or("(none)")
    );
    println!(
        "  {:<20} {}s",
        "Heartbeat",
        transport.effective_heartbeat().as_secs_f64()
    );
    let attempts = match config.reconnect.max_attempts {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    println!(
        "  {:<20} {}ms .. {}ms x{} ({})",
        "Reconnect",
        config.reconnect.initial_delay_ms,
        config.reconnect.max_delay_ms,
        config.reconnect.multiplier,
        attempts
    );
    println!(
        "  {:<20} bus {}  mailbox {}  history {}",
        "Session", config.core.bus_capacity, config.core.mailbox_capacity, config.core.history_cap
    );
    println!();
    Ok(())
}

fn masked(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    config.server.token = config
        .server
        .token
        .filter(|t| !t.is_empty())
        .map(|t| mask(&t));
    config
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
