//! `casedraft gateway`: Start the HTTP API server.

use casedraft_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("CaseDraft Gateway");
    println!("   Listening:    {}:{}", config.gateway.host, config.gateway.port);
    println!("   API tokens:   {}", config.gateway.api_tokens.len());
    println!(
        "   Rate limits:  {}",
        if config.rate_limits.enabled { "enabled" } else { "disabled" }
    );

    casedraft_gateway::start(config).await?;

    Ok(())
}
