//! `casedraft draft`: Generate a draft from a request/evidence file.
//!
//! The input is the same JSON the gateway's `POST /v1/drafts` accepts:
//! case reference, department, firm profile, optional `staged` override
//! and an `evidence` object.

use casedraft_config::AppConfig;
use casedraft_drafting::{DraftService, ProgressEvent, StageStatus};
use casedraft_gateway::api::{DraftBody, DraftResponse};
use std::path::PathBuf;
use tracing::info;

pub async fn run(input: PathBuf, direct: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!("    CASEDRAFT_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let raw = std::fs::read_to_string(&input)
        .map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let mut body: DraftBody = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid draft input {}: {e}", input.display()))?;
    if direct {
        body.request.staged = Some(false);
    }

    let provider = casedraft_providers::build_from_config(&config)?;
    let service = DraftService::from_config(provider, &config)?;

    info!(
        input = %input.display(),
        case = %body.request.case_reference,
        mode = ?service.mode_for(&body.request),
        "Drafting"
    );

    let context = service.preview(&body.evidence);
    let stats = context.stats();
    eprintln!(
        "Context: ~{} tokens of {} ({:.1}%){}",
        stats.estimated_tokens,
        stats.budget_total,
        stats.utilization_pct,
        if stats.backstop_applied { ", backstop applied" } else { "" }
    );

    let on_progress = |event: &ProgressEvent| {
        eprintln!("[{:>3}%] {}", event.percent, event.message);
    };

    match service
        .generate(&context, &body.request, Some(&on_progress))
        .await
    {
        Ok(outcome) => {
            if json {
                let response = DraftResponse::from(outcome);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", outcome.artifact());
            }
            Ok(())
        }
        Err(e) => {
            let finished: Vec<_> = e
                .run()
                .stages
                .iter()
                .filter(|s| s.status == StageStatus::Succeeded)
                .collect();
            if !finished.is_empty() {
                eprintln!("\nCompleted before the failure:");
                for stage in finished {
                    eprintln!(
                        "  {} ({} chars)",
                        stage.stage.label(),
                        stage.output.as_deref().map_or(0, str::len)
                    );
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(e.run())?);
            }
            Err(e.to_string().into())
        }
    }
}
