//! `casedraft budget`: Show the active budget, selection limits and quotas.

use casedraft_admission::{OperationClass, QuotaTable};
use casedraft_config::AppConfig;
use casedraft_drafting::{AssemblyLimits, Category, TokenBudget};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let budget = TokenBudget::from_config(&config.budget)
        .map_err(|e| format!("Invalid budget: {e}"))?;
    let limits = AssemblyLimits::from(&config.assembly);

    println!("CaseDraft Budget");
    println!("================");
    println!("  Context window:   {:>8}", budget.context_window());
    println!("  Total budget:     {:>8}", budget.total());
    println!("  Headroom:         {:>8}", budget.headroom());
    println!("  Prompt capacity:  {:>8}", budget.prompt_capacity());
    println!();
    for category in Category::PROMPT_ORDER
        .into_iter()
        .chain(std::iter::once(Category::ReservedOutput))
    {
        let cap = budget.cap(category);
        println!(
            "  {:<20} {:>8}  ({:>4.1}%)",
            category.as_str(),
            cap,
            cap as f64 * 100.0 / budget.total() as f64
        );
    }
    println!("  {:<20} {:>8}", "unallocated", budget.total().saturating_sub(budget.caps_total()));

    println!("\nSelection");
    println!("  Reference hits:   top {}", limits.max_reference_hits);
    println!("  Precedent hits:   top {}", limits.max_precedent_hits);
    println!("  Per source:       {} tokens", limits.source_item_tokens);
    println!("  Per reference:    {} tokens", limits.reference_item_tokens);
    println!("  Per precedent:    {} tokens/field", limits.precedent_field_tokens);

    println!("\nPipeline");
    println!(
        "  Mode:             {}",
        if config.pipeline.staged { "staged (3 calls)" } else { "direct (1 call)" }
    );
    println!("  Model:            {}", config.default_model);
    println!("  Marker policy:    {:?}", config.pipeline.marker_policy);

    println!("\nRate limits ({})", if config.rate_limits.enabled { "enabled" } else { "disabled" });
    let quotas = QuotaTable::from_config(&config.rate_limits);
    for class in OperationClass::ALL {
        let quota = quotas.get(class);
        println!(
            "  {:<12} {:>5} per {}s",
            class.as_str(),
            quota.limit,
            quota.window.as_secs()
        );
    }

    if !config.has_api_key() {
        println!("\n  ⚠️  No API key: set ANTHROPIC_API_KEY before drafting");
    }

    Ok(())
}
