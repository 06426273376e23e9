//! Draft service: budget, assembly and pipeline selection behind one call.

use crate::context::{
    AssembledContext, AssemblyLimits, BudgetError, ContextAssembler, ContextStats, Evidence,
    TokenBudget,
};
use crate::pipeline::{
    DirectPipeline, DraftRequest, PipelineError, PipelineMode, PipelineRun, PipelineSettings,
    ProgressFn, StagedPipeline,
};
use casedraft_config::AppConfig;
use casedraft_core::provider::Provider;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A finished draft plus the context statistics it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub run: PipelineRun,
    pub context: ContextStats,
}

impl DraftOutcome {
    pub fn artifact(&self) -> &str {
        self.run.artifact.as_deref().unwrap_or_default()
    }
}

pub struct DraftService {
    assembler: ContextAssembler,
    staged: StagedPipeline,
    direct: DirectPipeline,
    staged_by_default: bool,
}

impl DraftService {
    pub fn new(
        provider: Arc<dyn Provider>,
        budget: TokenBudget,
        limits: AssemblyLimits,
        settings: PipelineSettings,
        staged_by_default: bool,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(budget, limits),
            staged: StagedPipeline::new(provider.clone(), settings.clone()),
            direct: DirectPipeline::new(provider, settings),
            staged_by_default,
        }
    }

    /// Build from configuration. Fails only when the configured budget is
    /// inconsistent.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Result<Self, BudgetError> {
        let budget = TokenBudget::from_config(&config.budget)?;
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        let settings = PipelineSettings::from_config(model, &config.pipeline);

        info!(
            budget_total = budget.total(),
            staged = config.pipeline.staged,
            model = %settings.model,
            "Draft service ready"
        );

        Ok(Self::new(
            provider,
            budget,
            AssemblyLimits::from(&config.assembly),
            settings,
            config.pipeline.staged,
        ))
    }

    pub fn budget(&self) -> &TokenBudget {
        self.assembler.budget()
    }

    pub fn limits(&self) -> &AssemblyLimits {
        self.assembler.limits()
    }

    pub fn staged_by_default(&self) -> bool {
        self.staged_by_default
    }

    /// Assemble context without generating anything.
    pub fn preview(&self, evidence: &Evidence) -> AssembledContext {
        self.assembler.assemble(evidence)
    }

    /// Pipeline chosen for `request`: its override, else configuration.
    pub fn mode_for(&self, request: &DraftRequest) -> PipelineMode {
        if request.staged.unwrap_or(self.staged_by_default) {
            PipelineMode::Staged
        } else {
            PipelineMode::Direct
        }
    }

    /// Assemble context from `evidence` and run the selected pipeline.
    pub async fn draft(
        &self,
        request: &DraftRequest,
        evidence: &Evidence,
        progress: Option<&ProgressFn>,
    ) -> Result<DraftOutcome, PipelineError> {
        let context = self.assembler.assemble(evidence);
        self.generate(&context, request, progress).await
    }

    /// Run the selected pipeline over an already assembled `context`, e.g.
    /// one returned by [`DraftService::preview`].
    pub async fn generate(
        &self,
        context: &AssembledContext,
        request: &DraftRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<DraftOutcome, PipelineError> {
        let run = match self.mode_for(request) {
            PipelineMode::Staged => self.staged.run(context, request, progress).await?,
            PipelineMode::Direct => self.direct.run(context, request, progress).await?,
        };
        Ok(DraftOutcome {
            run,
            context: context.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SourceDocument;
    use crate::context::token::estimate_tokens;
    use crate::pipeline::test_helpers::{ScriptedProvider, request};
    use crate::pipeline::StageName;

    fn evidence() -> Evidence {
        Evidence {
            sources: vec![SourceDocument::new("Notice CP2000", "Proposed adjustment of $4,210.")],
            ..Evidence::default()
        }
    }

    fn service(provider: Arc<ScriptedProvider>, staged: bool) -> DraftService {
        DraftService::new(
            provider,
            TokenBudget::default(),
            AssemblyLimits::default(),
            PipelineSettings::new("m"),
            staged,
        )
    }

    #[tokio::test]
    async fn staged_by_default_uses_three_calls() {
        let provider = Arc::new(ScriptedProvider::texts(&["facts", "**Fees**", "**Fees** final"]));
        let outcome = service(provider.clone(), true)
            .draft(&request(), &evidence(), None)
            .await
            .unwrap();
        assert_eq!(outcome.artifact(), "**Fees** final");
        assert_eq!(provider.call_count(), 3);
        assert!(provider.requests()[0].messages[1].content.contains("$4,210"));
        assert_eq!(outcome.context.sections.len(), 4);
    }

    #[tokio::test]
    async fn request_override_selects_direct() {
        let provider = Arc::new(ScriptedProvider::texts(&["one shot"]));
        let mut req = request();
        req.staged = Some(false);
        let outcome = service(provider.clone(), true)
            .draft(&req, &evidence(), None)
            .await
            .unwrap();
        assert_eq!(outcome.run.mode, PipelineMode::Direct);
        assert_eq!(outcome.run.stages[0].stage, StageName::SinglePass);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn configured_default_applies_without_override() {
        let svc = service(Arc::new(ScriptedProvider::texts(&[])), false);
        assert_eq!(svc.mode_for(&request()), PipelineMode::Direct);
        let mut req = request();
        req.staged = Some(true);
        assert_eq!(svc.mode_for(&req), PipelineMode::Staged);
    }

    #[test]
    fn from_config_rejects_inconsistent_budget() {
        let mut config = AppConfig::default();
        config.budget.source_material = 200_000;
        let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::texts(&[]));
        assert!(matches!(
            DraftService::from_config(provider, &config),
            Err(BudgetError::CapsExceedTotal { .. })
        ));
    }

    #[tokio::test]
    async fn generate_reuses_previewed_context() {
        let provider = Arc::new(ScriptedProvider::texts(&["single"]));
        let svc = service(provider.clone(), false);
        let ctx = svc.preview(&evidence());
        let outcome = svc.generate(&ctx, &request(), None).await.unwrap();
        assert_eq!(outcome.context, ctx.stats());
        assert_eq!(provider.call_count(), 1);
        assert!(provider.requests()[0].messages[1].content.ends_with(&ctx.body));
    }

    #[test]
    fn preview_assembles_without_calls() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let ctx = service(provider.clone(), true).preview(&evidence());
        assert!(ctx.body.contains("Notice CP2000"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_case_reference_never_exceeds_prompt_capacity() {
        let provider = Arc::new(ScriptedProvider::texts(&["facts", "**Fees**", "**Fees**", "one"]));
        let svc = service(provider.clone(), true);
        let mut req = request();
        req.case_reference = "X".repeat(1_000_000);

        svc.draft(&req, &Evidence::default(), None).await.unwrap();
        req.staged = Some(false);
        svc.draft(&req, &Evidence::default(), None).await.unwrap();

        let capacity = svc.budget().prompt_capacity();
        let requests = provider.requests();
        assert_eq!(requests.len(), 4);
        for sent in requests {
            let used: usize = sent
                .messages
                .iter()
                .map(|m| estimate_tokens(&m.content))
                .sum();
            assert!(used <= capacity, "used={used} capacity={capacity}");
            assert!(used < svc.budget().context_window());
        }
    }
}
