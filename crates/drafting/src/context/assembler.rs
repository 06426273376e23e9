//! Context assembly: fits unbounded evidence into a fixed token budget.
//!
//! Builds one prompt body from four categories, in order:
//!
//! 1. **Instructions** (fixed preamble)
//! 2. **Source material** (every source document, summarized)
//! 3. **Reference material** (top-N reference hits by relevance)
//! 4. **Precedent material** (top-M precedent hits by relevance)
//!
//! Each item is capped on its own, each category is capped against the
//! budget, and the joined body gets one last whole-body truncation if it
//! still exceeds the prompt capacity. Assembly never fails: oversized input
//! is cut, not rejected.
//!
//! Assembly is deterministic. Identical inputs produce identical output.

use crate::context::budget::{Category, TokenBudget};
use crate::context::evidence::{Evidence, PrecedentHit, ReferenceHit};
use crate::context::summarizer;
use crate::context::token;
use casedraft_config::AssemblyConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Separator placed between items inside a category and between sections.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Default instructional preamble leading every assembled body.
pub const DEFAULT_PREAMBLE: &str = "\
You are preparing an engagement document for a professional services firm. \
The material below was gathered for a single client matter. Rely only on \
facts stated in it. Where the material is silent or contradictory, say so \
rather than guessing. Dates, amounts and reference numbers must be copied \
exactly as they appear.";

// ── Types ─────────────────────────────────────────────────────────────────

/// Selection limits and per-item caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyLimits {
    /// Reference hits kept after ranking.
    pub max_reference_hits: usize,
    /// Precedent hits kept after ranking.
    pub max_precedent_hits: usize,
    /// Cap on each source document's raw text.
    pub source_item_tokens: usize,
    /// Cap on each reference hit's content.
    pub reference_item_tokens: usize,
    /// Cap on each precedent free-text field.
    pub precedent_field_tokens: usize,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self::from(&AssemblyConfig::default())
    }
}

impl From<&AssemblyConfig> for AssemblyLimits {
    fn from(config: &AssemblyConfig) -> Self {
        Self {
            max_reference_hits: config.max_reference_hits,
            max_precedent_hits: config.max_precedent_hits,
            source_item_tokens: config.source_item_tokens,
            reference_item_tokens: config.reference_item_tokens,
            precedent_field_tokens: config.precedent_field_tokens,
        }
    }
}

/// One category's assembled text. Not mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub category: Category,
    /// Items rendered into this section.
    pub items_considered: usize,
    /// Items supplied before selection.
    pub items_available: usize,
    /// Final rendered text (empty when the category had nothing).
    pub text: String,
    /// Whether any item or the category as a whole was cut.
    pub truncated: bool,
    /// Estimate of `text`.
    pub estimated_tokens: usize,
    /// Estimate before the category cap was applied.
    pub raw_estimate: usize,
    /// Category cap from the budget.
    pub cap: usize,
}

/// The bounded prompt body handed to the first generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Sections in assembly order, including empty ones.
    pub sections: Vec<ContextSection>,
    /// Joined body text.
    pub body: String,
    /// Estimate of `body`. Never above `budget_total`.
    pub estimated_tokens: usize,
    /// Total capacity of the budget used.
    pub budget_total: usize,
    /// Ceiling for a whole stage prompt built around `body`: the total
    /// minus the output reservation.
    pub prompt_capacity: usize,
    /// Whether the whole-body truncation pass fired.
    pub backstop_applied: bool,
}

/// Text-free view of an [`AssembledContext`] for operators and API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub sections: Vec<SectionStats>,
    pub estimated_tokens: usize,
    pub budget_total: usize,
    /// Budget utilization percentage (0.0–100.0).
    pub utilization_pct: f32,
    pub backstop_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStats {
    pub category: Category,
    pub items_considered: usize,
    pub items_available: usize,
    pub estimated_tokens: usize,
    pub raw_estimate: usize,
    pub cap: usize,
    pub truncated: bool,
}

impl AssembledContext {
    pub fn section(&self, category: Category) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.category == category)
    }

    pub fn stats(&self) -> ContextStats {
        let utilization_pct = if self.budget_total == 0 {
            0.0
        } else {
            (self.estimated_tokens as f32 / self.budget_total as f32) * 100.0
        };
        ContextStats {
            sections: self
                .sections
                .iter()
                .map(|s| SectionStats {
                    category: s.category,
                    items_considered: s.items_considered,
                    items_available: s.items_available,
                    estimated_tokens: s.estimated_tokens,
                    raw_estimate: s.raw_estimate,
                    cap: s.cap,
                    truncated: s.truncated,
                })
                .collect(),
            estimated_tokens: self.estimated_tokens,
            budget_total: self.budget_total,
            utilization_pct,
            backstop_applied: self.backstop_applied,
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget: TokenBudget,
    limits: AssemblyLimits,
    preamble: String,
}

impl ContextAssembler {
    pub fn new(budget: TokenBudget, limits: AssemblyLimits) -> Self {
        Self {
            budget,
            limits,
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Replace the instructional preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn limits(&self) -> &AssemblyLimits {
        &self.limits
    }

    /// Assemble the bounded prompt body from `evidence`.
    ///
    /// # Algorithm
    ///
    /// 1. Render each category's selected items through the summarizer
    ///    (per-item caps apply here)
    /// 2. Join the items under a category header and cut the result to the
    ///    category cap
    /// 3. Join preamble and non-empty sections
    /// 4. If the body still exceeds `total − reserved_output`, cut the body
    pub fn assemble(&self, evidence: &Evidence) -> AssembledContext {
        let sections = vec![
            self.instructions_section(),
            self.source_section(evidence),
            self.reference_section(&evidence.references),
            self.precedent_section(&evidence.precedents),
        ];

        let joined = sections
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);

        let capacity = self.budget.prompt_capacity();
        let pre_backstop = token::estimate_tokens(&joined);
        let backstop_applied = pre_backstop > capacity;
        let body = if backstop_applied {
            warn!(
                estimated = pre_backstop,
                capacity, "Assembled context over capacity, truncating whole body"
            );
            token::truncate(&joined, capacity).into_owned()
        } else {
            joined
        };

        let estimated_tokens = token::estimate_tokens(&body);
        debug!(
            estimated_tokens,
            budget_total = self.budget.total(),
            backstop_applied,
            "Context assembled"
        );

        AssembledContext {
            sections,
            body,
            estimated_tokens,
            budget_total: self.budget.total(),
            prompt_capacity: capacity,
            backstop_applied,
        }
    }

    // ── Private category renderers ────────────────────────────────────────

    fn instructions_section(&self) -> ContextSection {
        let items = if self.preamble.trim().is_empty() {
            Vec::new()
        } else {
            vec![self.preamble.trim().to_string()]
        };
        let available = items.len();
        self.finish_section(Category::Instructions, None, items, available, false)
    }

    fn source_section(&self, evidence: &Evidence) -> ContextSection {
        let cap = self.limits.source_item_tokens;
        let item_cut = evidence
            .sources
            .iter()
            .any(|d| token::estimate_tokens(d.raw_text.trim()) > cap);
        let items = evidence
            .sources
            .iter()
            .map(|d| summarizer::summarize_source(d, cap))
            .collect();
        self.finish_section(
            Category::SourceMaterial,
            Some("## Source Material"),
            items,
            evidence.sources.len(),
            item_cut,
        )
    }

    fn reference_section(&self, hits: &[ReferenceHit]) -> ContextSection {
        let cap = self.limits.reference_item_tokens;
        let selected = top_by_relevance(hits, self.limits.max_reference_hits, |h| {
            h.relevance_score
        });
        let item_cut = selected
            .iter()
            .any(|h| token::estimate_tokens(h.content.trim()) > cap);
        let items = selected
            .iter()
            .map(|h| summarizer::summarize_reference(h, cap))
            .collect();
        self.finish_section(
            Category::ReferenceMaterial,
            Some("## Reference Material"),
            items,
            hits.len(),
            item_cut,
        )
    }

    fn precedent_section(&self, hits: &[PrecedentHit]) -> ContextSection {
        let cap = self.limits.precedent_field_tokens;
        let selected = top_by_relevance(hits, self.limits.max_precedent_hits, |h| {
            h.relevance_score
        });
        let item_cut = selected.iter().any(|h| {
            token::estimate_tokens(h.content.trim()) > cap
                || h.outcome
                    .as_deref()
                    .is_some_and(|o| token::estimate_tokens(o.trim()) > cap)
        });
        let items = selected
            .iter()
            .map(|h| summarizer::summarize_precedent(h, cap))
            .collect();
        self.finish_section(
            Category::PrecedentMaterial,
            Some("## Precedent Material"),
            items,
            hits.len(),
            item_cut,
        )
    }

    /// Join rendered items under `header` and cut the result to the
    /// category cap.
    fn finish_section(
        &self,
        category: Category,
        header: Option<&str>,
        items: Vec<String>,
        items_available: usize,
        item_cut: bool,
    ) -> ContextSection {
        let cap = self.budget.cap(category);
        let items_considered = items.len();

        if items.is_empty() {
            debug!(category = %category, cap, "Category empty");
            return ContextSection {
                category,
                items_considered: 0,
                items_available,
                text: String::new(),
                truncated: false,
                estimated_tokens: 0,
                raw_estimate: 0,
                cap,
            };
        }

        let joined = items
            .iter()
            .map(|i| i.trim_end())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);
        let raw = match header {
            Some(h) => format!("{h}\n\n{joined}"),
            None => joined,
        };

        let raw_estimate = token::estimate_tokens(&raw);
        let over = raw_estimate > cap;
        if over {
            warn!(
                category = %category,
                estimated = raw_estimate,
                cap,
                "Category over budget, truncating"
            );
        } else {
            debug!(category = %category, estimated = raw_estimate, cap, "Category within budget");
        }

        let text = token::truncate(&raw, cap).into_owned();
        ContextSection {
            category,
            items_considered,
            items_available,
            estimated_tokens: token::estimate_tokens(&text),
            text,
            truncated: over || item_cut,
            raw_estimate,
            cap,
        }
    }
}

/// Keep the `limit` most relevant items. Ties keep their input order; NaN
/// scores rank last.
fn top_by_relevance<T>(items: &[T], limit: usize, score: impl Fn(&T) -> f32) -> Vec<&T> {
    let key = |item: &T| {
        let s = score(item);
        if s.is_nan() { f32::NEG_INFINITY } else { s }
    };
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| key(b).total_cmp(&key(a)));
    ranked.truncate(limit);
    ranked
}
