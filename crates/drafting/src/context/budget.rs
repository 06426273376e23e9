//! Budget allocation: splits a fixed token capacity across categories.

use casedraft_config::BudgetConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named slice of the token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Instructions,
    SourceMaterial,
    ReferenceMaterial,
    PrecedentMaterial,
    ReservedOutput,
}

impl Category {
    /// Prompt categories in assembly order.
    pub const PROMPT_ORDER: [Category; 4] = [
        Category::Instructions,
        Category::SourceMaterial,
        Category::ReferenceMaterial,
        Category::PrecedentMaterial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Instructions => "instructions",
            Category::SourceMaterial => "source_material",
            Category::ReferenceMaterial => "reference_material",
            Category::PrecedentMaterial => "precedent_material",
            Category::ReservedOutput => "reserved_output",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building a budget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("category caps sum to {caps} tokens, above the total of {total}")]
    CapsExceedTotal { caps: usize, total: usize },

    #[error("total budget of {total} tokens exceeds the {window}-token context window")]
    TotalExceedsWindow { total: usize, window: usize },

    #[error("budget ratios must be non-negative and sum to at most 1.0 (got {0})")]
    InvalidRatios(f64),
}

/// Fixed total capacity plus per-category caps, in estimated tokens.
///
/// Caps always sum to at most `total`, and `total` never exceeds
/// `context_window`. Construct through [`TokenBudget::new`],
/// [`TokenBudget::from_config`] or [`TokenBudget::from_ratios`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    total: usize,
    context_window: usize,
    instructions: usize,
    source_material: usize,
    reference_material: usize,
    precedent_material: usize,
    reserved_output: usize,
}

/// Share of the total given to each category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetRatios {
    pub source_material: f64,
    pub reference_material: f64,
    pub precedent_material: f64,
    pub instructions: f64,
    pub reserved_output: f64,
}

impl Default for BudgetRatios {
    /// 40% source, ~27% reference, ~13% precedent, ~13% instructions,
    /// ~7% reserved for output.
    fn default() -> Self {
        Self {
            source_material: 6.0 / 15.0,
            reference_material: 4.0 / 15.0,
            precedent_material: 2.0 / 15.0,
            instructions: 2.0 / 15.0,
            reserved_output: 1.0 / 15.0,
        }
    }
}

impl BudgetRatios {
    fn sum(&self) -> f64 {
        self.source_material
            + self.reference_material
            + self.precedent_material
            + self.instructions
            + self.reserved_output
    }

    fn is_valid(&self) -> bool {
        let parts = [
            self.source_material,
            self.reference_material,
            self.precedent_material,
            self.instructions,
            self.reserved_output,
        ];
        parts.iter().all(|p| p.is_finite() && *p >= 0.0) && self.sum() <= 1.0 + 1e-9
    }
}

impl TokenBudget {
    /// Build a budget from explicit caps.
    pub fn new(
        total: usize,
        context_window: usize,
        caps: [(Category, usize); 5],
    ) -> Result<Self, BudgetError> {
        let mut budget = Self {
            total,
            context_window,
            instructions: 0,
            source_material: 0,
            reference_material: 0,
            precedent_material: 0,
            reserved_output: 0,
        };
        for (category, cap) in caps {
            *budget.slot(category) = cap;
        }
        budget.check()?;
        Ok(budget)
    }

    /// Build a budget from the `[budget]` configuration section.
    pub fn from_config(config: &BudgetConfig) -> Result<Self, BudgetError> {
        Self::new(
            config.total_tokens,
            config.context_window,
            [
                (Category::Instructions, config.instructions),
                (Category::SourceMaterial, config.source_material),
                (Category::ReferenceMaterial, config.reference_material),
                (Category::PrecedentMaterial, config.precedent_material),
                (Category::ReservedOutput, config.reserved_output),
            ],
        )
    }

    /// Derive caps as floor(total × ratio) for each category.
    pub fn from_ratios(
        total: usize,
        context_window: usize,
        ratios: BudgetRatios,
    ) -> Result<Self, BudgetError> {
        if !ratios.is_valid() {
            return Err(BudgetError::InvalidRatios(ratios.sum()));
        }
        let share = |r: f64| (total as f64 * r).floor() as usize;
        let budget = Self::new(
            total,
            context_window,
            [
                (Category::Instructions, share(ratios.instructions)),
                (Category::SourceMaterial, share(ratios.source_material)),
                (Category::ReferenceMaterial, share(ratios.reference_material)),
                (Category::PrecedentMaterial, share(ratios.precedent_material)),
                (Category::ReservedOutput, share(ratios.reserved_output)),
            ],
        )?;
        Ok(budget)
    }

    fn check(&self) -> Result<(), BudgetError> {
        if self.total > self.context_window {
            return Err(BudgetError::TotalExceedsWindow {
                total: self.total,
                window: self.context_window,
            });
        }
        match self.checked_caps_total() {
            Some(caps) if caps <= self.total => Ok(()),
            _ => Err(BudgetError::CapsExceedTotal {
                caps: self.caps_total(),
                total: self.total,
            }),
        }
    }

    fn caps(&self) -> [usize; 5] {
        [
            self.instructions,
            self.source_material,
            self.reference_material,
            self.precedent_material,
            self.reserved_output,
        ]
    }

    fn checked_caps_total(&self) -> Option<usize> {
        self.caps()
            .into_iter()
            .try_fold(0usize, |sum, cap| sum.checked_add(cap))
    }

    fn slot(&mut self, category: Category) -> &mut usize {
        match category {
            Category::Instructions => &mut self.instructions,
            Category::SourceMaterial => &mut self.source_material,
            Category::ReferenceMaterial => &mut self.reference_material,
            Category::PrecedentMaterial => &mut self.precedent_material,
            Category::ReservedOutput => &mut self.reserved_output,
        }
    }

    /// Cap for one category.
    pub fn cap(&self, category: Category) -> usize {
        match category {
            Category::Instructions => self.instructions,
            Category::SourceMaterial => self.source_material,
            Category::ReferenceMaterial => self.reference_material,
            Category::PrecedentMaterial => self.precedent_material,
            Category::ReservedOutput => self.reserved_output,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Tokens left between the total and the backend's hard limit.
    pub fn headroom(&self) -> usize {
        self.context_window.saturating_sub(self.total)
    }

    /// Sum of every category cap, saturating at `usize::MAX`.
    pub fn caps_total(&self) -> usize {
        self.caps()
            .into_iter()
            .fold(0usize, |sum, cap| sum.saturating_add(cap))
    }

    /// Ceiling for the assembled prompt body: the total minus the output
    /// reservation.
    pub fn prompt_capacity(&self) -> usize {
        self.total.saturating_sub(self.reserved_output)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        let config = BudgetConfig::default();
        Self {
            total: config.total_tokens,
            context_window: config.context_window,
            instructions: config.instructions,
            source_material: config.source_material,
            reference_material: config.reference_material,
            precedent_material: config.precedent_material,
            reserved_output: config.reserved_output,
        }
    }
}
