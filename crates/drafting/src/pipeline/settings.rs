//! Generation settings shared by the staged and direct pipelines.

use crate::pipeline::stage::StageName;
use casedraft_config::{MarkerPolicy, PipelineConfig};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub model: String,
    pub max_output_tokens: u32,
    pub fact_extraction_temperature: f32,
    pub structuring_temperature: f32,
    pub tone_finishing_temperature: f32,
    /// Deadline per stage call. `None` leaves only the HTTP timeout.
    pub stage_timeout: Option<Duration>,
    pub marker_policy: MarkerPolicy,
}

impl PipelineSettings {
    /// Settings with configuration defaults for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_config(model, &PipelineConfig::default())
    }

    pub fn from_config(model: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            model: model.into(),
            max_output_tokens: config.max_output_tokens,
            fact_extraction_temperature: config.fact_extraction_temperature,
            structuring_temperature: config.structuring_temperature,
            tone_finishing_temperature: config.tone_finishing_temperature,
            stage_timeout: (config.stage_timeout_secs > 0)
                .then(|| Duration::from_secs(config.stage_timeout_secs)),
            marker_policy: config.marker_policy,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    pub fn temperature(&self, stage: StageName) -> f32 {
        match stage {
            StageName::FactExtraction => self.fact_extraction_temperature,
            StageName::Structuring | StageName::SinglePass => self.structuring_temperature,
            StageName::ToneFinishing => self.tone_finishing_temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_means_none() {
        let config = PipelineConfig {
            stage_timeout_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(PipelineSettings::from_config("m", &config).stage_timeout.is_none());
        assert_eq!(
            PipelineSettings::new("m").stage_timeout,
            Some(Duration::from_secs(180))
        );
    }

    #[test]
    fn per_stage_temperatures() {
        let s = PipelineSettings::new("m");
        assert_eq!(s.temperature(StageName::FactExtraction), 0.2);
        assert_eq!(s.temperature(StageName::Structuring), 0.3);
        assert_eq!(s.temperature(StageName::ToneFinishing), 0.4);
    }
}
