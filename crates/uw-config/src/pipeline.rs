//! Pipeline behavior settings.

use serde::{Deserialize, Serialize};

const fn default_max_compliance_cycles() -> u32 {
    3
}

const fn default_require_warn_resolution() -> bool {
    true
}

const fn default_review_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Upper bound on generate/review cycles per document.
    #[serde(default = "default_max_compliance_cycles")]
    pub max_compliance_cycles: u32,

    /// When true, pending WARN issues block verification like FAIL issues do.
    /// When false, WARN-only deals proceed with their WARN issues still pending.
    #[serde(default = "default_require_warn_resolution")]
    pub require_warn_resolution: bool,

    /// Token cap for a compliance review response.
    #[serde(default = "default_review_max_tokens")]
    pub review_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_compliance_cycles: default_max_compliance_cycles(),
            require_warn_resolution: default_require_warn_resolution(),
            review_max_tokens: default_review_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_compliance_cycles, 3);
        assert!(config.require_warn_resolution);
    }
}
