//! Conversion results and run statistics.

use crate::error::ConversionWarning;
use crate::schema::ExamDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How deep the repair engine had to go before the model output parsed.
///
/// Reported per document so a batch run can show how well-formed the model's
/// JSON was overall. Ordering matters: each variant implies the previous
/// stage's transforms were applied and insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairStage {
    /// Parsed after basic cleaning and block extraction only.
    Direct,
    /// Needed comma and key repairs.
    Structural,
    /// Needed the orphan-number and dangling-quote fallbacks.
    NumericFallback,
}

impl fmt::Display for RepairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepairStage::Direct => "direct",
            RepairStage::Structural => "structural",
            RepairStage::NumericFallback => "numeric-fallback",
        };
        f.write_str(s)
    }
}

/// Result of converting one source document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub document: ExamDocument,
    /// Fidelity losses encountered during normalization, in occurrence order.
    pub warnings: Vec<ConversionWarning>,
    pub stats: ConversionStats,
}

/// Per-document conversion statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Prompt tokens reported by the provider, when available.
    pub input_tokens: Option<u32>,
    /// Completion tokens reported by the provider, when available.
    pub output_tokens: Option<u32>,
    /// Wall-clock duration of the whole conversion.
    pub duration_ms: u64,
    /// Model call attempts consumed (1 = first try succeeded).
    pub attempts: u32,
    pub repair_stage: Option<RepairStage>,
}

/// Outcome tally for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    pub failed: usize,
    /// Sources skipped because their output already existed (resume mode).
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.converted + self.failed + self.skipped
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} converted, {} failed, {} skipped",
            self.converted, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_stage_display() {
        assert_eq!(RepairStage::Direct.to_string(), "direct");
        assert_eq!(RepairStage::NumericFallback.to_string(), "numeric-fallback");
    }

    #[test]
    fn batch_summary_total() {
        let s = BatchSummary {
            converted: 10,
            failed: 2,
            skipped: 3,
        };
        assert_eq!(s.total(), 15);
    }
}
