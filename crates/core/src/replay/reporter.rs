//! Three-JSONL-file replay report.
//!
//! Grounded in the same `serde_json`-line style as
//! [`crate::miss_classifier::MissRowLogger`].

use alloy::primitives::Address;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateClassification {
    Detected,
    Missed,
    FalsePositive,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockRow {
    #[serde(rename = "type")]
    pub row_type: &'static str,
    pub block: u64,
    pub timestamp: u64,
    pub scan_latency_ms: u64,
    pub candidates: usize,
    pub new_detections: usize,
    pub on_chain_liquidations: usize,
    pub missed: usize,
    pub detected: usize,
    pub false_positives: usize,
}

impl BlockRow {
    pub fn new(block: u64, timestamp: u64) -> Self {
        Self {
            row_type: "block",
            block,
            timestamp,
            scan_latency_ms: 0,
            candidates: 0,
            new_detections: 0,
            on_chain_liquidations: 0,
            missed: 0,
            detected: 0,
            false_positives: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    #[serde(rename = "type")]
    pub row_type: &'static str,
    pub block: u64,
    pub user: Address,
    pub hf: f64,
    pub debt_usd: f64,
    pub collateral_usd: f64,
    pub detection_profit_usd: Option<f64>,
    pub event_profit_usd: Option<f64>,
    pub first_detection_block: Option<u64>,
    pub liquidation_block: Option<u64>,
    pub lead_blocks: Option<i64>,
    pub classification: CandidateClassification,
    pub simulation_status: Option<String>,
    pub revert_reason: Option<String>,
    pub race_viable: bool,
    pub hf_at_detection: Option<f64>,
    pub hf_at_liquidation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "type")]
    pub row_type: &'static str,
    pub ground_truth_count: usize,
    pub detected: usize,
    pub missed: usize,
    pub false_positives: usize,
    pub coverage_ratio: f64,
    pub median_lead_blocks: f64,
    pub avg_lead_blocks: f64,
    pub total_detection_profit_usd: f64,
    pub total_event_profit_usd: f64,
    pub duration_ms: u64,
    pub ground_truth_available: bool,
    pub partial: bool,
}

/// Accumulates rows over a replay run and flushes three JSONL files.
#[derive(Default)]
pub struct Reporter {
    blocks: Vec<BlockRow>,
    candidates: Vec<CandidateRow>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&mut self, row: BlockRow) {
        self.blocks.push(row);
    }

    pub fn push_candidate(&mut self, row: CandidateRow) {
        self.candidates.push(row);
    }

    pub fn build_summary(
        &self,
        ground_truth_count: usize,
        duration_ms: u64,
        ground_truth_available: bool,
        partial: bool,
    ) -> SummaryRow {
        let detected = self
            .candidates
            .iter()
            .filter(|c| c.classification == CandidateClassification::Detected)
            .count();
        let missed = self
            .candidates
            .iter()
            .filter(|c| c.classification == CandidateClassification::Missed)
            .count();
        let false_positives = self
            .candidates
            .iter()
            .filter(|c| c.classification == CandidateClassification::FalsePositive)
            .count();

        let mut leads: Vec<i64> = self
            .candidates
            .iter()
            .filter_map(|c| c.lead_blocks)
            .collect();
        leads.sort_unstable();
        let median_lead_blocks = if leads.is_empty() {
            0.0
        } else {
            leads[leads.len() / 2] as f64
        };
        let avg_lead_blocks = if leads.is_empty() {
            0.0
        } else {
            leads.iter().sum::<i64>() as f64 / leads.len() as f64
        };

        let total_detection_profit_usd = self
            .candidates
            .iter()
            .filter_map(|c| c.detection_profit_usd)
            .sum();
        let total_event_profit_usd = self
            .candidates
            .iter()
            .filter_map(|c| c.event_profit_usd)
            .sum();

        let coverage_ratio = if ground_truth_count == 0 {
            0.0
        } else {
            detected as f64 / ground_truth_count as f64
        };

        SummaryRow {
            row_type: "summary",
            ground_truth_count,
            detected,
            missed,
            false_positives,
            coverage_ratio,
            median_lead_blocks,
            avg_lead_blocks,
            total_detection_profit_usd,
            total_event_profit_usd,
            duration_ms,
            ground_truth_available,
            partial,
        }
    }

    /// Write `blocks.jsonl` (insertion order), `candidates.jsonl` (sorted
    /// by user address), `summary.jsonl` (single row) into `output_dir`.
    pub async fn flush(
        &self,
        output_dir: &Path,
        summary: SummaryRow,
    ) -> std::io::Result<()> {
        tokio::fs::create_dir_all(output_dir).await?;

        write_jsonl(&output_dir.join("blocks.jsonl"), &self.blocks).await?;

        let mut sorted_candidates = self.candidates.clone();
        sorted_candidates.sort_by_key(|c| c.user);
        write_jsonl(&output_dir.join("candidates.jsonl"), &sorted_candidates).await?;

        write_jsonl(&output_dir.join("summary.jsonl"), std::slice::from_ref(&summary)).await?;

        Ok(())
    }
}

async fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    for row in rows {
        let line = serde_json::to_string(row).unwrap_or_default();
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_coverage_matches_ground_truth() {
        let mut reporter = Reporter::new();
        for i in 0..7u8 {
            reporter.push_candidate(CandidateRow {
                row_type: "candidate",
                block: 1,
                user: Address::repeat_byte(i),
                hf: 0.9,
                debt_usd: 100.0,
                collateral_usd: 120.0,
                detection_profit_usd: Some(5.0),
                event_profit_usd: Some(4.0),
                first_detection_block: Some(1),
                liquidation_block: Some(3),
                lead_blocks: Some(2),
                classification: if i < 5 {
                    CandidateClassification::Detected
                } else {
                    CandidateClassification::Missed
                },
                simulation_status: None,
                revert_reason: None,
                race_viable: true,
                hf_at_detection: Some(0.99),
                hf_at_liquidation: Some(0.98),
            });
        }

        let summary = reporter.build_summary(7, 1000, true, false);
        assert_eq!(summary.detected, 5);
        assert_eq!(summary.missed, 2);
        assert!((summary.coverage_ratio - 5.0 / 7.0).abs() < 1e-9);
    }
}
