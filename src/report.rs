// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use colored::*;
use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{Result, Write};
use std::path::Path;

/// Per-target totals over the result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub waf_name: String,
    pub non_zero: u64,
    pub total: u64,
    pub blocks_403: u64,
    pub detected_blocks: u64,
}

/// Per-target, per-dataset-type totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSnapshot {
    pub waf_name: String,
    pub data_set_type: String,
    pub non_zero: u64,
    pub detected_blocks: u64,
}

/// Detection quality of one target. Rows with `status = 0` are excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionMetrics {
    pub waf_name: String,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
    pub true_positive_rate: f64,
    pub true_negative_rate: f64,
    pub balanced_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub targets: Vec<TargetSnapshot>,
    pub datasets: Vec<DatasetSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryReport {
    pub snapshot: Snapshot,
    pub metrics: Vec<DetectionMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

pub fn log_snapshot(snapshot: &Snapshot) {
    info!("=== DB Results Snapshot ===");
    for t in &snapshot.targets {
        info!(
            "WAF {}: non-zero={}/{}  403={}  detected_blocks={}",
            t.waf_name, t.non_zero, t.total, t.blocks_403, t.detected_blocks
        );
    }
    for d in &snapshot.datasets {
        info!(
            "    -> {} [{}]: non-zero={}  detected_blocks={}",
            d.waf_name, d.data_set_type, d.non_zero, d.detected_blocks
        );
    }
}

pub struct ReportGenerator;

impl ReportGenerator {
    pub fn render(report: &SummaryReport, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => Self::render_text(report),
            ReportFormat::Json => Self::render_json(report),
        }
    }

    pub fn render_text(report: &SummaryReport) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "{}", "Results".bold());
        if report.snapshot.targets.is_empty() {
            let _ = writeln!(out, "  no results recorded");
        }
        for t in &report.snapshot.targets {
            let _ = writeln!(
                out,
                "  {:<24} answered {:>8}/{:<8} 403 {:>8}  blocked {:>8}",
                t.waf_name.cyan(),
                t.non_zero,
                t.total,
                t.blocks_403,
                t.detected_blocks
            );
            for d in report
                .snapshot
                .datasets
                .iter()
                .filter(|d| d.waf_name == t.waf_name)
            {
                let _ = writeln!(
                    out,
                    "    {:<22} answered {:>8}           blocked {:>8}",
                    d.data_set_type, d.non_zero, d.detected_blocks
                );
            }
        }

        if !report.metrics.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "Detection quality".bold());
            let _ = writeln!(
                out,
                "  {:<4} {:<24} {:>9} {:>9} {:>9} {:>9} {:>9}",
                "#", "WAF", "FPR", "FNR", "TPR", "TNR", "BalAcc"
            );
            for (i, m) in report.metrics.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  {:<4} {:<24} {:>8.3}% {:>8.3}% {:>8.3}% {:>8.3}% {}",
                    i + 1,
                    m.waf_name,
                    m.false_positive_rate,
                    m.false_negative_rate,
                    m.true_positive_rate,
                    m.true_negative_rate,
                    colorize_accuracy(m.balanced_accuracy)
                );
            }
        }
        out
    }

    pub fn render_json(report: &SummaryReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn generate_report(report: &SummaryReport, output_path: &Path, format: ReportFormat) -> Result<()> {
        let mut file = File::create(output_path)?;
        writeln!(file, "{}", Self::render(report, format))?;
        Ok(())
    }
}

fn colorize_accuracy(value: f64) -> ColoredString {
    let text = format!("{:>8.3}%", value);
    if value >= 90.0 {
        text.green()
    } else if value >= 50.0 {
        text.yellow()
    } else {
        text.red()
    }
}
