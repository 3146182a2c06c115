//! Reporting of grid results and the final model's metrics.
//!
//! The reporter is a sink: it reads a finished [`SearchOutcome`] and the final
//! [`TuningResult`] and never feeds anything back into the sweep.

use crate::error::TuneError;
use crate::grid::ParamValue;
use crate::search::{CellOutcome, SearchOutcome};
use crate::training::run::TuningResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// One row of the grid log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    pub epochs: usize,
    pub batch_size: usize,
    /// Extra knob values in declared grid order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, ParamValue)>,
    pub test_loss: Option<f64>,
    pub test_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CellOutcome> for GridRecord {
    fn from(outcome: &CellOutcome) -> Self {
        let config = outcome.config();
        let (test_loss, test_accuracy, error) = match outcome {
            CellOutcome::Completed(r) => (Some(r.test_loss), Some(r.test_accuracy), None),
            CellOutcome::Failed(f) => (None, None, Some(format!("{}: {}", f.stage, f.reason))),
        };
        Self {
            epochs: config.epochs(),
            batch_size: config.batch_size(),
            extra: config.extra().to_vec(),
            test_loss,
            test_accuracy,
            error,
        }
    }
}

/// Summary of the retrained final model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub best_epochs: usize,
    pub best_batch_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub best_extra: Vec<(String, ParamValue)>,
    pub final_test_loss: f64,
    pub final_test_accuracy: f64,
}

impl From<&TuningResult> for FinalSummary {
    fn from(result: &TuningResult) -> Self {
        Self {
            best_epochs: result.config.epochs(),
            best_batch_size: result.config.batch_size(),
            best_extra: result.config.extra().to_vec(),
            final_test_loss: result.test_loss,
            final_test_accuracy: result.test_accuracy,
        }
    }
}

/// Persisted record of one complete sweep and its final retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub records: Vec<GridRecord>,
    /// Index into `records` of the selected configuration.
    pub best_index: usize,
    pub final_summary: FinalSummary,
}

impl SweepReport {
    pub fn new(outcome: &SearchOutcome, final_result: &TuningResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            records: outcome.log.iter().map(GridRecord::from).collect(),
            best_index: outcome.best.index,
            final_summary: FinalSummary::from(final_result),
        }
    }

    pub fn load(path: &Path) -> Result<Self, TuneError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write atomically: a temp file next to `path`, then rename over it.
    pub fn save(&self, path: &Path) -> Result<(), TuneError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Output format of the reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{other}' (expected text or json)")),
        }
    }
}

/// Formats sweep results for humans or machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultReporter {
    format: ReportFormat,
}

impl ResultReporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    pub fn write<W: Write>(&self, writer: &mut W, report: &SweepReport) -> Result<(), TuneError> {
        match self.format {
            ReportFormat::Text => writer.write_all(render_text(report).as_bytes())?,
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut *writer, report)?;
                writeln!(writer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Fixed-width table of the grid log followed by the final summary.
pub fn render_text(report: &SweepReport) -> String {
    let extra_names: Vec<&str> = report
        .records
        .first()
        .map(|r| r.extra.iter().map(|(name, _)| name.as_str()).collect())
        .unwrap_or_default();

    let mut out = String::new();
    let _ = write!(out, "  {:>6}  {:>10}", "epochs", "batch_size");
    for name in &extra_names {
        let _ = write!(out, "  {name:>12}");
    }
    let _ = writeln!(out, "  {:>10}  {:>13}", "test_loss", "test_accuracy");

    for (i, record) in report.records.iter().enumerate() {
        let marker = if i == report.best_index { '*' } else { ' ' };
        let _ = write!(out, "{marker} {:>6}  {:>10}", record.epochs, record.batch_size);
        for name in &extra_names {
            let value = record
                .extra
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            let _ = write!(out, "  {value:>12}");
        }
        match (&record.error, record.test_loss, record.test_accuracy) {
            (Some(error), _, _) => {
                let _ = writeln!(out, "  FAILED: {error}");
            }
            (None, Some(loss), Some(acc)) => {
                let _ = writeln!(out, "  {loss:>10.4}  {acc:>13.4}");
            }
            _ => {
                let _ = writeln!(out, "  {:>10}  {:>13}", "-", "-");
            }
        }
    }

    let summary = &report.final_summary;
    let _ = writeln!(out);
    let _ = write!(
        out,
        "Best configuration: epochs={}, batch_size={}",
        summary.best_epochs, summary.best_batch_size
    );
    for (name, value) in &summary.best_extra {
        let _ = write!(out, ", {name}={value}");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Final model: test_loss={:.4}, test_accuracy={:.4}",
        summary.final_test_loss, summary.final_test_accuracy
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RunFailure, RunStage};
    use crate::grid::HyperparameterConfig;
    use crate::search::BestSelection;
    use crate::training::history::TrainingHistory;
    use pretty_assertions::assert_eq;

    fn result(epochs: usize, batch: usize, acc: f64) -> TuningResult {
        TuningResult {
            config: HyperparameterConfig::new(epochs, batch),
            test_loss: 1.0 - acc,
            test_accuracy: acc,
            history: TrainingHistory::new(),
        }
    }

    fn outcome() -> SearchOutcome {
        let best = result(10, 32, 0.9);
        SearchOutcome {
            log: vec![
                CellOutcome::Completed(result(5, 32, 0.5)),
                CellOutcome::Failed(RunFailure::new(
                    &HyperparameterConfig::new(5, 64),
                    RunStage::Fit,
                    "diverged",
                )),
                CellOutcome::Completed(best.clone()),
            ],
            best: BestSelection::from_result(2, &best),
        }
    }

    #[test]
    fn test_records_serialize_to_flat_rows() {
        let report = SweepReport::new(&outcome(), &result(10, 32, 0.91));
        let rows = serde_json::to_value(&report.records).unwrap();
        assert_eq!(
            rows[0],
            serde_json::json!({"epochs": 5, "batch_size": 32, "test_loss": 0.5, "test_accuracy": 0.5})
        );
        assert_eq!(rows[1]["test_accuracy"], serde_json::Value::Null);
        assert_eq!(rows[1]["error"], "fit: diverged");

        let summary = serde_json::to_value(&report.final_summary).unwrap();
        assert_eq!(
            summary,
            serde_json::json!({
                "best_epochs": 10,
                "best_batch_size": 32,
                "final_test_loss": 1.0 - 0.91,
                "final_test_accuracy": 0.91
            })
        );
    }

    #[test]
    fn test_render_text_marks_best_and_failures() {
        let report = SweepReport::new(&outcome(), &result(10, 32, 0.91));
        let text = render_text(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("test_accuracy"));
        assert!(lines[2].contains("FAILED: fit: diverged"));
        assert!(lines[3].starts_with('*'));
        assert!(text.contains("Best configuration: epochs=10, batch_size=32"));
        assert!(text.contains("test_accuracy=0.9100"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("sweep.json");
        let report = SweepReport::new(&outcome(), &result(10, 32, 0.91));
        report.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        let loaded = SweepReport::load(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.created_at, report.created_at);
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.records[1].error.as_deref(), Some("fit: diverged"));
        assert_eq!(loaded.final_summary.best_epochs, 10);
    }

    #[test]
    fn test_json_writer() {
        let report = SweepReport::new(&outcome(), &result(10, 32, 0.91));
        let mut buf = Vec::new();
        ResultReporter::new(ReportFormat::Json)
            .write(&mut buf, &report)
            .unwrap();
        let parsed: SweepReport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.best_index, 2);
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("JSON".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert!("yaml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_extra_knobs_keep_declared_order() {
        let config = HyperparameterConfig::new(5, 32)
            .with("zeta", 1)
            .with("alpha", "adam");
        let cell = TuningResult {
            config,
            ..result(5, 32, 0.6)
        };
        let outcome = SearchOutcome {
            log: vec![CellOutcome::Completed(cell.clone())],
            best: BestSelection::from_result(0, &cell),
        };
        let report = SweepReport::new(&outcome, &cell);

        let names: Vec<&str> = report.records[0]
            .extra
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);

        let text = render_text(&report);
        let header = text.lines().next().unwrap();
        let zeta = header.find("zeta").unwrap();
        let alpha = header.find("alpha").unwrap();
        assert!(zeta < alpha);
        assert!(text.contains("Best configuration: epochs=5, batch_size=32, zeta=1, alpha=adam"));

        let row = text.lines().nth(1).unwrap();
        assert!(row.find('1').unwrap() < row.find("adam").unwrap());
    }
}
