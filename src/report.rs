//! Report output for split and clean runs

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Trait for report generators
pub trait Reporter {
    fn generate<T: Serialize>(&self, report: &T, output_path: &Path) -> Result<()>;
}

/// JSON report generator
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn generate<T: Serialize>(&self, report: &T, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CleanReport, SplitSizes};

    #[test]
    fn json_report_round_trips_counts() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut report = CleanReport::new(Path::new("labels"), Path::new("images"), true);
        report.labels_scanned = 4;
        report.removed = 2;

        let path = temp.path().join("clean.json");
        JsonReporter::new().generate(&report, &path).expect("write report");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read report")).expect("parse");
        assert_eq!(value["generator"], "corpus-prep");
        assert_eq!(value["labels_scanned"], 4);
        assert_eq!(value["removed"], 2);
        assert_eq!(value["delete"], true);

        let sizes = serde_json::to_value(SplitSizes { train: 7, val: 2, test: 1 }).expect("serialize");
        assert_eq!(sizes["val"], 2);
    }
}
