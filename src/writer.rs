use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::{InspectError, InspectReport};

pub const REPORT_FILE: &str = "inspect_report.json";
pub const RENDERED_FILE: &str = "inspect_report.txt";

/// Writes inspection results to an output directory
pub struct ReportWriter;

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes the JSON report and the rendered text; returns the paths written
    pub fn write_report(
        &self,
        report: &InspectReport,
        base_path: &Path,
    ) -> Result<Vec<PathBuf>, InspectError> {
        fs::create_dir_all(base_path)?;

        let json_path = base_path.join(REPORT_FILE);
        fs::write(&json_path, serde_json::to_string_pretty(report)?)?;

        let text_path = base_path.join(RENDERED_FILE);
        fs::write(&text_path, format!("{}\n", report.rendered))?;

        debug!("Report written to {}", base_path.display());
        Ok(vec![json_path, text_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inspect_snapshot, InspectRequest};
    use isalens_core::{FormatOptions, LensConfig, ResolutionPolicy};

    #[test]
    fn test_write_report() {
        let request = InspectRequest {
            snapshot: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/crates/core/tests/fixtures/kvo_observer.json"
            )),
            binary: None,
            config: LensConfig::default(),
            frame: 0,
            path: "object".to_string(),
            policy: ResolutionPolicy::DynamicNoRunTarget,
            format: FormatOptions::default(),
            step: None,
        };
        let report = inspect_snapshot(&request).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let written = ReportWriter::new().write_report(&report, &out).unwrap();
        assert_eq!(written.len(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(json["type_name"], "SourceDerived *");
        assert_eq!(json["policy"], "no-run-target");
        assert!(json.get("step").is_none());

        let text = fs::read_to_string(out.join(RENDERED_FILE)).unwrap();
        assert!(text.starts_with("(SourceDerived *) object = 0x0000000000003000"));
        assert!(!text.contains("NSKVONotifying"));
    }
}
