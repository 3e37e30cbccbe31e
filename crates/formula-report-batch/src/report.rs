use core::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::error::BatchError;
use crate::processor::VariantStep;
use crate::session::ReleaseFailure;

/// What happened to one resolved entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum VariantOutcome {
    Succeeded {
        sheet_name: String,
    },
    SucceededWithWarnings {
        sheet_name: String,
        warnings: Vec<String>,
    },
    SkippedEmpty,
    Failed {
        step: VariantStep,
        error: String,
        warnings: Vec<String>,
    },
}

impl VariantOutcome {
    /// Name of the sheet the variant produced, if it produced one.
    pub fn sheet_name(&self) -> Option<&str> {
        match self {
            VariantOutcome::Succeeded { sheet_name }
            | VariantOutcome::SucceededWithWarnings { sheet_name, .. } => Some(sheet_name.as_str()),
            VariantOutcome::SkippedEmpty | VariantOutcome::Failed { .. } => None,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            VariantOutcome::SucceededWithWarnings { warnings, .. }
            | VariantOutcome::Failed { warnings, .. } => warnings.as_slice(),
            VariantOutcome::Succeeded { .. } | VariantOutcome::SkippedEmpty => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    /// The trimmed variant id, or the raw text of a blank entry.
    pub variant: String,
    #[serde(flatten)]
    pub outcome: VariantOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    AbortedBeforeProcessing,
    AbortedMidRun,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Completed => "completed",
            RunStatus::AbortedBeforeProcessing => "aborted before processing",
            RunStatus::AbortedMidRun => "aborted mid-run",
        })
    }
}

/// Result of a whole batch run.
///
/// `error` is set exactly when `status` is not [`RunStatus::Completed`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<BatchError>,
    pub output_path: Option<PathBuf>,
    pub variants: Vec<VariantReport>,
    pub release_failures: Vec<ReleaseFailure>,
}

impl RunResult {
    pub(crate) fn completed(
        output_path: PathBuf,
        variants: Vec<VariantReport>,
        release_failures: Vec<ReleaseFailure>,
    ) -> Self {
        Self {
            status: RunStatus::Completed,
            error: None,
            output_path: Some(output_path),
            variants,
            release_failures,
        }
    }

    pub(crate) fn aborted(
        status: RunStatus,
        error: BatchError,
        variants: Vec<VariantReport>,
        release_failures: Vec<ReleaseFailure>,
    ) -> Self {
        Self {
            status,
            error: Some(error),
            output_path: None,
            variants,
            release_failures,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Names of the sheets written to the output, in processing order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.variants
            .iter()
            .filter_map(|report| report.outcome.sheet_name())
            .collect()
    }

    pub fn into_result(mut self) -> Result<Self, BatchError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.variants {
            match &report.outcome {
                VariantOutcome::Succeeded { sheet_name } => {
                    writeln!(f, "{}: wrote sheet `{sheet_name}`", report.variant)?;
                }
                VariantOutcome::SucceededWithWarnings {
                    sheet_name,
                    warnings,
                } => {
                    writeln!(
                        f,
                        "{}: wrote sheet `{sheet_name}` with {} warning(s)",
                        report.variant,
                        warnings.len()
                    )?;
                }
                VariantOutcome::SkippedEmpty => {
                    writeln!(f, "{:?}: skipped (blank)", report.variant)?;
                }
                VariantOutcome::Failed { step, error, .. } => {
                    writeln!(f, "{}: failed during {step}: {error}", report.variant)?;
                }
            }
            for warning in report.outcome.warnings() {
                writeln!(f, "    warning: {warning}")?;
            }
        }

        let written = self.sheet_names().len();
        match (&self.error, &self.output_path) {
            (None, Some(path)) => write!(
                f,
                "run completed: {written} sheet(s) saved to `{}`",
                path.display()
            )?,
            (Some(err), _) => write!(f, "run {}: {err}", self.status)?,
            (None, None) => write!(f, "run {}", self.status)?,
        }
        for failure in &self.release_failures {
            write!(f, "\nwarning: {}", failure.error)?;
        }
        Ok(())
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<BatchError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn reports() -> Vec<VariantReport> {
        vec![
            VariantReport {
                variant: "F1".to_string(),
                outcome: VariantOutcome::Succeeded {
                    sheet_name: "Revenue_F1".to_string(),
                },
            },
            VariantReport {
                variant: " ".to_string(),
                outcome: VariantOutcome::SkippedEmpty,
            },
            VariantReport {
                variant: "F2".to_string(),
                outcome: VariantOutcome::Failed {
                    step: VariantStep::Rename,
                    error: "boom".to_string(),
                    warnings: vec!["macro failed".to_string()],
                },
            },
        ]
    }

    #[test]
    fn serializes_a_flat_json_report() {
        let result = RunResult::completed(PathBuf::from("out/sample.xlsx"), reports(), Vec::new());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "completed",
                "error": null,
                "outputPath": "out/sample.xlsx",
                "variants": [
                    { "variant": "F1", "status": "succeeded", "sheetName": "Revenue_F1" },
                    { "variant": " ", "status": "skipped_empty" },
                    {
                        "variant": "F2",
                        "status": "failed",
                        "step": "rename",
                        "error": "boom",
                        "warnings": ["macro failed"]
                    }
                ],
                "releaseFailures": []
            })
        );
    }

    #[test]
    fn warning_outcomes_use_camel_case_keys() {
        let report = VariantReport {
            variant: "F2".to_string(),
            outcome: VariantOutcome::SucceededWithWarnings {
                sheet_name: "Revenue_F2".to_string(),
                warnings: vec!["macro failed".to_string()],
            },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "variant": "F2",
                "status": "succeeded_with_warnings",
                "sheetName": "Revenue_F2",
                "warnings": ["macro failed"]
            })
        );
    }

    #[test]
    fn summary_lists_every_entry_and_the_status() {
        let result = RunResult::aborted(
            RunStatus::AbortedMidRun,
            BatchError::DivisionNotFound("X".to_string()),
            reports(),
            Vec::new(),
        );
        let text = result.to_string();
        assert!(text.contains("F1: wrote sheet `Revenue_F1`"));
        assert!(text.contains("\" \": skipped (blank)"));
        assert!(text.contains("F2: failed during rename: boom"));
        assert!(text.contains("    warning: macro failed"));
        assert!(text.ends_with("run aborted mid-run: division `X` not found in reference sheet"));
        assert!(result.into_result().is_err());
    }
}
