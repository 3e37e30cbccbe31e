use core::fmt;

use formula_automation::{sheet_name_eq_case_insensitive, AutomationHost, CellValue, HostError};
use serde::Serialize;

use crate::config::TemplateLayout;
use crate::error::BatchError;
use crate::report::{VariantOutcome, VariantReport};
use crate::resolver::ResolvedEntry;
use crate::session::HostSession;
use crate::sheet_name::{sanitize_sheet_name, FALLBACK_SHEET_LABEL};
use crate::variant::VariantId;

/// Steps of a single variant, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStep {
    ParamWrite,
    Refresh,
    Macros,
    NameDerive,
    CopyInsert,
    Rename,
}

impl fmt::Display for VariantStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VariantStep::ParamWrite => "parameter write",
            VariantStep::Refresh => "refresh",
            VariantStep::Macros => "macros",
            VariantStep::NameDerive => "name derivation",
            VariantStep::CopyInsert => "copy",
            VariantStep::Rename => "rename",
        })
    }
}

struct StepFailure {
    step: VariantStep,
    source: HostError,
}

fn at(step: VariantStep) -> impl FnOnce(HostError) -> StepFailure {
    move |source| StepFailure { step, source }
}

/// Turns resolved entries into output sheets, one at a time.
#[derive(Debug)]
pub struct VariantProcessor<'a> {
    layout: &'a TemplateLayout,
    macro_names: Vec<String>,
}

impl<'a> VariantProcessor<'a> {
    /// `source_name` is the source workbook's file name, used to qualify bare macro names.
    pub fn new(layout: &'a TemplateLayout, macro_names: &[String], source_name: &str) -> Self {
        Self {
            layout,
            macro_names: macro_names
                .iter()
                .map(|name| qualify_macro_name(name, source_name))
                .collect(),
        }
    }

    /// Process one entry. Never fails: step errors end up in the returned outcome.
    pub fn process<H: AutomationHost>(
        &self,
        session: &mut HostSession<H>,
        entry: &ResolvedEntry,
    ) -> VariantReport {
        let id = match entry {
            ResolvedEntry::Variant(id) => id,
            ResolvedEntry::Blank { raw } => {
                log::info!("skipping blank entry {raw:?}");
                return VariantReport {
                    variant: raw.clone(),
                    outcome: VariantOutcome::SkippedEmpty,
                };
            }
        };

        log::info!("processing variant `{id}`");
        let mut warnings = Vec::new();
        let outcome = match self.run_steps(session, id, &mut warnings) {
            Ok(sheet_name) => {
                log::info!("variant `{id}` written to sheet `{sheet_name}`");
                if warnings.is_empty() {
                    VariantOutcome::Succeeded { sheet_name }
                } else {
                    VariantOutcome::SucceededWithWarnings {
                        sheet_name,
                        warnings,
                    }
                }
            }
            Err(StepFailure { step, source }) => {
                let error = source.to_string();
                log::warn!(
                    "{}",
                    BatchError::VariantStepFailed {
                        variant: id.to_string(),
                        step,
                        source,
                    }
                );
                VariantOutcome::Failed {
                    step,
                    error,
                    warnings,
                }
            }
        };
        VariantReport {
            variant: id.to_string(),
            outcome,
        }
    }

    fn run_steps<H: AutomationHost>(
        &self,
        session: &mut HostSession<H>,
        id: &VariantId,
        warnings: &mut Vec<String>,
    ) -> Result<String, StepFailure> {
        let layout = self.layout;
        let template = layout.template_sheet.as_str();
        let (source, output) = (session.source(), session.output());
        let host = session.host_mut();

        for cell in &layout.parameter_cells {
            host.set_cell_value(source, template, *cell, CellValue::from(id.as_str()))
                .map_err(at(VariantStep::ParamWrite))?;
        }

        // Completion is whatever the host reports; queries it starts in the background are not
        // awaited.
        host.calculate().map_err(at(VariantStep::Refresh))?;
        host.refresh_all(source).map_err(at(VariantStep::Refresh))?;

        for name in &self.macro_names {
            log::debug!("running macro `{name}`");
            if let Err(err) = host.run_macro(name) {
                let warning = BatchError::MacroInvocationFailed {
                    name: name.clone(),
                    source: err,
                };
                log::warn!("variant `{id}`: {warning}");
                warnings.push(warning.to_string());
            }
        }

        let label = host
            .cell_value(source, template, layout.naming_cell)
            .map_err(at(VariantStep::NameDerive))?;
        let label = match label {
            CellValue::Empty => None,
            CellValue::Text(text) if text.is_empty() => None,
            value => Some(value.display_text()),
        };
        if label.is_none() {
            log::warn!(
                "naming cell {} is empty for variant `{id}`; using `{FALLBACK_SHEET_LABEL}`",
                layout.naming_cell
            );
        }
        let sheet_name = sanitize_sheet_name(label.as_deref(), id.as_str());

        let existing = host
            .sheet_names(output)
            .map_err(at(VariantStep::CopyInsert))?;
        if let Some(previous) = existing
            .iter()
            .find(|name| sheet_name_eq_case_insensitive(name, &sheet_name))
        {
            log::info!("replacing existing sheet `{previous}` in the output workbook");
            host.delete_sheet(output, previous)
                .map_err(at(VariantStep::CopyInsert))?;
        }
        let copied = host
            .copy_sheet(source, template, output, 0)
            .map_err(at(VariantStep::CopyInsert))?;

        if let Err(err) = host.rename_sheet(output, &copied, &sheet_name) {
            // Leave no stray template copy behind.
            if let Err(cleanup) = host.delete_sheet(output, &copied) {
                log::warn!("could not remove unnamed copy `{copied}`: {cleanup}");
            }
            return Err(StepFailure {
                step: VariantStep::Rename,
                source: err,
            });
        }
        Ok(sheet_name)
    }
}

/// Qualify `name` with the workbook that defines it unless it is already qualified.
pub fn qualify_macro_name(name: &str, document_name: &str) -> String {
    if name.contains('!') {
        name.to_string()
    } else {
        format!("'{document_name}'!{name}")
    }
}
