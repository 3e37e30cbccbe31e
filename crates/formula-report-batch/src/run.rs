use std::path::{Path, PathBuf};

use formula_automation::{sheet_name_eq_case_insensitive, AutomationHost, HostError};

use crate::config::{BatchConfig, TemplateLayout};
use crate::error::BatchError;
use crate::finalizer::finalize;
use crate::processor::VariantProcessor;
use crate::report::{RunResult, RunStatus, VariantReport};
use crate::resolver::list_divisions;
use crate::session::{HostSession, ReleaseFailure};

/// Run a whole batch: acquire a session, resolve variants, process each one, save the output,
/// and release the session.
///
/// `launch` starts the host; it is not called when the source workbook does not exist. The
/// session is released exactly once whatever happens, including when a host call panics.
pub fn run_batch<H, F>(config: &BatchConfig, launch: F) -> RunResult
where
    H: AutomationHost,
    F: FnOnce() -> Result<H, HostError>,
{
    log::info!(
        "starting report batch for `{}`",
        config.source_path.display()
    );
    if let Err(err) = config.layout.validate() {
        return abort_before_processing(err, Vec::new());
    }
    let mut session = match HostSession::acquire(&config.source_path, launch) {
        Ok(session) => session,
        Err(failure) => return abort_before_processing(failure.error, failure.release_failures),
    };

    let mut variants = Vec::new();
    let outcome = execute(&mut session, config, &mut variants);
    let release_failures = session.release().to_vec();

    match outcome {
        Ok(path) => {
            let result = RunResult::completed(path, variants, release_failures);
            log::info!(
                "report batch completed: {} sheet(s) written",
                result.sheet_names().len()
            );
            result
        }
        Err((status, err)) => {
            log::error!("report batch {status}: {err}");
            RunResult::aborted(status, err, variants, release_failures)
        }
    }
}

fn abort_before_processing(err: BatchError, release_failures: Vec<ReleaseFailure>) -> RunResult {
    log::error!("report batch {}: {err}", RunStatus::AbortedBeforeProcessing);
    RunResult::aborted(
        RunStatus::AbortedBeforeProcessing,
        err,
        Vec::new(),
        release_failures,
    )
}

fn execute<H: AutomationHost>(
    session: &mut HostSession<H>,
    config: &BatchConfig,
    variants: &mut Vec<VariantReport>,
) -> Result<PathBuf, (RunStatus, BatchError)> {
    let before = |err: BatchError| (RunStatus::AbortedBeforeProcessing, err);
    let layout = &config.layout;
    let source = session.source();

    let sheets = session.host().sheet_names(source).map_err(|e| before(e.into()))?;
    if !sheets
        .iter()
        .any(|name| sheet_name_eq_case_insensitive(name, &layout.template_sheet))
    {
        return Err(before(BatchError::TemplateSheetMissing(
            layout.template_sheet.clone(),
        )));
    }

    let resolved = config
        .variants
        .resolve(session.host(), source, layout)
        .map_err(before)?;
    let source_name = session
        .host()
        .document_name(source)
        .map_err(|e| before(e.into()))?;
    log::info!(
        "processing {} entr{}",
        resolved.len(),
        if resolved.len() == 1 { "y" } else { "ies" }
    );

    let processor = VariantProcessor::new(layout, &config.macro_names, &source_name);
    for entry in resolved.entries() {
        variants.push(processor.process(session, entry));
    }

    finalize(session, layout).map_err(|err| (RunStatus::AbortedMidRun, err))
}

/// Division labels of the reference table, for picking a `--division`.
pub fn read_divisions<H, F>(
    source_path: &Path,
    layout: &TemplateLayout,
    launch: F,
) -> Result<Vec<String>, BatchError>
where
    H: AutomationHost,
    F: FnOnce() -> Result<H, HostError>,
{
    let mut session = HostSession::acquire(source_path, launch)?;
    let divisions = list_divisions(session.host(), session.source(), layout);
    session.release();
    divisions
}
