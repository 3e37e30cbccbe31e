use std::path::PathBuf;

use formula_automation::HostError;

use crate::processor::VariantStep;
use crate::session::SessionResource;

/// Every failure a batch run can hit.
///
/// Only some of these end a run: `MacroInvocationFailed` and `VariantStepFailed` are recorded per
/// variant and the batch moves on, and `ResourceReleaseFailed` is only ever logged and reported.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("source workbook not found at `{0}`")]
    SourceNotFound(PathBuf),
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("invalid configuration file `{path}`: {message}")]
    InvalidConfigFile { path: PathBuf, message: String },
    #[error("failed to launch automation host: {0}")]
    HostLaunch(#[source] HostError),
    #[error("failed to open source workbook `{path}`: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: HostError,
    },
    #[error("failed to create output workbook: {0}")]
    CreateOutput(#[source] HostError),
    #[error("template sheet `{0}` not found in source workbook")]
    TemplateSheetMissing(String),
    #[error("reference sheet `{0}` not found in source workbook")]
    ReferenceSheetMissing(String),
    #[error("division `{0}` not found in reference sheet")]
    DivisionNotFound(String),
    #[error("no codes found for division `{0}`")]
    NoCodesForDivision(String),
    #[error("invalid variant list: {0}")]
    InvalidVariantList(String),
    #[error("could not run macro `{name}`: {source}")]
    MacroInvocationFailed {
        name: String,
        #[source]
        source: HostError,
    },
    #[error("variant `{variant}` failed during {step}: {source}")]
    VariantStepFailed {
        variant: String,
        step: VariantStep,
        #[source]
        source: HostError,
    },
    #[error("failed to save output workbook to `{path}`: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: HostError,
    },
    #[error("could not release {resource}: {source}")]
    ResourceReleaseFailed {
        resource: SessionResource,
        #[source]
        source: HostError,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}
