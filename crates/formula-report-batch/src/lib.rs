//! Batch generation of per-variant report sheets from a spreadsheet template.
//!
//! A run drives an [`AutomationHost`](formula_automation::AutomationHost):
//!
//! 1. [`HostSession`] starts the host, opens the source workbook, and creates an output workbook.
//! 2. [`VariantSource`] resolves the variant codes, either from a division row of the reference
//!    table or from an explicit list.
//! 3. [`VariantProcessor`] writes each code into the template's parameter cells, recalculates,
//!    runs the configured macros, and copies the template into the output under a name derived
//!    from the naming cell ([`sanitize_sheet_name`]).
//! 4. [`finalize`] drops the placeholder sheet and saves the output next to the source.
//!
//! [`run_batch`] ties these together and always releases the session, returning a [`RunResult`]
//! with one outcome per entry.

mod config;
mod error;
mod finalizer;
mod processor;
mod report;
mod resolver;
mod run;
mod session;
mod sheet_name;
mod variant;

pub use crate::config::{BatchConfig, TemplateLayout};
pub use crate::error::BatchError;
pub use crate::finalizer::finalize;
pub use crate::processor::{qualify_macro_name, VariantProcessor, VariantStep};
pub use crate::report::{RunResult, RunStatus, VariantOutcome, VariantReport};
pub use crate::resolver::{
    find_reference_row, list_divisions, resolve_direct, ReferenceRow, ResolvedEntry,
    ResolvedVariants, VariantSource,
};
pub use crate::run::{read_divisions, run_batch};
pub use crate::session::{AcquireFailure, HostSession, ReleaseFailure, SessionResource};
pub use crate::sheet_name::{sanitize_sheet_name, FALLBACK_SHEET_LABEL};
pub use crate::variant::VariantId;
