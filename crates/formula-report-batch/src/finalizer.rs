use std::path::PathBuf;

use formula_automation::{sheet_name_eq_case_insensitive, AutomationHost};

use crate::config::TemplateLayout;
use crate::error::BatchError;
use crate::session::HostSession;

/// Drop the placeholder sheet when real sheets exist, then save the output next to the source.
///
/// Returns the path the output was saved to.
pub fn finalize<H: AutomationHost>(
    session: &mut HostSession<H>,
    layout: &TemplateLayout,
) -> Result<PathBuf, BatchError> {
    remove_placeholder(session, &layout.placeholder_sheet);

    let path = session.output_path(&layout.output_file_name);
    log::info!("saving output workbook to `{}`", path.display());
    let output = session.output();
    session
        .host_mut()
        .save_as(output, &path)
        .map_err(|source| BatchError::PersistFailed {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

fn remove_placeholder<H: AutomationHost>(session: &mut HostSession<H>, placeholder: &str) {
    let output = session.output();
    let names = match session.host().sheet_names(output) {
        Ok(names) => names,
        Err(err) => {
            log::warn!("could not list output sheets, keeping `{placeholder}`: {err}");
            return;
        }
    };

    let (placeholders, others): (Vec<&String>, Vec<&String>) = names
        .iter()
        .partition(|name| sheet_name_eq_case_insensitive(name, placeholder));
    let Some(found) = placeholders.first() else {
        return;
    };
    if others.is_empty() {
        log::info!("no variant sheets were written; keeping `{found}`");
        return;
    }

    match session.host_mut().delete_sheet(output, found) {
        Ok(()) => log::debug!("removed placeholder sheet `{found}`"),
        Err(err) => log::warn!("could not remove placeholder sheet `{found}`: {err}"),
    }
}
