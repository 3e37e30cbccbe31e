use core::fmt;
use std::path::{Path, PathBuf};

use formula_automation::{AutomationHost, DocumentId, HostError, HostOptions};
use serde::Serialize;

use crate::error::BatchError;

/// What a session holds and must give back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionResource {
    OutputDocument,
    SourceDocument,
    Host,
}

impl fmt::Display for SessionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionResource::OutputDocument => "output workbook",
            SessionResource::SourceDocument => "source workbook",
            SessionResource::Host => "automation host",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFailure {
    pub resource: SessionResource,
    pub error: String,
}

/// Acquisition error, plus whatever went wrong releasing the part that was acquired.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AcquireFailure {
    pub error: BatchError,
    pub release_failures: Vec<ReleaseFailure>,
}

impl AcquireFailure {
    fn new(error: BatchError, release_failures: Vec<ReleaseFailure>) -> Self {
        Self {
            error,
            release_failures,
        }
    }
}

impl From<AcquireFailure> for BatchError {
    fn from(failure: AcquireFailure) -> Self {
        failure.error
    }
}

/// A running host with the source workbook open and a fresh output workbook.
///
/// Release closes the output (discarding unsaved changes), then the source, then quits the host.
/// It runs exactly once: either through [`HostSession::release`] or when the session is dropped,
/// which covers early returns and panics. Release failures are logged and collected, never
/// raised.
pub struct HostSession<H: AutomationHost> {
    host: H,
    source_path: PathBuf,
    source: DocumentId,
    output: DocumentId,
    released: Option<Vec<ReleaseFailure>>,
}

impl<H: AutomationHost> HostSession<H> {
    /// Check the source path, start the host, open the source and create the output.
    ///
    /// Nothing is launched when the source does not exist. If a later step fails, whatever was
    /// acquired so far is released before the error is returned, and the release failures travel
    /// with it.
    pub fn acquire<F>(source_path: &Path, launch: F) -> Result<Self, AcquireFailure>
    where
        F: FnOnce() -> Result<H, HostError>,
    {
        if !source_path.is_file() {
            return Err(AcquireFailure::new(
                BatchError::SourceNotFound(source_path.to_path_buf()),
                Vec::new(),
            ));
        }

        log::info!("starting automation host");
        let mut host =
            launch().map_err(|err| AcquireFailure::new(BatchError::HostLaunch(err), Vec::new()))?;
        if let Err(err) = host.configure(HostOptions::unattended()) {
            let released = release_resources(&mut host, None, None);
            return Err(AcquireFailure::new(BatchError::HostLaunch(err), released));
        }

        log::info!("opening source workbook `{}`", source_path.display());
        let source = match host.open_document(source_path) {
            Ok(doc) => doc,
            Err(source) => {
                let released = release_resources(&mut host, None, None);
                let error = BatchError::OpenSource {
                    path: source_path.to_path_buf(),
                    source,
                };
                return Err(AcquireFailure::new(error, released));
            }
        };

        let output = match host.create_document() {
            Ok(doc) => doc,
            Err(err) => {
                let released = release_resources(&mut host, None, Some(source));
                return Err(AcquireFailure::new(BatchError::CreateOutput(err), released));
            }
        };
        log::debug!("source is {source}, output is {output}");

        Ok(Self {
            host,
            source_path: source_path.to_path_buf(),
            source,
            output,
            released: None,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn source(&self) -> DocumentId {
        self.source
    }

    pub fn output(&self) -> DocumentId {
        self.output
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// `file_name` in the source workbook's directory, or in the working directory when the
    /// source path has none.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        let dir = match self.source_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        dir.join(file_name)
    }

    pub fn is_released(&self) -> bool {
        self.released.is_some()
    }

    /// Release everything. Later calls (and the drop) do nothing and return the same failures.
    pub fn release(&mut self) -> &[ReleaseFailure] {
        let (host, output, source) = (&mut self.host, self.output, self.source);
        self.released
            .get_or_insert_with(|| release_resources(host, Some(output), Some(source)))
    }
}

impl<H: AutomationHost> Drop for HostSession<H> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<H: AutomationHost> fmt::Debug for HostSession<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSession")
            .field("source_path", &self.source_path)
            .field("source", &self.source)
            .field("output", &self.output)
            .field("released", &self.is_released())
            .finish()
    }
}

fn release_resources<H: AutomationHost>(
    host: &mut H,
    output: Option<DocumentId>,
    source: Option<DocumentId>,
) -> Vec<ReleaseFailure> {
    let mut failures = Vec::new();
    if let Some(doc) = output {
        record(
            SessionResource::OutputDocument,
            host.close_document(doc, false),
            &mut failures,
        );
    }
    if let Some(doc) = source {
        record(
            SessionResource::SourceDocument,
            host.close_document(doc, false),
            &mut failures,
        );
    }
    record(SessionResource::Host, host.quit(), &mut failures);
    failures
}

fn record(
    resource: SessionResource,
    result: Result<(), HostError>,
    failures: &mut Vec<ReleaseFailure>,
) {
    match result {
        Ok(()) => log::debug!("released {resource}"),
        Err(source) => {
            let err = BatchError::ResourceReleaseFailed { resource, source };
            log::warn!("{err}");
            failures.push(ReleaseFailure {
                resource,
                error: err.to_string(),
            });
        }
    }
}
