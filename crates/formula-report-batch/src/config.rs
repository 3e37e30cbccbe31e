use std::path::{Path, PathBuf};

use formula_automation::{CellRef, ColumnRef, PLACEHOLDER_SHEET_NAME};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::resolver::VariantSource;

/// Where things live in the source workbook, and what the output is called.
///
/// Every field has a default matching the revenue report template, so a layout file only needs
/// to name what differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateLayout {
    /// Sheet that is parameterized, recalculated, and copied once per variant.
    pub template_sheet: String,
    /// Sheet holding the division → codes lookup table.
    pub reference_sheet: String,
    /// Template cells that receive the variant id. All are written with the same value.
    pub parameter_cells: Vec<CellRef>,
    /// Template cell whose (recalculated) value names the output sheet.
    pub naming_cell: CellRef,
    pub division_column: ColumnRef,
    /// Up to three code columns in the reference table, read left to right.
    pub code_columns: Vec<ColumnRef>,
    /// Default sheet of a freshly created output workbook.
    pub placeholder_sheet: String,
    /// File name of the output workbook, saved next to the source workbook.
    pub output_file_name: String,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            template_sheet: "Template".to_string(),
            reference_sheet: "Ref".to_string(),
            parameter_cells: vec![
                CellRef::new(5, 4), // E6
                CellRef::new(6, 4), // E7
                CellRef::new(7, 4), // E8
            ],
            naming_cell: CellRef::new(4, 4), // E5
            division_column: ColumnRef::new(0),
            code_columns: vec![ColumnRef::new(1), ColumnRef::new(2), ColumnRef::new(3)],
            placeholder_sheet: PLACEHOLDER_SHEET_NAME.to_string(),
            output_file_name: "sample.xlsx".to_string(),
        }
    }
}

impl TemplateLayout {
    pub fn from_json_file(path: &Path) -> Result<Self, BatchError> {
        let layout: Self = read_json(path)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.template_sheet.trim().is_empty() {
            return Err(BatchError::InvalidLayout(
                "template sheet name is empty".to_string(),
            ));
        }
        if self.parameter_cells.is_empty() {
            return Err(BatchError::InvalidLayout(
                "at least one parameter cell is required".to_string(),
            ));
        }
        if self.output_file_name.trim().is_empty() {
            return Err(BatchError::InvalidLayout(
                "output file name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a batch run needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub source_path: PathBuf,
    pub variants: VariantSource,
    /// Macros run after each refresh. Unqualified names are qualified with the source workbook.
    #[serde(default)]
    pub macro_names: Vec<String>,
    #[serde(default)]
    pub layout: TemplateLayout,
}

impl BatchConfig {
    pub fn new(source_path: impl Into<PathBuf>, variants: VariantSource) -> Self {
        Self {
            source_path: source_path.into(),
            variants,
            macro_names: Vec::new(),
            layout: TemplateLayout::default(),
        }
    }

    #[must_use]
    pub fn with_macros<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.macro_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: TemplateLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Load a job description. A relative `sourcePath` is resolved against the file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self, BatchError> {
        let mut config: Self = read_json(path)?;
        if config.source_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.source_path = dir.join(&config.source_path);
            }
        }
        config.layout.validate()?;
        Ok(config)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BatchError> {
    let invalid = |message: String| BatchError::InvalidConfigFile {
        path: path.to_path_buf(),
        message,
    };
    let bytes = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
}
