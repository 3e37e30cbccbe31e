use formula_automation::{sheet_name_eq_case_insensitive, AutomationHost, DocumentId};
use serde::{Deserialize, Serialize};

use crate::config::TemplateLayout;
use crate::error::BatchError;
use crate::variant::VariantId;

/// How the variants of a run are chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum VariantSource {
    /// Look a division up in the reference table and take its codes.
    Lookup { division: String },
    /// An explicit list. Blank entries are kept as skipped placeholders.
    #[serde(rename_all = "camelCase")]
    Direct { variant_ids: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedEntry {
    Variant(VariantId),
    /// A direct-mode entry that was empty after trimming.
    Blank { raw: String },
}

/// Entries in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVariants {
    entries: Vec<ResolvedEntry>,
}

impl ResolvedVariants {
    pub fn entries(&self) -> &[ResolvedEntry] {
        &self.entries
    }

    /// Variant ids, skipping blanks.
    pub fn ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ResolvedEntry::Variant(id) => Some(id.as_str()),
                ResolvedEntry::Blank { .. } => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<VariantId> for ResolvedVariants {
    fn from_iter<T: IntoIterator<Item = VariantId>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(ResolvedEntry::Variant).collect(),
        }
    }
}

/// A row of the reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    /// 0-indexed.
    pub row: u32,
    pub division: String,
    pub codes: Vec<VariantId>,
}

impl VariantSource {
    pub fn resolve<H: AutomationHost>(
        &self,
        host: &H,
        source: DocumentId,
        layout: &TemplateLayout,
    ) -> Result<ResolvedVariants, BatchError> {
        match self {
            VariantSource::Lookup { division } => {
                let row = find_reference_row(host, source, layout, division)?;
                log::info!(
                    "division `{}` (row {}) has codes {:?}",
                    row.division,
                    row.row + 1,
                    row.codes.iter().map(VariantId::as_str).collect::<Vec<_>>()
                );
                Ok(row.codes.into_iter().collect())
            }
            VariantSource::Direct { variant_ids } => resolve_direct(variant_ids),
        }
    }
}

/// Keep the caller's order. Blank entries stay in place so they show up as skipped.
pub fn resolve_direct(raw_ids: &[String]) -> Result<ResolvedVariants, BatchError> {
    if raw_ids.is_empty() {
        return Err(BatchError::InvalidVariantList(
            "no variant ids were given".to_string(),
        ));
    }
    let entries = raw_ids
        .iter()
        .map(|raw| match VariantId::new(raw) {
            Some(id) => ResolvedEntry::Variant(id),
            None => {
                log::info!("skipping blank variant id {raw:?}");
                ResolvedEntry::Blank { raw: raw.clone() }
            }
        })
        .collect();
    Ok(ResolvedVariants { entries })
}

/// Scan the division column top to bottom and return the first row whose trimmed label equals
/// the trimmed `division`. Matching is exact otherwise.
pub fn find_reference_row<H: AutomationHost>(
    host: &H,
    source: DocumentId,
    layout: &TemplateLayout,
    division: &str,
) -> Result<ReferenceRow, BatchError> {
    let sheet = reference_sheet(host, source, layout)?;
    let wanted = division.trim();
    let Some(last_row) = host.last_used_row(source, &sheet, layout.division_column)? else {
        return Err(BatchError::DivisionNotFound(wanted.to_string()));
    };

    for row in 0..=last_row {
        let label = host.cell_value(source, &sheet, layout.division_column.cell(row))?;
        if label.is_blank() || label.display_text().trim() != wanted {
            continue;
        }

        let mut codes = Vec::with_capacity(layout.code_columns.len());
        for column in &layout.code_columns {
            let value = host.cell_value(source, &sheet, column.cell(row))?;
            if let Some(code) = VariantId::new(&value.display_text()) {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            return Err(BatchError::NoCodesForDivision(wanted.to_string()));
        }
        return Ok(ReferenceRow {
            row,
            division: wanted.to_string(),
            codes,
        });
    }

    Err(BatchError::DivisionNotFound(wanted.to_string()))
}

/// Every non-blank label in the division column, top to bottom (header included).
pub fn list_divisions<H: AutomationHost>(
    host: &H,
    source: DocumentId,
    layout: &TemplateLayout,
) -> Result<Vec<String>, BatchError> {
    let sheet = reference_sheet(host, source, layout)?;
    let Some(last_row) = host.last_used_row(source, &sheet, layout.division_column)? else {
        return Ok(Vec::new());
    };
    let mut labels = Vec::new();
    for row in 0..=last_row {
        let label = host.cell_value(source, &sheet, layout.division_column.cell(row))?;
        if !label.is_blank() {
            labels.push(label.display_text().trim().to_string());
        }
    }
    Ok(labels)
}

fn reference_sheet<H: AutomationHost>(
    host: &H,
    source: DocumentId,
    layout: &TemplateLayout,
) -> Result<String, BatchError> {
    host.sheet_names(source)?
        .into_iter()
        .find(|name| sheet_name_eq_case_insensitive(name, &layout.reference_sheet))
        .ok_or_else(|| BatchError::ReferenceSheetMissing(layout.reference_sheet.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn direct_lists_keep_order_and_blanks() {
        let resolved = resolve_direct(&raw(&["FSBC", "  ", " FSFM "])).unwrap();
        assert_eq!(resolved.ids(), vec!["FSBC", "FSFM"]);
        assert_eq!(resolved.len(), 3);
        assert_eq!(
            resolved.entries()[1],
            ResolvedEntry::Blank {
                raw: "  ".to_string()
            }
        );
    }

    #[test]
    fn direct_ids_skip_blank_and_whitespace_entries() {
        let resolved = resolve_direct(&raw(&["A", " ", "", "B"])).unwrap();
        assert_eq!(resolved.ids(), vec!["A", "B"]);
    }

    #[test]
    fn direct_lists_keep_duplicates() {
        let resolved = resolve_direct(&raw(&["F1", "F1"])).unwrap();
        assert_eq!(resolved.ids(), vec!["F1", "F1"]);
    }

    #[test]
    fn empty_lists_are_rejected() {
        assert!(matches!(
            resolve_direct(&[]),
            Err(BatchError::InvalidVariantList(_))
        ));
        let all_blank = resolve_direct(&raw(&["", " "])).unwrap();
        assert!(all_blank.ids().is_empty());
        assert_eq!(all_blank.len(), 2);
    }

    #[test]
    fn variant_sources_deserialize_by_mode() {
        let lookup: VariantSource =
            serde_json::from_str(r#"{ "mode": "lookup", "division": "APAC" }"#).unwrap();
        assert_eq!(
            lookup,
            VariantSource::Lookup {
                division: "APAC".to_string()
            }
        );
        let direct: VariantSource =
            serde_json::from_str(r#"{ "mode": "direct", "variantIds": ["F1"] }"#).unwrap();
        assert_eq!(
            direct,
            VariantSource::Direct {
                variant_ids: raw(&["F1"])
            }
        );
    }
}
