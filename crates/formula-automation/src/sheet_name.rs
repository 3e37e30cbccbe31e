use unicode_normalization::UnicodeNormalization as _;

/// Maximum sheet name length accepted by Excel, in characters.
pub const EXCEL_MAX_SHEET_NAME_LEN: usize = 31;

/// Characters Excel rejects anywhere in a sheet name.
pub const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = ['\\', '/', '?', '*', '[', ']', ':'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetNameError {
    #[error("sheet name cannot be blank")]
    Empty,
    #[error("sheet name cannot exceed 31 characters")]
    TooLong,
    #[error("sheet name contains invalid character `{0}`")]
    InvalidCharacter(char),
    #[error("sheet name cannot begin or end with an apostrophe")]
    LeadingOrTrailingApostrophe,
}

/// Validate a sheet name against Excel's naming rules.
pub fn validate_sheet_name(name: &str) -> Result<(), SheetNameError> {
    if name.trim().is_empty() {
        return Err(SheetNameError::Empty);
    }
    if name.chars().count() > EXCEL_MAX_SHEET_NAME_LEN {
        return Err(SheetNameError::TooLong);
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(c)) {
        return Err(SheetNameError::InvalidCharacter(ch));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::LeadingOrTrailingApostrophe);
    }
    Ok(())
}

/// Excel compares sheet names case-insensitively across Unicode.
///
/// Approximated by NFKC normalization followed by Unicode uppercasing.
pub fn sheet_name_eq_case_insensitive(a: &str, b: &str) -> bool {
    a.nfkc()
        .flat_map(|c| c.to_uppercase())
        .eq(b.nfkc().flat_map(|c| c.to_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_excel_rules() {
        assert_eq!(validate_sheet_name("Revenue_F1"), Ok(()));
        assert_eq!(validate_sheet_name("  "), Err(SheetNameError::Empty));
        assert_eq!(
            validate_sheet_name(&"x".repeat(32)),
            Err(SheetNameError::TooLong)
        );
        assert_eq!(
            validate_sheet_name("a/b"),
            Err(SheetNameError::InvalidCharacter('/'))
        );
        assert_eq!(
            validate_sheet_name("'quoted"),
            Err(SheetNameError::LeadingOrTrailingApostrophe)
        );
    }

    #[test]
    fn compares_case_insensitively() {
        assert!(sheet_name_eq_case_insensitive("Sheet1", "sHeEt1"));
        assert!(sheet_name_eq_case_insensitive("straße", "STRASSE"));
        assert!(!sheet_name_eq_case_insensitive("Sheet1", "Sheet2"));
    }
}
