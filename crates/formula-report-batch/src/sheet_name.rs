use formula_automation::{EXCEL_MAX_SHEET_NAME_LEN, FORBIDDEN_SHEET_NAME_CHARS};

/// Base used when the naming cell is empty.
pub const FALLBACK_SHEET_LABEL: &str = "Report";

/// Build the output sheet name for a variant: `{label}_{variant}`.
///
/// Forbidden characters in either part become `_`. The label is truncated so the whole name fits
/// in 31 characters; the `_{variant}` suffix is kept intact unless it alone is too long, in which
/// case the name is the first 31 characters of the suffix.
///
/// Lengths are counted in `char`s.
pub fn sanitize_sheet_name(raw_label: Option<&str>, variant_id: &str) -> String {
    let base = match raw_label {
        Some(label) if !label.is_empty() => replace_forbidden(label),
        _ => FALLBACK_SHEET_LABEL.to_string(),
    };
    let suffix = format!("_{}", replace_forbidden(variant_id));
    let suffix_len = suffix.chars().count();

    let mut name: String = if suffix_len >= EXCEL_MAX_SHEET_NAME_LEN {
        String::new()
    } else {
        base.chars()
            .take(EXCEL_MAX_SHEET_NAME_LEN - suffix_len)
            .collect()
    };
    name.push_str(&suffix);
    name.chars().take(EXCEL_MAX_SHEET_NAME_LEN).collect()
}

fn replace_forbidden(text: &str) -> String {
    text.chars()
        .map(|c| {
            if FORBIDDEN_SHEET_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn joins_label_and_variant() {
        assert_eq!(sanitize_sheet_name(Some("Revenue"), "F1"), "Revenue_F1");
    }

    #[test]
    fn replaces_forbidden_characters() {
        assert_eq!(
            sanitize_sheet_name(Some("Q1/Q2 [draft]: a*b?"), "F1"),
            "Q1_Q2 _draft__ a_b__F1"
        );
        assert_eq!(sanitize_sheet_name(Some("Rev"), "A/B"), "Rev_A_B");
    }

    #[test]
    fn falls_back_when_label_is_missing_or_empty() {
        assert_eq!(sanitize_sheet_name(None, "F1"), "Report_F1");
        assert_eq!(sanitize_sheet_name(Some(""), "F1"), "Report_F1");
    }

    #[test]
    fn truncates_the_label_but_keeps_the_suffix() {
        let label = "A".repeat(50);
        let name = sanitize_sheet_name(Some(&label), "X1");
        assert_eq!(name, format!("{}_X1", "A".repeat(28)));
        assert_eq!(name.chars().count(), 31);
    }

    #[test]
    fn oversized_variant_ids_keep_the_head_of_the_suffix() {
        let variant = "V".repeat(40);
        let name = sanitize_sheet_name(Some("Revenue"), &variant);
        assert_eq!(name, format!("_{}", "V".repeat(30)));

        let variant = "V".repeat(30);
        assert_eq!(
            sanitize_sheet_name(Some("Revenue"), &variant),
            format!("_{variant}")
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let label = "é".repeat(40);
        let name = sanitize_sheet_name(Some(&label), "F1");
        assert_eq!(name.chars().count(), 31);
        assert!(name.ends_with("_F1"));
    }

    proptest! {
        #[test]
        fn names_are_always_valid(label in proptest::option::of(".{0,64}"), variant in "[^\\s]{1,40}") {
            let name = sanitize_sheet_name(label.as_deref(), &variant);
            prop_assert!(name.chars().count() <= EXCEL_MAX_SHEET_NAME_LEN);
            prop_assert!(!name.is_empty());
            prop_assert!(!name.chars().any(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(&c)));
        }

        #[test]
        fn sanitizing_is_deterministic(label in ".{0,64}", variant in "[^\\s]{1,40}") {
            prop_assert_eq!(
                sanitize_sheet_name(Some(&label), &variant),
                sanitize_sheet_name(Some(&label), &variant)
            );
        }

        #[test]
        fn short_suffixes_survive_intact(label in ".{0,64}", variant in "[A-Z0-9]{1,29}") {
            let name = sanitize_sheet_name(Some(&label), &variant);
            let suffix = format!("_{variant}");
            prop_assert!(name.ends_with(&suffix));
        }
    }
}
