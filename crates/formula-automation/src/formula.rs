//! Formula subset evaluated by the in-memory host.
//!
//! Supported: cell references (`E6`, `Ref!B2`, `'My Sheet'!$A$1`), string literals, numbers,
//! booleans, and `&` concatenation. Anything else is reported as unsupported and the cell keeps
//! its cached value.

use crate::address::CellRef;
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Literal(CellValue),
    Reference { sheet: Option<String>, cell: CellRef },
}

pub(crate) fn parse_formula(text: &str) -> Option<Vec<Operand>> {
    let body = text.trim().strip_prefix('=')?;
    split_concat(body)?
        .into_iter()
        .map(|part| parse_operand(part.trim()))
        .collect()
}

/// Evaluate parsed operands, resolving references through `lookup`.
///
/// Returns `None` if any reference cannot be resolved.
pub(crate) fn evaluate(
    operands: &[Operand],
    mut lookup: impl FnMut(Option<&str>, CellRef) -> Option<CellValue>,
) -> Option<CellValue> {
    let mut values = Vec::with_capacity(operands.len());
    for operand in operands {
        let value = match operand {
            Operand::Literal(v) => v.clone(),
            Operand::Reference { sheet, cell } => lookup(sheet.as_deref(), *cell)?,
        };
        values.push(value);
    }

    if values.len() == 1 {
        return values.pop();
    }
    Some(CellValue::Text(
        values.iter().map(CellValue::display_text).collect(),
    ))
}

fn split_concat(body: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut in_string = false;
    let mut in_sheet_quote = false;
    let mut start = 0;
    for (idx, ch) in body.char_indices() {
        match ch {
            '"' if !in_sheet_quote => in_string = !in_string,
            '\'' if !in_string => in_sheet_quote = !in_sheet_quote,
            '&' if !in_string && !in_sheet_quote => {
                parts.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if in_string || in_sheet_quote {
        return None;
    }
    parts.push(&body[start..]);
    Some(parts)
}

fn parse_operand(token: &str) -> Option<Operand> {
    if token.is_empty() {
        return None;
    }

    if let Some(inner) = token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Some(Operand::Literal(CellValue::Text(inner.replace("\"\"", "\""))));
    }
    if token.eq_ignore_ascii_case("TRUE") {
        return Some(Operand::Literal(CellValue::Bool(true)));
    }
    if token.eq_ignore_ascii_case("FALSE") {
        return Some(Operand::Literal(CellValue::Bool(false)));
    }
    if let Ok(n) = token.parse::<f64>() {
        return Some(Operand::Literal(CellValue::Number(n)));
    }

    match token.rsplit_once('!') {
        Some((sheet, cell)) => {
            let sheet = match sheet
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
            {
                Some(quoted) => quoted.replace("''", "'"),
                None => sheet.to_string(),
            };
            if sheet.is_empty() {
                return None;
            }
            Some(Operand::Reference {
                sheet: Some(sheet),
                cell: CellRef::from_a1(cell).ok()?,
            })
        }
        None => Some(Operand::Reference {
            sheet: None,
            cell: CellRef::from_a1(token).ok()?,
        }),
    }
}
