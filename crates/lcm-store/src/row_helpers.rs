//! Column decoding helpers that map failures to `LedgerError::CorruptRow`.

use crate::errors::{LedgerError, Result};

/// Get a required column value from a row, returning `CorruptRow` on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T> {
    row.get(idx).map_err(|e| LedgerError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning `CorruptRow` on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T> {
    raw.parse().map_err(|_| LedgerError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Parse a JSON array of strings. An empty column reads as an empty list.
pub fn parse_string_list(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| LedgerError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcm_core::SummaryKind;

    #[test]
    fn parse_enum_success() {
        let kind: SummaryKind = parse_enum("condensed", "summaries", "kind").unwrap();
        assert_eq!(kind, SummaryKind::Condensed);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<SummaryKind> = parse_enum("INVALID", "summaries", "kind");
        assert!(matches!(
            result,
            Err(LedgerError::CorruptRow { table: "summaries", column: "kind", .. })
        ));
    }

    #[test]
    fn parse_string_list_variants() {
        assert!(parse_string_list("", "summaries", "file_ids").unwrap().is_empty());
        assert_eq!(
            parse_string_list(r#"["file_a","file_b"]"#, "summaries", "file_ids").unwrap(),
            ["file_a", "file_b"]
        );
        assert!(matches!(
            parse_string_list("{", "summaries", "file_ids"),
            Err(LedgerError::CorruptRow { column: "file_ids", .. })
        ));
    }
}
