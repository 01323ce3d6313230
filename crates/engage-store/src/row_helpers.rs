//! Column decoding helpers that report the failing table and column.

use crate::errors::StoreError;

/// Get a required column value from a row, returning `CorruptRow` on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Read a text column and parse it into an enum.
pub fn get_enum<T: std::str::FromStr>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    let raw: String = get(row, idx, table, column)?;
    parse_enum(&raw, table, column)
}

/// Parse a string into an enum, returning `CorruptRow` on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Build `?N, ?N+1, ...` placeholders for an `IN (...)` list.
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::TrackingType;
    use rusqlite::Connection;

    #[test]
    fn parse_enum_reports_column() {
        let err = parse_enum::<TrackingType>("sideways", "containers", "tracking_type").unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptRow { table: "containers", column: "tracking_type", .. }
        ));
    }

    #[test]
    fn get_enum_reads_text_column() {
        let conn = Connection::open_in_memory().unwrap();
        let parsed: TrackingType = conn
            .query_row("SELECT 'forced'", [], |row| {
                Ok(get_enum::<TrackingType>(row, 0, "t", "c"))
            })
            .unwrap()
            .unwrap();
        assert_eq!(parsed, TrackingType::Forced);
    }

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 0), "");
    }
}
