//! Call log data access object

use super::models::CallRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// Data access object for call records, keyed by call number.
#[derive(Clone)]
pub struct CallLog {
    conn: Arc<Mutex<Connection>>,
}

impl CallLog {
    /// Create a new CallLog over a shared connection
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert or replace the record at its call number.
    ///
    /// Replace semantics matter: a diverged position is re-executed and
    /// must overwrite the old record, not duplicate it.
    pub fn record(&self, record: &CallRecord) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO tracked_calls (call_number, function_name, args, result, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.call_number as i64,
                record.function_name,
                record.args,
                record.result,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the record at an exact call number
    pub fn get(&self, call_number: u64) -> SqliteResult<Option<CallRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT call_number, function_name, args, result, recorded_at
             FROM tracked_calls WHERE call_number = ?1",
        )?;

        let mut rows = stmt.query(params![call_number as i64])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_record(row)?))
        } else {
            Ok(None)
        }
    }

    /// All stored call numbers, ascending
    pub fn call_numbers(&self) -> SqliteResult<Vec<u64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT call_number FROM tracked_calls ORDER BY call_number")?;

        let numbers = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .map(|n| n as u64)
            .collect();

        Ok(numbers)
    }

    /// Delete every record with a call number at or past the cut point
    pub fn truncate_from(&self, call_number: u64) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM tracked_calls WHERE call_number >= ?1",
            params![call_number as i64],
        )?;
        Ok(())
    }

    /// Convert a database row to a CallRecord
    fn row_to_record(row: &rusqlite::Row) -> SqliteResult<CallRecord> {
        let call_number: i64 = row.get(0)?;
        let recorded_at_str: String = row.get(4)?;

        Ok(CallRecord {
            call_number: call_number as u64,
            function_name: row.get(1)?,
            args: row.get(2)?,
            result: row.get(3)?,
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    fn setup() -> CallLog {
        let db = Database::open_in_memory().unwrap();
        CallLog::new(db.connection())
    }

    fn sample(call_number: u64) -> CallRecord {
        CallRecord::new(
            call_number,
            "step",
            format!("[{call_number}]"),
            format!("{}", call_number * 2),
        )
    }

    #[test]
    fn test_record_and_get() {
        let log = setup();
        log.record(&sample(0)).unwrap();

        let record = log.get(0).unwrap().unwrap();
        assert_eq!(record.function_name, "step");
        assert_eq!(record.args, "[0]");
        assert_eq!(record.result, "0");

        assert!(log.get(1).unwrap().is_none());
    }

    #[test]
    fn test_record_replaces_at_same_position() {
        let log = setup();
        log.record(&sample(0)).unwrap();

        let replacement = CallRecord::new(0, "other", "[9]".to_string(), "18".to_string());
        log.record(&replacement).unwrap();

        let record = log.get(0).unwrap().unwrap();
        assert_eq!(record.function_name, "other");
        assert_eq!(record.result, "18");
        assert_eq!(log.call_numbers().unwrap(), vec![0]);
    }

    #[test]
    fn test_call_numbers_ascending() {
        let log = setup();
        for n in [2u64, 0, 1] {
            log.record(&sample(n)).unwrap();
        }
        assert_eq!(log.call_numbers().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_truncate_from() {
        let log = setup();
        for n in 0..4 {
            log.record(&sample(n)).unwrap();
        }

        log.truncate_from(2).unwrap();
        assert_eq!(log.call_numbers().unwrap(), vec![0, 1]);
        assert!(log.get(2).unwrap().is_none());
        assert!(log.get(3).unwrap().is_none());
    }

    #[test]
    fn test_truncate_from_zero_clears_everything() {
        let log = setup();
        for n in 0..3 {
            log.record(&sample(n)).unwrap();
        }

        log.truncate_from(0).unwrap();
        assert!(log.call_numbers().unwrap().is_empty());
    }
}
