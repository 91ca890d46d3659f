use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::Mutex;

use super::{from_millis, lock, open_connection, to_millis};
use crate::error::GateResult;
use crate::model::{Direction, DirectionCounts, GateLogEntry, NewGateLogEntry};

/// Append-only movement log. This type exposes no update or delete.
pub struct GateLogDB {
    conn: Mutex<Connection>,
}

const LOG_COLUMNS: &str = "id, license_plate, vehicle_type, driver_name, direction, timestamp, \
                           is_authorized, image_path, vehicle_id";

impl GateLogDB {
    pub fn open(db_path: &str) -> GateResult<Self> {
        let conn = open_connection(db_path)?;
        Self::create_tables(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> GateResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS gate_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                license_plate TEXT NOT NULL,
                vehicle_type TEXT NOT NULL,
                driver_name TEXT NOT NULL,
                direction TEXT NOT NULL CHECK (direction IN ('inbound', 'outbound')),
                timestamp INTEGER NOT NULL,
                is_authorized INTEGER NOT NULL,
                image_path TEXT NOT NULL,
                vehicle_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_gate_logs_direction_ts ON gate_logs(direction, timestamp);
            CREATE INDEX IF NOT EXISTS idx_gate_logs_ts ON gate_logs(timestamp);",
        )
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<GateLogEntry> {
        Ok(GateLogEntry {
            id: row.get(0)?,
            license_plate: row.get(1)?,
            vehicle_type: row.get(2)?,
            driver_name: row.get(3)?,
            direction: row.get(4)?,
            timestamp: from_millis(row.get(5)?)?,
            authorized: row.get(6)?,
            image_path: row.get(7)?,
            vehicle_id: row.get(8)?,
        })
    }

    /// Append one crossing and return it with its assigned id.
    pub fn append(&self, entry: NewGateLogEntry) -> GateResult<GateLogEntry> {
        let millis = to_millis(entry.timestamp);
        let id = {
            let conn = lock(&self.conn)?;
            conn.execute(
                "INSERT INTO gate_logs
                 (license_plate, vehicle_type, driver_name, direction, timestamp,
                  is_authorized, image_path, vehicle_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.license_plate,
                    entry.vehicle_type,
                    entry.driver_name,
                    entry.direction,
                    millis,
                    entry.authorized,
                    entry.image_path,
                    entry.vehicle_id
                ],
            )?;
            conn.last_insert_rowid()
        };

        Ok(GateLogEntry {
            id,
            license_plate: entry.license_plate,
            vehicle_type: entry.vehicle_type,
            driver_name: entry.driver_name,
            direction: entry.direction,
            timestamp: from_millis(millis)?,
            authorized: entry.authorized,
            image_path: entry.image_path,
            vehicle_id: entry.vehicle_id,
        })
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> GateResult<Vec<GateLogEntry>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM gate_logs ORDER BY timestamp DESC, id DESC LIMIT ?1",
            LOG_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count_by_direction(&self) -> GateResult<DirectionCounts> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare_cached("SELECT direction, COUNT(*) FROM gate_logs GROUP BY direction")?;
        let mut counts = DirectionCounts::default();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, Direction>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            match row? {
                (Direction::Inbound, n) => counts.inbound = n as u64,
                (Direction::Outbound, n) => counts.outbound = n as u64,
            }
        }
        Ok(counts)
    }

    /// `(authorized, unauthorized)` entry counts.
    pub fn count_by_authorization(&self) -> GateResult<(u64, u64)> {
        let conn = lock(&self.conn)?;
        let (authorized, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(is_authorized), 0), COUNT(*) FROM gate_logs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((authorized as u64, (total - authorized) as u64))
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> GateResult<u64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM gate_logs WHERE timestamp >= ?1",
            [to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// `(direction, timestamp)` of every entry in `[start, end)`, oldest first.
    pub fn movements_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GateResult<Vec<(Direction, DateTime<Utc>)>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT direction, timestamp FROM gate_logs
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY timestamp",
        )?;
        let rows: Vec<(Direction, DateTime<Utc>)> = stmt
            .query_map([to_millis(start), to_millis(end)], |row| {
                Ok((row.get(0)?, from_millis(row.get(1)?)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `(direction, timestamp)` of every entry, oldest first.
    pub fn all_movements(&self) -> GateResult<Vec<(Direction, DateTime<Utc>)>> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare_cached("SELECT direction, timestamp FROM gate_logs ORDER BY timestamp")?;
        let rows: Vec<(Direction, DateTime<Utc>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, from_millis(row.get(1)?)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
