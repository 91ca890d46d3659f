use chrono::Utc;
use log::info;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{from_millis, lock, open_connection, to_millis};
use crate::error::{GateError, GateResult};
use crate::model::{NewVehicle, VehicleRecord};
use crate::plate::normalize;

/// Authorization registry: registered vehicles keyed by canonical plate.
pub struct VehicleDB {
    conn: Mutex<Connection>,
}

const VEHICLE_COLUMNS: &str =
    "id, license_plate, vehicle_type, color, owner_name, authorized, registered_at";

impl VehicleDB {
    /// Create/connect the registry database
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
        // UNIQUE on the plate is the guard for concurrent registrations
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vehicles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                license_plate TEXT NOT NULL UNIQUE,
                vehicle_type TEXT NOT NULL,
                color TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                authorized INTEGER NOT NULL DEFAULT 0,
                registered_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn row_to_vehicle(row: &Row<'_>) -> rusqlite::Result<VehicleRecord> {
        Ok(VehicleRecord {
            id: row.get(0)?,
            license_plate: row.get(1)?,
            vehicle_type: row.get(2)?,
            color: row.get(3)?,
            owner_name: row.get(4)?,
            authorized: row.get(5)?,
            registered_at: from_millis(row.get(6)?)?,
        })
    }

    /// Look up a canonical plate.
    pub fn lookup(&self, plate: &str) -> GateResult<Option<VehicleRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM vehicles WHERE license_plate = ?1",
            VEHICLE_COLUMNS
        ))?;
        let vehicle = stmt
            .query_row([plate], Self::row_to_vehicle)
            .optional()?;
        Ok(vehicle)
    }

    /// Register a vehicle. Registration implies authorization.
    ///
    /// Fails with `Conflict` when the normalized plate already exists; the
    /// existing record is left untouched.
    pub fn register(&self, vehicle: NewVehicle) -> GateResult<VehicleRecord> {
        let plate = normalize(&vehicle.license_plate);
        if plate.is_empty() {
            return Err(GateError::Validation(
                "license plate must contain letters or digits".to_string(),
            ));
        }
        let vehicle_type = vehicle.vehicle_type.trim().to_string();
        if vehicle_type.is_empty() {
            return Err(GateError::Validation("vehicle type is required".to_string()));
        }

        let registered_at = Utc::now();
        let conn = lock(&self.conn)?;
        let inserted = conn.execute(
            "INSERT INTO vehicles
             (license_plate, vehicle_type, color, owner_name, authorized, registered_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                plate,
                vehicle_type,
                vehicle.color,
                vehicle.owner_name,
                to_millis(registered_at)
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                info!("registration conflict for plate {}", plate);
                return Err(GateError::Conflict(format!(
                    "vehicle {} already registered",
                    plate
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let record = VehicleRecord {
            id: conn.last_insert_rowid(),
            license_plate: plate,
            vehicle_type,
            color: vehicle.color,
            owner_name: vehicle.owner_name,
            authorized: true,
            registered_at: from_millis(to_millis(registered_at))?,
        };
        info!("registered vehicle {} ({})", record.license_plate, record.vehicle_type);
        Ok(record)
    }

    pub fn list_authorized(&self) -> GateResult<Vec<VehicleRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM vehicles WHERE authorized = 1 ORDER BY id",
            VEHICLE_COLUMNS
        ))?;
        let vehicles = stmt
            .query_map([], Self::row_to_vehicle)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(vehicles)
    }

    pub fn count_authorized(&self) -> GateResult<u64> {
        let conn = lock(&self.conn)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM vehicles WHERE authorized = 1", [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    /// Authorized vehicles per type.
    pub fn type_distribution(&self) -> GateResult<BTreeMap<String, u64>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT vehicle_type, COUNT(*) FROM vehicles
             WHERE authorized = 1 GROUP BY vehicle_type",
        )?;
        let mut distribution = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (vehicle_type, count) = row?;
            distribution.insert(vehicle_type, count as u64);
        }
        Ok(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(plate: &str) -> NewVehicle {
        NewVehicle {
            license_plate: plate.to_string(),
            vehicle_type: "Car".to_string(),
            color: "Blue".to_string(),
            owner_name: "Ana".to_string(),
        }
    }

    #[test]
    fn register_normalizes_and_authorizes() {
        let db = VehicleDB::open_in_memory().unwrap();
        let record = db.register(car("ab-12 cd3")).unwrap();
        assert_eq!(record.license_plate, "AB12CD3");
        assert!(record.authorized);

        let found = db.lookup("AB12CD3").unwrap().unwrap();
        assert_eq!(found, record);
        assert!(db.lookup("ab-12 cd3").unwrap().is_none());
    }

    #[test]
    fn duplicate_registration_is_a_conflict() {
        let db = VehicleDB::open_in_memory().unwrap();
        let first = db.register(car("AB12CD3")).unwrap();

        let mut second = car("ab 12 cd3");
        second.owner_name = "Someone Else".to_string();
        assert!(matches!(db.register(second), Err(GateError::Conflict(_))));

        let vehicles = db.list_authorized().unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0], first);
    }

    #[test]
    fn concurrent_registration_yields_one_record() {
        let db = VehicleDB::open_in_memory().unwrap();
        let results: Vec<GateResult<VehicleRecord>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let db = &db;
                    s.spawn(move || {
                        let plate = if i % 2 == 0 { "zz 999 zz" } else { "ZZ-999-ZZ" };
                        db.register(car(plate))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(GateError::Conflict(_))))
            .count();
        assert_eq!((ok, conflicts), (1, 7));
        assert_eq!(db.count_authorized().unwrap(), 1);
    }

    #[test]
    fn empty_plate_or_type_is_rejected() {
        let db = VehicleDB::open_in_memory().unwrap();
        assert!(matches!(db.register(car(" - ")), Err(GateError::Validation(_))));

        let mut no_type = car("AB1");
        no_type.vehicle_type = "  ".to_string();
        assert!(matches!(db.register(no_type), Err(GateError::Validation(_))));
        assert_eq!(db.count_authorized().unwrap(), 0);
    }

    #[test]
    fn type_distribution_groups_authorized_vehicles() {
        let db = VehicleDB::open_in_memory().unwrap();
        db.register(car("A1")).unwrap();
        db.register(car("A2")).unwrap();
        let mut bus = car("B1");
        bus.vehicle_type = "Bus".to_string();
        db.register(bus).unwrap();

        let dist = db.type_distribution().unwrap();
        assert_eq!(dist.get("Car"), Some(&2));
        assert_eq!(dist.get("Bus"), Some(&1));
    }
}
