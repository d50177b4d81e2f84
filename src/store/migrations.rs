use rusqlite::{Connection, Transaction};

use crate::error::RiskError;

pub const CURRENT_SCHEMA_VERSION: i32 = 2;

pub fn schema_version(conn: &Connection) -> Result<i32, RiskError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

pub fn run_migrations(conn: &mut Connection) -> Result<(), RiskError> {
    let mut version = schema_version(conn)?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(RiskError::StoreUnavailable(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)?;
        log::info!("migrated risk store to schema v{next_version}");
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}

/// Apply a single migration; exposed so tests can build legacy databases
pub fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), RiskError> {
    match version {
        1 => tx.execute_batch(include_str!("schemas/schema_v1.sql"))?,
        2 => tx.execute_batch(include_str!("schemas/schema_v2.sql"))?,
        other => {
            return Err(RiskError::StoreUnavailable(format!(
                "no migration defined for version {other}"
            )))
        }
    }
    Ok(())
}
