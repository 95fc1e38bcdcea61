//! SQLite-backed contract and reference storage.
//!
//! Rows are exposed as documents with the same field names the in-memory
//! store uses, so the aggregation engine can read either.

use crate::reference;
use procure_core::config::CollectionsConfig;
use procure_core::{
    fields, ContractId, ContractRecord, ContractSink, CpvDivision, Document, DocumentSource,
    Error, EuFunds, IsoCountry, Result, Value,
};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER NOT NULL,
    country_code TEXT,
    cpv_code TEXT,
    value_euro REAL,
    award_value_euro REAL,
    number_offers INTEGER,
    eu_funded TEXT,
    dispatch_date TEXT,
    award_date TEXT,
    awarding_entity_name TEXT,
    awarding_entity_address TEXT,
    awarding_entity_town TEXT,
    winning_entity_name TEXT
);
CREATE INDEX IF NOT EXISTS idx_contracts_year_country ON contracts (year, country_code);
CREATE TABLE IF NOT EXISTS cpv_divisions (
    cpv_division TEXT NOT NULL,
    cpv_division_description TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS iso_codes (
    alpha2 TEXT NOT NULL,
    name TEXT NOT NULL
);
";

const CONTRACT_COLUMNS: &str = "year, country_code, cpv_code, value_euro, award_value_euro, \
     number_offers, eu_funded, dispatch_date, award_date, awarding_entity_name, \
     awarding_entity_address, awarding_entity_town, winning_entity_name";

fn db_err(err: rusqlite::Error) -> Error {
    Error::data_access(err.to_string())
}

/// Contract store backed by a SQLite database.
pub struct SqliteStore {
    conn: Connection,
    names: CollectionsConfig,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, names: CollectionsConfig) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db_err)?;
        info!(path = %path.display(), "opened contract database");
        Self::with_connection(conn, names)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(names: CollectionsConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn, names)
    }

    fn with_connection(conn: Connection, names: CollectionsConfig) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn, names })
    }

    /// Load the static reference tables if they are empty.
    pub fn seed_reference_data(&mut self) -> Result<()> {
        if self.table_len("cpv_divisions")? == 0 {
            self.insert_cpv_divisions(&reference::cpv_divisions())?;
        }
        if self.table_len("iso_codes")? == 0 {
            self.insert_iso_countries(&reference::iso_countries())?;
        }
        Ok(())
    }

    /// Append CPV division rows.
    pub fn insert_cpv_divisions(&mut self, divisions: &[CpvDivision]) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO cpv_divisions (cpv_division, cpv_division_description) VALUES (?1, ?2)")
                .map_err(db_err)?;
            for division in divisions {
                stmt.execute(params![division.cpv_division, division.cpv_division_description])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Append ISO country rows.
    pub fn insert_iso_countries(&mut self, countries: &[IsoCountry]) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO iso_codes (alpha2, name) VALUES (?1, ?2)")
                .map_err(db_err)?;
            for country in countries {
                stmt.execute(params![country.alpha2, country.name]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Number of stored contracts.
    pub fn contract_count(&self) -> Result<u64> {
        self.table_len("contracts")
    }

    fn table_len(&self, table: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn contract_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, {CONTRACT_COLUMNS} FROM contracts ORDER BY id"))
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let eu_funded: Option<String> = row.get(7)?;
                let record = ContractRecord {
                    year: row.get(1)?,
                    country_code: row.get(2)?,
                    cpv_code: row.get(3)?,
                    value_euro: row.get(4)?,
                    award_value_euro: row.get(5)?,
                    number_offers: row.get(6)?,
                    eu_funded: eu_funded.as_deref().and_then(EuFunds::from_flag),
                    dispatch_date: row.get(8)?,
                    award_date: row.get(9)?,
                    awarding_entity_name: row.get(10)?,
                    awarding_entity_address: row.get(11)?,
                    awarding_entity_town: row.get(12)?,
                    winning_entity_name: row.get(13)?,
                };
                Ok((id, record))
            })
            .map_err(db_err)?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, record) = row.map_err(db_err)?;
            let mut doc = record.to_document();
            doc.insert(fields::ID.to_string(), Value::from(id));
            docs.push(doc);
        }
        Ok(docs)
    }

    fn cpv_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cpv_division, cpv_division_description FROM cpv_divisions ORDER BY rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok(CpvDivision::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;

        let docs = rows
            .map(|row| row.map(|d| d.to_document()).map_err(db_err))
            .collect::<Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn iso_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT alpha2, name FROM iso_codes ORDER BY rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok(IsoCountry::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;

        let docs = rows
            .map(|row| row.map(|c| c.to_document()).map_err(db_err))
            .collect::<Result<Vec<_>>>()?;
        Ok(docs)
    }
}

impl DocumentSource for SqliteStore {
    fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        let docs = if collection == self.names.contracts {
            self.contract_documents()?
        } else if collection == self.names.cpv {
            self.cpv_documents()?
        } else if collection == self.names.iso_codes {
            self.iso_documents()?
        } else {
            return Err(Error::data_access(format!("unknown collection '{collection}'")));
        };
        debug!(collection, count = docs.len(), "scanned collection");
        Ok(docs)
    }
}

impl ContractSink for SqliteStore {
    fn insert_many(&mut self, records: Vec<ContractRecord>) -> Result<Vec<ContractId>> {
        let mut ids = Vec::with_capacity(records.len());
        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO contracts ({CONTRACT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ))
                .map_err(db_err)?;

            for r in &records {
                let rowid = stmt
                    .insert(params![
                        r.year,
                        r.country_code,
                        r.cpv_code,
                        r.value_euro,
                        r.award_value_euro,
                        r.number_offers,
                        r.eu_funded.map(EuFunds::as_str),
                        r.dispatch_date,
                        r.award_date,
                        r.awarding_entity_name,
                        r.awarding_entity_address,
                        r.awarding_entity_town,
                        r.winning_entity_name,
                    ])
                    .map_err(db_err)?;
                ids.push(ContractId(rowid as u64));
            }
        }
        tx.commit().map_err(db_err)?;

        debug!(count = ids.len(), "inserted contracts");
        Ok(ids)
    }
}
