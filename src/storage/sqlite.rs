//! SQLite-backed store

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Store, StoreStats, UpsertOutcome};
use crate::address::Address;
use crate::coin::{Coin, RiskVerdict, SecurityCheck, TransactionAggregate, TransactionRecord};
use crate::error::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS coins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_address TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    creator_wallet TEXT NOT NULL,
    migration_time TEXT NOT NULL,
    initial_liquidity REAL NOT NULL,
    creator_fee REAL NOT NULL,
    holders INTEGER NOT NULL,
    is_verified INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_coins_creator ON coins (creator_wallet);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_address TEXT NOT NULL,
    tx_hash TEXT NOT NULL UNIQUE,
    direction TEXT NOT NULL,
    amount_eth REAL NOT NULL,
    gas_price REAL NOT NULL,
    block_number INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transactions_contract ON transactions (contract_address);

CREATE TABLE IF NOT EXISTS security_checks (
    contract_address TEXT PRIMARY KEY,
    rugcheck_score REAL,
    rugcheck_verdict TEXT NOT NULL,
    top_holder_percent REAL NOT NULL,
    is_bundled INTEGER NOT NULL,
    check_time TEXT NOT NULL
);
"#;

/// Store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database mutex poisoned".to_string()))
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_stored_address(raw: &str) -> Result<Address> {
    Address::parse(raw).map_err(|e| Error::Storage(format!("bad stored address: {}", e)))
}

/// Raw column values of a coin row
struct CoinRow {
    contract_address: String,
    name: String,
    symbol: String,
    creator: String,
    migration_time: String,
    initial_liquidity: f64,
    creator_fee: f64,
    holders: i64,
    is_verified: bool,
}

impl CoinRow {
    fn into_coin(self) -> Result<Coin> {
        Ok(Coin {
            contract_address: parse_stored_address(&self.contract_address)?,
            name: self.name,
            symbol: self.symbol,
            creator: parse_stored_address(&self.creator)?,
            migration_time: parse_time(&self.migration_time)?,
            initial_liquidity: self.initial_liquidity,
            creator_fee: self.creator_fee,
            holders: self.holders.max(0) as u64,
            is_verified: self.is_verified,
        })
    }
}

impl Store for SqliteStore {
    fn coin_exists(&self, contract: &Address) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM coins WHERE contract_address = ?1",
            params![contract.to_checksum()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn upsert_coin(&self, coin: &Coin) -> Result<UpsertOutcome> {
        let holders = sql_int(coin.holders, "holder count")?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let contract = coin.contract_address.to_checksum();
        let now = Utc::now().to_rfc3339();

        let existed: bool = tx
            .query_row(
                "SELECT 1 FROM coins WHERE contract_address = ?1",
                params![contract],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        // Creator and migration time are fixed at first insert
        tx.execute(
            "INSERT INTO coins (contract_address, name, symbol, creator_wallet, migration_time,
                                initial_liquidity, creator_fee, holders, is_verified, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(contract_address) DO UPDATE SET
                name = excluded.name,
                symbol = excluded.symbol,
                initial_liquidity = excluded.initial_liquidity,
                creator_fee = excluded.creator_fee,
                holders = excluded.holders,
                is_verified = excluded.is_verified,
                updated_at = excluded.updated_at",
            params![
                contract,
                coin.name,
                coin.symbol,
                coin.creator.to_checksum(),
                coin.migration_time.to_rfc3339(),
                coin.initial_liquidity,
                coin.creator_fee,
                holders,
                coin.is_verified,
                now,
            ],
        )?;
        tx.commit()?;

        let outcome = if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(contract = %contract, outcome = ?outcome, "Coin upserted");
        Ok(outcome)
    }

    fn get_coin(&self, contract: &Address) -> Result<Option<Coin>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT contract_address, name, symbol, creator_wallet, migration_time,
                        initial_liquidity, creator_fee, holders, is_verified
                 FROM coins WHERE contract_address = ?1",
                params![contract.to_checksum()],
                |row| {
                    Ok(CoinRow {
                        contract_address: row.get(0)?,
                        name: row.get(1)?,
                        symbol: row.get(2)?,
                        creator: row.get(3)?,
                        migration_time: row.get(4)?,
                        initial_liquidity: row.get(5)?,
                        creator_fee: row.get(6)?,
                        holders: row.get(7)?,
                        is_verified: row.get(8)?,
                    })
                },
            )
            .optional()?;

        row.map(CoinRow::into_coin).transpose()
    }

    fn count_coins_by_creator(&self, creator: &Address) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM coins WHERE creator_wallet = ?1",
            params![creator.to_checksum()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn upsert_security_check(&self, check: &SecurityCheck) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO security_checks (contract_address, rugcheck_score, rugcheck_verdict,
                                          top_holder_percent, is_bundled, check_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(contract_address) DO UPDATE SET
                rugcheck_score = excluded.rugcheck_score,
                rugcheck_verdict = excluded.rugcheck_verdict,
                top_holder_percent = excluded.top_holder_percent,
                is_bundled = excluded.is_bundled,
                check_time = excluded.check_time",
            params![
                check.contract_address.to_checksum(),
                check.risk_score,
                check.verdict.as_label(),
                check.top_holder_pct,
                check.is_bundled,
                check.checked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_security_check(&self, contract: &Address) -> Result<Option<SecurityCheck>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT rugcheck_score, rugcheck_verdict, top_holder_percent, is_bundled, check_time
                 FROM security_checks WHERE contract_address = ?1",
                params![contract.to_checksum()],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((risk_score, verdict, top_holder_pct, is_bundled, check_time)) => {
                Ok(Some(SecurityCheck {
                    contract_address: *contract,
                    risk_score,
                    verdict: RiskVerdict::from_label(&verdict),
                    top_holder_pct,
                    is_bundled,
                    checked_at: parse_time(&check_time)?,
                }))
            }
            None => Ok(None),
        }
    }

    fn insert_transactions(&self, records: &[TransactionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let block_numbers = records
            .iter()
            .map(|r| sql_int(r.block_number, "block number"))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO transactions (contract_address, tx_hash, direction,
                                                     amount_eth, gas_price, block_number, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (record, block_number) in records.iter().zip(block_numbers) {
                inserted += stmt.execute(params![
                    record.contract_address.to_checksum(),
                    record.tx_hash,
                    record.direction.as_str(),
                    record.amount_eth,
                    record.gas_price,
                    block_number,
                    record.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn aggregate_transactions(&self) -> Result<Vec<TransactionAggregate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT contract_address,
                    COUNT(*) AS tx_count,
                    COALESCE(SUM(amount_eth), 0.0) AS total_volume,
                    COALESCE(AVG(gas_price), 0.0) AS avg_gas
             FROM transactions
             GROUP BY contract_address
             ORDER BY contract_address",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut aggregates = Vec::new();
        for row in rows {
            let (contract, tx_count, total_volume, avg_gas) = row?;
            match Address::parse(&contract) {
                Ok(contract_address) => aggregates.push(TransactionAggregate {
                    contract_address,
                    tx_count: tx_count.max(0) as u64,
                    total_volume,
                    avg_gas,
                }),
                Err(e) => warn!(contract = %contract, error = %e, "Skipping unparsable transaction group"),
            }
        }

        Ok(aggregates)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n.max(0) as u64)
        };

        Ok(StoreStats {
            coins: count("coins")?,
            security_checks: count("security_checks")?,
            transactions: count("transactions")?,
        })
    }
}

/// SQLite integers are signed 64-bit
fn sql_int(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Storage(format!("{} {} out of range", what, value)))
}
