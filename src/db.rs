// 🗄️ Data Source - SQLite schema, fixture seeding and the two load strategies
//
// Table and column names (Match, Trade, Clearance, Adjustment, Trade_Id,
// Clearance_Id) are the external schema contract. Amounts are stored as
// decimal TEXT so they survive the round trip exactly.
//
// Load strategies:
// - joined:    one multi-table join, rows streamed into the flattener
// - per table: one SELECT per table, stitched together by foreign key

use crate::entities::{Adjustment, Clearance, Match, Trade};
use crate::flatten::JoinShape;
use crate::row::{AdjustmentSnapshot, MatchSnapshot, RawJoinRow, SubAggregateSnapshot};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Trade (
            Id INTEGER PRIMARY KEY,
            Amount TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Clearance (
            Id INTEGER PRIMARY KEY,
            Amount TEXT NOT NULL
        )",
        [],
    )?;

    // MATCH is an SQLite keyword, so the table name is always quoted
    conn.execute(
        r#"CREATE TABLE IF NOT EXISTS "Match" (
            Id INTEGER PRIMARY KEY,
            Trade_Id INTEGER NOT NULL REFERENCES Trade(Id),
            Clearance_Id INTEGER NOT NULL REFERENCES Clearance(Id)
        )"#,
        [],
    )?;

    // An adjustment belongs to exactly one trade or one clearance
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Adjustment (
            Id INTEGER PRIMARY KEY,
            Amount TEXT NOT NULL,
            Trade_Id INTEGER REFERENCES Trade(Id),
            Clearance_Id INTEGER REFERENCES Clearance(Id),
            CHECK ((Trade_Id IS NULL) <> (Clearance_Id IS NULL))
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_adjustment_trade ON Adjustment(Trade_Id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_adjustment_clearance ON Adjustment(Clearance_Id)",
        [],
    )?;

    Ok(())
}

/// Row counts of the four fixture tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub matches: i64,
    pub trades: i64,
    pub clearances: i64,
    pub adjustments: i64,
}

pub fn count_rows(conn: &Connection) -> Result<TableCounts> {
    let count = |table: &str| -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n)
    };

    Ok(TableCounts {
        matches: count(r#""Match""#)?,
        trades: count("Trade")?,
        clearances: count("Clearance")?,
        adjustments: count("Adjustment")?,
    })
}

/// Delete every fixture row (children first)
pub fn clear_database(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM Adjustment", [])?;
    conn.execute(r#"DELETE FROM "Match""#, [])?;
    conn.execute("DELETE FROM Trade", [])?;
    conn.execute("DELETE FROM Clearance", [])?;
    Ok(())
}

// ============================================================================
// SEEDING
// ============================================================================

/// Insert `matches` with their trades, clearances and adjustments in a single
/// transaction. Returns what was written.
pub fn seed_database(conn: &mut Connection, matches: &[Match]) -> Result<TableCounts> {
    let tx = conn.transaction().context("Failed to open seed transaction")?;
    let mut written = TableCounts::default();

    {
        let mut insert_trade = tx.prepare("INSERT INTO Trade (Id, Amount) VALUES (?1, ?2)")?;
        let mut insert_clearance =
            tx.prepare("INSERT INTO Clearance (Id, Amount) VALUES (?1, ?2)")?;
        let mut insert_match = tx.prepare(
            r#"INSERT INTO "Match" (Id, Trade_Id, Clearance_Id) VALUES (?1, ?2, ?3)"#,
        )?;
        let mut insert_adjustment = tx.prepare(
            "INSERT INTO Adjustment (Id, Amount, Trade_Id, Clearance_Id) VALUES (?1, ?2, ?3, ?4)",
        )?;

        for m in matches {
            insert_trade
                .execute(params![m.trade.id, m.trade.amount.to_string()])
                .with_context(|| format!("Failed to insert trade {}", m.trade.id))?;
            insert_clearance
                .execute(params![m.clearance.id, m.clearance.amount.to_string()])
                .with_context(|| format!("Failed to insert clearance {}", m.clearance.id))?;
            insert_match
                .execute(params![m.id, m.trade.id, m.clearance.id])
                .with_context(|| format!("Failed to insert match {}", m.id))?;

            for a in &m.trade.adjustments {
                insert_adjustment.execute(params![
                    a.id,
                    a.amount.to_string(),
                    Some(m.trade.id),
                    None::<i64>
                ])?;
            }
            for a in &m.clearance.adjustments {
                insert_adjustment.execute(params![
                    a.id,
                    a.amount.to_string(),
                    None::<i64>,
                    Some(m.clearance.id)
                ])?;
            }

            written.matches += 1;
            written.trades += 1;
            written.clearances += 1;
            written.adjustments += m.adjustment_count() as i64;
        }
    }

    tx.commit().context("Failed to commit seed transaction")?;
    info!(
        "seeded {} matches, {} adjustments",
        written.matches, written.adjustments
    );

    Ok(written)
}

// ============================================================================
// JOINED LOAD
// ============================================================================

impl JoinShape {
    /// Join query for this shape, ordered by match id.
    ///
    /// Every shape selects the same eleven columns; adjustment columns that
    /// are not joined are selected as NULL.
    pub fn sql(&self) -> String {
        let trade_adjustment_columns = if self.includes_trade_adjustments() {
            "TA.Id, TA.Amount"
        } else {
            "NULL, NULL"
        };
        let clearance_adjustment_columns = if self.includes_clearance_adjustments() {
            "CA.Id, CA.Amount"
        } else {
            "NULL, NULL"
        };

        let mut sql = format!(
            r#"SELECT "Match".Id, "Match".Trade_Id, "Match".Clearance_Id, Trade.Id, Trade.Amount, Clearance.Id, Clearance.Amount, {}, {} FROM "Match" INNER JOIN Trade ON Trade.Id = "Match".Trade_Id INNER JOIN Clearance ON Clearance.Id = "Match".Clearance_Id"#,
            trade_adjustment_columns, clearance_adjustment_columns
        );

        if self.includes_trade_adjustments() {
            sql.push_str(" LEFT OUTER JOIN Adjustment TA ON TA.Trade_Id = Trade.Id");
        }
        if self.includes_clearance_adjustments() {
            sql.push_str(" LEFT OUTER JOIN Adjustment CA ON CA.Clearance_Id = Clearance.Id");
        }
        sql.push_str(r#" ORDER BY "Match".Id"#);

        sql
    }
}

fn read_decimal(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|s| {
        Decimal::from_str(s.trim())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Amount column of a row that exists; NULL is rejected, never defaulted
fn read_required_amount(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    read_decimal(row, idx)?
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "Amount".to_string(), Type::Null))
}

/// (Id, Amount) column pair; None when the id column is NULL
fn read_id_amount(row: &Row, idx: usize) -> rusqlite::Result<Option<(i64, Decimal)>> {
    let id: Option<i64> = row.get(idx)?;

    match id {
        Some(id) => Ok(Some((id, read_required_amount(row, idx + 1)?))),
        None => Ok(None),
    }
}

fn map_join_row(row: &Row) -> rusqlite::Result<RawJoinRow> {
    let match_id: i64 = row.get(0)?;
    let root = MatchSnapshot {
        id: match_id,
        trade_id: row.get(1)?,
        clearance_id: row.get(2)?,
    };

    let sub_aggregate = |idx| -> rusqlite::Result<Option<SubAggregateSnapshot>> {
        Ok(read_id_amount(row, idx)?.map(|(id, amount)| SubAggregateSnapshot { id, amount }))
    };
    let adjustment = |idx| -> rusqlite::Result<Option<AdjustmentSnapshot>> {
        Ok(read_id_amount(row, idx)?.map(|(id, amount)| AdjustmentSnapshot { id, amount }))
    };

    Ok(RawJoinRow {
        match_id,
        root: Some(root),
        trade: sub_aggregate(3)?,
        clearance: sub_aggregate(5)?,
        trade_adjustment: adjustment(7)?,
        clearance_adjustment: adjustment(9)?,
    })
}

/// Run the join for `shape` and return its raw rows
pub fn load_join_rows(conn: &Connection, shape: JoinShape) -> Result<Vec<RawJoinRow>> {
    let sql = shape.sql();
    debug!("join query ({}): {}", shape, sql);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_join_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Run the join for `shape` and flatten the cursor as it is read
pub fn load_matches_joined(conn: &Connection, shape: JoinShape) -> Result<Vec<Match>> {
    let sql = shape.sql();
    debug!("join query ({}): {}", shape, sql);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_join_row)?
        .map(|row| row.map_err(anyhow::Error::from));

    let matches = shape.flattener().try_flatten(rows)?;
    Ok(matches)
}

// ============================================================================
// PER-TABLE LOAD
// ============================================================================

/// Load the full graph with one SELECT per table and stitch it by foreign key
pub fn load_matches_per_table(conn: &Connection) -> Result<Vec<Match>> {
    let trades = load_amounts(conn, "SELECT Id, Amount FROM Trade")?;
    let clearances = load_amounts(conn, "SELECT Id, Amount FROM Clearance")?;

    let mut trade_adjustments: HashMap<i64, Vec<Adjustment>> = HashMap::new();
    let mut clearance_adjustments: HashMap<i64, Vec<Adjustment>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT Id, Amount, Trade_Id, Clearance_Id FROM Adjustment ORDER BY Id",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let amount = read_required_amount(row, 1)?;
            let trade_id: Option<i64> = row.get(2)?;
            let clearance_id: Option<i64> = row.get(3)?;

            let adjustment = Adjustment::new(id, amount);
            match (trade_id, clearance_id) {
                (Some(trade_id), None) => trade_adjustments.entry(trade_id).or_default().push(adjustment),
                (None, Some(clearance_id)) => {
                    clearance_adjustments.entry(clearance_id).or_default().push(adjustment)
                }
                _ => bail!("adjustment {} must belong to exactly one trade or clearance", id),
            }
        }
    }

    let mut stmt = conn.prepare(r#"SELECT Id, Trade_Id, Clearance_Id FROM "Match" ORDER BY Id"#)?;
    let roots = stmt
        .query_map([], |row| {
            Ok(MatchSnapshot {
                id: row.get(0)?,
                trade_id: row.get(1)?,
                clearance_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut matches = Vec::with_capacity(roots.len());
    for root in roots {
        let Some(trade_amount) = trades.get(&root.trade_id) else {
            bail!("match {} references missing trade {}", root.id, root.trade_id);
        };
        let Some(clearance_amount) = clearances.get(&root.clearance_id) else {
            bail!("match {} references missing clearance {}", root.id, root.clearance_id);
        };

        matches.push(Match::new(
            root.id,
            Trade::new(
                root.trade_id,
                *trade_amount,
                trade_adjustments.get(&root.trade_id).cloned().unwrap_or_default(),
            ),
            Clearance::new(
                root.clearance_id,
                *clearance_amount,
                clearance_adjustments.get(&root.clearance_id).cloned().unwrap_or_default(),
            ),
        ));
    }

    debug!("per-table load assembled {} matches", matches.len());
    Ok(matches)
}

fn load_amounts(conn: &Connection, sql: &str) -> Result<HashMap<i64, Decimal>> {
    let mut stmt = conn.prepare(sql)?;
    let amounts = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, read_required_amount(row, 1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(amounts)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;
    use crate::entities::distinct_adjustment_ids;
    use crate::fixtures::generate_matches;
    use rust_decimal_macros::dec;

    fn seeded(config: &BenchConfig) -> (Connection, Vec<Match>) {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let matches = generate_matches(config);
        seed_database(&mut conn, &matches).unwrap();
        (conn, matches)
    }

    fn without_adjustments(m: &Match, keep_trade: bool) -> Match {
        let mut stripped = m.clone();
        if !keep_trade {
            stripped.trade.adjustments.clear();
        }
        stripped.clearance.adjustments.clear();
        stripped
    }

    #[test]
    fn test_seed_counts() {
        let (conn, _) = seeded(&BenchConfig::with_counts(25, 2, 3));

        let counts = count_rows(&conn).unwrap();
        assert_eq!(
            counts,
            TableCounts {
                matches: 25,
                trades: 25,
                clearances: 25,
                adjustments: 125,
            }
        );
    }

    #[test]
    fn test_clear_then_reseed() {
        let (mut conn, matches) = seeded(&BenchConfig::with_counts(5, 1, 1));

        clear_database(&conn).unwrap();
        assert_eq!(count_rows(&conn).unwrap(), TableCounts::default());

        seed_database(&mut conn, &matches).unwrap();
        assert_eq!(count_rows(&conn).unwrap().matches, 5);
    }

    #[test]
    fn test_joined_load_restores_full_graph() {
        let (conn, matches) = seeded(&BenchConfig::with_counts(50, 2, 3));

        let rows = load_join_rows(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();
        assert_eq!(rows.len(), 50 * 2 * 3);

        let loaded = load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();
        assert_eq!(loaded, matches);
        assert_eq!(distinct_adjustment_ids(&loaded), 250);
    }

    #[test]
    fn test_joined_load_per_shape() {
        let (conn, matches) = seeded(&BenchConfig::with_counts(10, 2, 3));

        let trade_only = load_matches_joined(&conn, JoinShape::TradeAdjustments).unwrap();
        let expected: Vec<Match> = matches.iter().map(|m| without_adjustments(m, true)).collect();
        assert_eq!(trade_only, expected);
        assert_eq!(load_join_rows(&conn, JoinShape::TradeAdjustments).unwrap().len(), 20);

        let plain = load_matches_joined(&conn, JoinShape::Plain).unwrap();
        let expected: Vec<Match> = matches.iter().map(|m| without_adjustments(m, false)).collect();
        assert_eq!(plain, expected);
    }

    #[test]
    fn test_per_table_load_matches_joined_load() {
        let (conn, matches) = seeded(&BenchConfig::with_counts(40, 2, 3));

        let per_table = load_matches_per_table(&conn).unwrap();
        let joined = load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();

        assert_eq!(per_table, matches);
        assert_eq!(per_table, joined);
    }

    #[test]
    fn test_clearance_joins_on_its_own_foreign_key() {
        // Trade and clearance ids deliberately differ from each other and the match id
        let m = Match::new(
            1,
            Trade::new(5, dec!(10.25), vec![Adjustment::new(100, dec!(11))]),
            Clearance::new(
                9,
                dec!(-3.5),
                vec![Adjustment::new(200, dec!(22)), Adjustment::new(201, dec!(22))],
            ),
        );
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_database(&mut conn, &[m.clone()]).unwrap();

        let loaded = load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();

        assert_eq!(loaded, vec![m]);
    }

    #[test]
    fn test_outer_join_keeps_matches_without_adjustments() {
        let (conn, matches) = seeded(&BenchConfig::with_counts(3, 0, 0));

        let rows = load_join_rows(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.trade_adjustment.is_none() && r.clearance_adjustment.is_none()));

        let loaded = load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap();
        assert_eq!(loaded, matches);
    }

    #[test]
    fn test_unparsable_amount_is_an_error() {
        let (conn, _) = seeded(&BenchConfig::with_counts(2, 1, 1));
        conn.execute("UPDATE Trade SET Amount = 'eleven' WHERE Id = 2", [])
            .unwrap();

        let err = load_matches_joined(&conn, JoinShape::Plain).unwrap_err();
        let sql_err = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert!(matches!(sql_err, rusqlite::Error::FromSqlConversionFailure(4, Type::Text, _)));
    }

    fn assert_null_amount(err: &anyhow::Error) {
        let sql_err = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert!(
            matches!(sql_err, rusqlite::Error::InvalidColumnType(_, name, Type::Null) if name == "Amount"),
            "unexpected error: {:?}",
            sql_err
        );
    }

    /// Schema of an existing database where Amount is nullable
    fn nullable_amount_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE Trade (Id INTEGER PRIMARY KEY, Amount TEXT);
               CREATE TABLE Clearance (Id INTEGER PRIMARY KEY, Amount TEXT);
               CREATE TABLE "Match" (Id INTEGER PRIMARY KEY, Trade_Id INTEGER, Clearance_Id INTEGER);
               CREATE TABLE Adjustment (Id INTEGER PRIMARY KEY, Amount TEXT, Trade_Id INTEGER, Clearance_Id INTEGER);
               INSERT INTO Clearance (Id, Amount) VALUES (1, '5');
               INSERT INTO "Match" (Id, Trade_Id, Clearance_Id) VALUES (1, 1, 1);"#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_null_sub_aggregate_amount_fails_both_loaders() {
        let conn = nullable_amount_schema();
        conn.execute("INSERT INTO Trade (Id, Amount) VALUES (1, NULL)", [])
            .unwrap();

        assert_null_amount(&load_matches_joined(&conn, JoinShape::Plain).unwrap_err());
        assert_null_amount(&load_matches_per_table(&conn).unwrap_err());
    }

    #[test]
    fn test_null_adjustment_amount_fails_both_loaders() {
        let conn = nullable_amount_schema();
        conn.execute_batch(
            "INSERT INTO Trade (Id, Amount) VALUES (1, '7');
             INSERT INTO Adjustment (Id, Amount, Trade_Id, Clearance_Id) VALUES (10, NULL, 1, NULL);",
        )
        .unwrap();

        assert_null_amount(
            &load_matches_joined(&conn, JoinShape::TradeAndClearanceAdjustments).unwrap_err(),
        );
        assert_null_amount(&load_matches_per_table(&conn).unwrap_err());
    }

    #[test]
    fn test_join_sql_uses_corrected_predicates() {
        let sql = JoinShape::TradeAndClearanceAdjustments.sql();
        assert!(sql.contains(r#"Clearance.Id = "Match".Clearance_Id"#));
        assert!(sql.contains("CA.Clearance_Id = Clearance.Id"));
        assert!(!sql.contains(r#"Clearance.Id = "Match".Trade_Id"#));

        let plain = JoinShape::Plain.sql();
        assert!(!plain.contains("LEFT OUTER JOIN"));
    }
}
