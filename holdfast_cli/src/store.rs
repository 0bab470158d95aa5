//! SQLite audit log of revealed rounds.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use holdfast_core::{Commitment, RespinRecord, RoundReveal, SpinRecord};
use holdfast_shared::SpinLogEntry;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://holdfast.db";

pub async fn get_pool(url: Option<String>) -> anyhow::Result<SqlitePool> {
    let url = url.unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("bad database url {url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("opening {url}"))?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// SQLite integers are signed; nonces past `i64::MAX` cannot be logged.
pub fn db_nonce(nonce: u64) -> anyhow::Result<i64> {
    i64::try_from(nonce).with_context(|| format!("nonce {nonce} is beyond the audit log range"))
}

fn stored_nonce(row: &SqliteRow, column: &str) -> anyhow::Result<u64> {
    let raw: i64 = row.get(column);
    u64::try_from(raw).with_context(|| format!("negative {column} {raw} in the audit log"))
}

/// One past the highest nonce this client seed has used, spins and respins alike.
pub async fn next_nonce(pool: &SqlitePool, client_seed: &str) -> anyhow::Result<u64> {
    let last: Option<i64> =
        sqlx::query_scalar("SELECT MAX(last_nonce) FROM spins WHERE client_seed = ?")
            .bind(client_seed)
            .fetch_one(pool)
            .await?;
    match last {
        None => Ok(1),
        Some(n) => u64::try_from(n)?
            .checked_add(1)
            .context("nonce space exhausted for this client seed"),
    }
}

/// Logs a revealed round and its respins in one transaction.
pub async fn save_round(
    pool: &SqlitePool,
    reveal: &RoundReveal,
    ts: DateTime<Utc>,
) -> anyhow::Result<SpinLogEntry> {
    let spin = reveal
        .spin
        .as_ref()
        .context("refusing to store a round that was never spun")?;
    let last_nonce = reveal.respins.last().map_or(spin.nonce, |r| r.nonce);
    let reels: Vec<Vec<u8>> = spin.grid.chunks(3).map(<[u8]>::to_vec).collect();
    let round_id = reveal.round_id.to_string();

    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        "INSERT INTO spins (ts, round_id, client_seed, nonce, last_nonce, bet, commitment, server_secret, derived_hash, stop_indices_json, result_reels_json, total_win, trigger_count, bonus_triggered, bonus_payout) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(ts.to_rfc3339())
    .bind(&round_id)
    .bind(&spin.client_seed)
    .bind(db_nonce(spin.nonce)?)
    .bind(db_nonce(last_nonce)?)
    .bind(spin.bet)
    .bind(reveal.commitment.as_str())
    .bind(&reveal.server_secret)
    .bind(&spin.derived_hash)
    .bind(serde_json::to_string(&spin.stop_indices)?)
    .bind(serde_json::to_string(&reels)?)
    .bind(spin.total_win)
    .bind(spin.trigger_count as i64)
    .bind(spin.bonus_triggered)
    .bind(reveal.bonus_payout)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for r in &reveal.respins {
        sqlx::query(
            "INSERT INTO respins (round_id, nonce, derived_hash, landed_json, new_symbols_added, bonus_value_so_far, respins_remaining) VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&round_id)
        .bind(db_nonce(r.nonce)?)
        .bind(&r.derived_hash)
        .bind(serde_json::to_string(&r.landed)?)
        .bind(r.new_symbols_added as i64)
        .bind(r.bonus_value_so_far)
        .bind(i64::from(r.respins_remaining))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    SpinLogEntry::from_reveal(id, ts, reveal).context("round has no spin to log")
}

pub async fn load_round(pool: &SqlitePool, round_id: Uuid) -> anyhow::Result<Option<RoundReveal>> {
    let Some(row) = sqlx::query("SELECT * FROM spins WHERE round_id = ?")
        .bind(round_id.to_string())
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let server_secret: String = row.get("server_secret");
    let commitment = Commitment::from_hex(row.get::<String, _>("commitment"));
    let reels: Vec<Vec<u8>> = serde_json::from_str(&row.get::<String, _>("result_reels_json"))?;
    let spin = SpinRecord {
        commitment: commitment.clone(),
        server_secret: Some(server_secret.clone()),
        client_seed: row.get("client_seed"),
        nonce: stored_nonce(&row, "nonce")?,
        derived_hash: row.get("derived_hash"),
        stop_indices: serde_json::from_str(&row.get::<String, _>("stop_indices_json"))?,
        grid: reels.concat(),
        total_win: row.get("total_win"),
        bet: row.get("bet"),
        trigger_count: row.get::<i64, _>("trigger_count") as usize,
        bonus_triggered: row.get("bonus_triggered"),
    };

    let respins = sqlx::query("SELECT * FROM respins WHERE round_id = ? ORDER BY nonce ASC")
        .bind(round_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(respin_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Some(RoundReveal {
        round_id,
        server_secret,
        commitment,
        spin: Some(spin),
        respins,
        bonus_payout: row.get("bonus_payout"),
    }))
}

fn respin_from_row(r: &SqliteRow) -> anyhow::Result<RespinRecord> {
    Ok(RespinRecord {
        nonce: stored_nonce(r, "nonce")?,
        derived_hash: r.get("derived_hash"),
        landed: serde_json::from_str(&r.get::<String, _>("landed_json"))?,
        new_symbols_added: r.get::<i64, _>("new_symbols_added") as usize,
        bonus_value_so_far: r.get("bonus_value_so_far"),
        respins_remaining: u8::try_from(r.get::<i64, _>("respins_remaining"))?,
    })
}

fn log_entry(r: &SqliteRow) -> anyhow::Result<SpinLogEntry> {
    let ts: String = r.get("ts");
    let round_id: String = r.get("round_id");
    Ok(SpinLogEntry {
        id: r.get("id"),
        ts: DateTime::parse_from_rfc3339(&ts)
            .with_context(|| format!("bad timestamp {ts}"))?
            .with_timezone(&Utc),
        round_id: Uuid::parse_str(&round_id)?,
        client_seed: r.get("client_seed"),
        nonce: stored_nonce(r, "nonce")?,
        commitment: r.get("commitment"),
        server_secret: r.get("server_secret"),
        result_reels: serde_json::from_str(&r.get::<String, _>("result_reels_json"))?,
        payout: r.get("total_win"),
        bonus_payout: r.get("bonus_payout"),
    })
}

const LOG_COLUMNS: &str = "id, ts, round_id, client_seed, nonce, commitment, server_secret, result_reels_json, total_win, bonus_payout";

/// The `n` most recent rounds, newest first.
pub async fn recent(pool: &SqlitePool, n: i64) -> anyhow::Result<Vec<SpinLogEntry>> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM spins ORDER BY id DESC LIMIT ?");
    let rows = sqlx::query(&sql).bind(n).fetch_all(pool).await?;
    rows.iter().map(log_entry).collect()
}

pub async fn all_rounds(pool: &SqlitePool) -> anyhow::Result<Vec<SpinLogEntry>> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM spins ORDER BY id ASC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(log_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::{GameConfig, RoundTable, SpinRequest};
    use std::sync::Arc;

    async fn scratch_pool() -> SqlitePool {
        let path = std::env::temp_dir().join(format!("holdfast-{}.db", Uuid::new_v4()));
        get_pool(Some(format!("sqlite://{}", path.display())))
            .await
            .unwrap()
    }

    fn played_round(client: &str, nonce: u64) -> RoundReveal {
        let table = RoundTable::new(Arc::new(GameConfig::standard())).unwrap();
        let id = table.begin_round().unwrap().round_id;
        let req = SpinRequest {
            client_seed: client.into(),
            nonce,
            bet: 1.0,
        };
        table.spin(id, req).unwrap();
        // Bonus rounds stay open until their respins are played; these tests only need base spins.
        match table.reveal_round(id) {
            Ok(reveal) => reveal,
            Err(_) => played_round(client, nonce),
        }
    }

    #[tokio::test]
    async fn stored_round_reloads_identically() {
        let pool = scratch_pool().await;
        let reveal = played_round("alice", 1);
        let saved = save_round(&pool, &reveal, Utc::now()).await.unwrap();
        let loaded = load_round(&pool, reveal.round_id).await.unwrap().unwrap();
        assert_eq!(loaded, reveal);
        assert!(load_round(&pool, Uuid::new_v4()).await.unwrap().is_none());

        let logged = &recent(&pool, 1).await.unwrap()[0];
        assert_eq!(logged.id, saved.id);
        assert_eq!(logged.round_id, saved.round_id);
        assert_eq!(logged.nonce, saved.nonce);
        assert_eq!(logged.result_reels, saved.result_reels);
        assert_eq!(logged.total_payout(), saved.total_payout());
    }

    #[tokio::test]
    async fn nonces_past_the_signed_range_are_refused() {
        let pool = scratch_pool().await;
        assert_eq!(db_nonce(i64::MAX as u64).unwrap(), i64::MAX);
        assert!(db_nonce(i64::MAX as u64 + 1).is_err());

        let reveal = played_round("erin", u64::MAX - 1);
        assert!(save_round(&pool, &reveal, Utc::now()).await.is_err());
        // The failed insert left nothing behind.
        assert!(all_rounds(&pool).await.unwrap().is_empty());
        assert_eq!(next_nonce(&pool, "erin").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nonce_continues_per_client() {
        let pool = scratch_pool().await;
        assert_eq!(next_nonce(&pool, "bob").await.unwrap(), 1);
        let reveal = played_round("bob", 7);
        save_round(&pool, &reveal, Utc::now()).await.unwrap();
        let used = reveal.spin.as_ref().unwrap().nonce;
        assert_eq!(next_nonce(&pool, "bob").await.unwrap(), used + 1);
        assert_eq!(next_nonce(&pool, "carol").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn logs_come_back_newest_first() {
        let pool = scratch_pool().await;
        for nonce in [1, 10, 20] {
            save_round(&pool, &played_round("dave", nonce), Utc::now())
                .await
                .unwrap();
        }
        let recent = recent(&pool, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
        assert_eq!(all_rounds(&pool).await.unwrap().len(), 3);
    }
}
