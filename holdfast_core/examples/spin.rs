use holdfast_core::{verify_reveal, GameConfig, RoundTable, SpinRequest};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example end-to-end round: commit, spin, reveal, verify
    let table = RoundTable::new(Arc::new(GameConfig::standard()))?;
    let commit = table.begin_round()?;
    let spun = table.spin(
        commit.round_id,
        SpinRequest {
            client_seed: "example-client-seed".into(),
            nonce: 1,
            bet: 1.0,
        },
    )?;
    if spun.outcome.bonus_triggered {
        println!("bonus triggered; see the holdfast CLI for playing respins");
        table.discard_round(commit.round_id);
        return Ok(());
    }
    let reveal = table.reveal_round(commit.round_id)?;
    let report = verify_reveal(&reveal, table.config())?;
    println!(
        "commitment={} secret={} payout={} fair={}",
        commit.commitment,
        reveal.server_secret,
        spun.outcome.total_win,
        report.is_fair()
    );
    for row in spun.outcome.grid.rows() {
        println!("{}", row.map(|s| s.to_string()).join(" "));
    }
    println!("rounds still open: {}", table.open_rounds());
    Ok(())
}
