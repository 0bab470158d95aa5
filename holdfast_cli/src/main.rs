use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use holdfast_core::{
    commitment_matches, replay_bonus, simulate, verify, verify_reveal, GameConfig, RespinRequest,
    RoundTable, SpinRequest, Symbol,
};
use holdfast_shared::{
    BonusRespinResponse, CommitResponse, RoundResponse, RtpResponse, SpinResponse, VerifyResponse,
};

mod store;

#[derive(Parser)]
#[command(
    name = "holdfast",
    about = "Play, verify and audit provably fair Hold & Win rounds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://holdfast.db
    #[arg(long, value_parser, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,
    /// Game configuration JSON; the standard game when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit, spin, play any bonus, reveal, self-verify and log one round
    Play {
        #[arg(long)]
        client_seed: String,
        #[arg(long, default_value_t = 1.0)]
        bet: f64,
        /// Defaults to one past the last nonce logged for this client seed
        #[arg(long)]
        nonce: Option<u64>,
    },
    /// Replay a spin (and its bonus) from revealed inputs
    Verify {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        bet: f64,
        /// Commitment published before the spin
        #[arg(long)]
        commitment: Option<String>,
        /// Respin nonces, comma separated, for a round that triggered the bonus
        #[arg(long, value_delimiter = ',')]
        respin_nonces: Vec<u64>,
    },
    /// Re-verify a logged round from the audit store
    VerifyRound { round_id: Uuid },
    /// Estimate return to player over many rounds
    Simulate {
        #[arg(long, default_value_t = 100_000)]
        spins: u64,
        #[arg(long, default_value_t = 1.0)]
        bet: f64,
        #[arg(long, default_value = "simulation")]
        secret: String,
        #[arg(long, default_value = "sim")]
        client_prefix: String,
    },
    /// View last N log entries
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
    },
    /// Export logged rounds to CSV path
    ExportCsv { path: String },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GameConfig> {
    let config = match path {
        Some(p) => GameConfig::load(p)?,
        None => GameConfig::standard(),
    };
    config.validate().context("game configuration rejected")?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_reels(reels: &[Vec<u8>]) -> String {
    (0..3)
        .map(|row| {
            reels
                .iter()
                .map(|col| {
                    Symbol::from_index(col[row]).map_or("?".to_string(), |s| s.to_string())
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn play(
    cli_db: Option<String>,
    config: GameConfig,
    client_seed: String,
    bet: f64,
    nonce: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let pool = store::get_pool(cli_db).await?;
    let mut nonce = match nonce {
        Some(n) => n,
        None => store::next_nonce(&pool, &client_seed).await?,
    };
    store::db_nonce(nonce)?;
    let table = RoundTable::new(Arc::new(config))?;

    let commit = table.begin_round()?;
    if !json {
        println!("round {} commitment {}", commit.round_id, commit.commitment);
    }
    let spun = table.spin(
        commit.round_id,
        SpinRequest {
            client_seed: client_seed.clone(),
            nonce,
            bet,
        },
    )?;
    let spin = SpinResponse::new(&spun, nonce);
    if !json {
        println!("{}", format_reels(&spin.reels));
        println!("line win {} (triggers {})", spin.payout, spin.trigger_count);
    }

    let mut respins = Vec::new();
    if let (Some(mut grid), false) = (spun.session_grid.clone(), spun.bonus_settled) {
        if !json {
            let opening = spun.bonus_value.unwrap_or(0.0);
            println!("hold and win! opening value {opening}");
        }
        loop {
            nonce = nonce
                .checked_add(1)
                .context("nonce space exhausted during the bonus")?;
            let out = table.advance_bonus_respin(
                commit.round_id,
                RespinRequest {
                    client_seed: client_seed.clone(),
                    nonce,
                    session_grid: grid,
                    bet,
                },
            )?;
            grid = out
                .cells
                .iter()
                .map(|c| c.is_held().then_some(Symbol::Trigger))
                .collect();
            if !json {
                println!(
                    "respin nonce={} landed={:?} value={} remaining={}",
                    out.nonce, out.landed, out.bonus_value_so_far, out.respins_remaining
                );
            }
            respins.push(BonusRespinResponse::from(&out));
            if out.session_complete {
                break;
            }
        }
    }

    let reveal = table.reveal_round(commit.round_id)?;
    let report = verify_reveal(&reveal, table.config())?.into_result()?;
    let entry = store::save_round(&pool, &reveal, Utc::now()).await?;
    info!(id = entry.id, round_id = %entry.round_id, "round logged");

    let response = RoundResponse {
        commit: CommitResponse::from(&commit),
        spin,
        respins,
        server_secret: reveal.server_secret.clone(),
        bonus_payout: reveal.bonus_payout,
        total_payout: reveal.total_payout(),
        verified: report.is_fair(),
    };
    if json {
        print_json(&response)?;
    } else {
        if let Some(bonus) = response.bonus_payout {
            println!("bonus payout {bonus}");
        }
        println!("total payout {}", response.total_payout);
        println!("revealed secret {}", response.server_secret);
    }
    Ok(())
}

fn verify_inputs(
    config: &GameConfig,
    secret: &str,
    client_seed: &str,
    nonce: u64,
    bet: f64,
    commitment: Option<&str>,
    respin_nonces: &[u64],
) -> anyhow::Result<VerifyResponse> {
    let replayed = verify(secret, client_seed, nonce, bet, config);
    let commitment_ok = commitment.map(|c| commitment_matches(secret, c));
    let mut failures = Vec::new();
    if commitment_ok == Some(false) {
        failures.push("commitment".to_string());
    }
    let bonus_payout = if replayed.bonus_triggered {
        if respin_nonces.is_empty() {
            bail!("spin triggered the bonus; pass --respin-nonces to replay it");
        }
        let (settled, _) = replay_bonus(secret, client_seed, nonce, respin_nonces, bet, config)?;
        Some(settled.payout)
    } else {
        None
    };

    Ok(VerifyResponse {
        fair: failures.is_empty(),
        failures,
        commitment_matches: commitment_ok,
        derived_hash: replayed.derived_hash.clone(),
        reels: replayed.grid.columns(),
        payout: replayed.total_win,
        wins: replayed.wins,
        bonus_triggered: replayed.bonus_triggered,
        bonus_payout,
    })
}

fn print_verification(response: &VerifyResponse) {
    println!("derived hash {}", response.derived_hash);
    println!("{}", format_reels(&response.reels));
    println!("line win {}", response.payout);
    for w in &response.wins {
        match w.payline {
            Some(line) => println!(
                "  line {line}: {} x{} pays {}",
                w.symbol, w.run_length, w.payout
            ),
            None => println!(
                "  scatter: {} x{} pays {}",
                w.symbol, w.run_length, w.payout
            ),
        }
    }
    if let Some(bonus) = response.bonus_payout {
        println!("bonus payout {bonus}");
    }
    match response.commitment_matches {
        Some(true) => println!("commitment matches"),
        Some(false) => println!("commitment MISMATCH"),
        None => println!("commitment not checked"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Play {
            client_seed,
            bet,
            nonce,
        } => play(cli.database_url, config, client_seed, bet, nonce, cli.json).await?,
        Commands::Verify {
            secret,
            client_seed,
            nonce,
            bet,
            commitment,
            respin_nonces,
        } => {
            let response = verify_inputs(
                &config,
                &secret,
                &client_seed,
                nonce,
                bet,
                commitment.as_deref(),
                &respin_nonces,
            )?;
            if cli.json {
                print_json(&response)?;
            } else {
                print_verification(&response);
            }
        }
        Commands::VerifyRound { round_id } => {
            let pool = store::get_pool(cli.database_url).await?;
            let reveal = store::load_round(&pool, round_id)
                .await?
                .with_context(|| format!("round {round_id} not in the audit log"))?;
            let report = verify_reveal(&reveal, &config)?;
            if !report.is_fair() {
                warn!(%round_id, failures = ?report.failures(), "logged round failed verification");
            }
            if cli.json {
                print_json(&VerifyResponse::from(&report))?;
            } else if report.is_fair() {
                println!("round {round_id} verified");
            } else {
                println!("round {round_id} FAILED: {}", report.failures().join(", "));
            }
        }
        Commands::Simulate {
            spins,
            bet,
            secret,
            client_prefix,
        } => {
            let report = simulate(&config, &secret, &client_prefix, spins, bet)?;
            if cli.json {
                print_json(&RtpResponse::from(&report))?;
            } else {
                println!("spins            {}", report.spins);
                println!("total bet        {:.2}", report.total_bet);
                println!("line winnings    {:.2}", report.line_winnings);
                println!("bonus winnings   {:.2}", report.bonus_winnings);
                println!("bonus triggers   {}", report.bonus_triggers);
                if let Some(every) = report.trigger_frequency() {
                    println!("trigger every    {every:.1} spins");
                }
                println!("rtp              {:.4}", report.rtp);
                println!("house edge       {:.4}", report.house_edge);
            }
        }
        Commands::ViewLogs { n } => {
            let pool = store::get_pool(cli.database_url).await?;
            let entries = store::recent(&pool, n).await?;
            if cli.json {
                return print_json(&entries);
            }
            for e in &entries {
                println!(
                    "#{:>6} {} seed={} nonce={} commitment={} payout={}",
                    e.id,
                    e.ts.to_rfc3339(),
                    e.client_seed,
                    e.nonce,
                    e.commitment,
                    e.total_payout()
                );
            }
        }
        Commands::ExportCsv { path } => {
            let pool = store::get_pool(cli.database_url).await?;
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "id",
                "ts",
                "round_id",
                "client_seed",
                "nonce",
                "commitment",
                "server_secret",
                "result_reels_json",
                "payout",
                "bonus_payout",
            ])?;
            let entries = store::all_rounds(&pool).await?;
            for e in &entries {
                wtr.write_record(&[
                    e.id.to_string(),
                    e.ts.to_rfc3339(),
                    e.round_id.to_string(),
                    e.client_seed.clone(),
                    e.nonce.to_string(),
                    e.commitment.clone(),
                    e.server_secret.clone(),
                    serde_json::to_string(&e.result_reels)?,
                    e.payout.to_string(),
                    e.bonus_payout.map(|b| b.to_string()).unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", entries.len(), path);
        }
    }

    Ok(())
}
