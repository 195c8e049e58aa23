//! Mafia Host CLI
//!
//! Drives a blind game across running party services:
//! - Distributed Key Generation
//! - Blind role assignment
//! - Action rounds and tally decryption

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mafia_core::fhe::{KeyTag, PublicKey};
use mafia_core::host::{
    decrypt_tally, resolve_night, resolve_vote, ActionCollector, BlindRoleAssigner, DkgCoordinator,
};
use mafia_core::{GameId, PartyId, Phase, Role, Roster};
use peer_client::HttpTransport;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

/// Mafia Host - blind game coordinator
#[derive(Parser)]
#[command(name = "mafia-host")]
#[command(about = "Host for threshold-encrypted hidden-role games")]
#[command(version)]
struct Cli {
    /// Base URL of every party in join order
    #[arg(short, long, env = "PEERS", value_delimiter = ',', required = true)]
    peers: Vec<String>,

    /// Game identifier
    #[arg(short, long, env = "GAME_ID")]
    game_id: GameId,

    /// Data directory for the game record
    #[arg(short, long, env = "DEST", default_value = "./data")]
    dest: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "90")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PhaseArg {
    Night,
    Vote,
    Day,
}

impl From<PhaseArg> for Phase {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::Night => Phase::Night,
            PhaseArg::Vote => Phase::Vote,
            PhaseArg::Day => Phase::Day,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run distributed key generation
    Setup,

    /// Encrypt roles and let every party learn its own
    AssignRoles {
        /// Role per seat (comma-separated); a shuffled standard roster if omitted
        #[arg(short, long, value_delimiter = ',')]
        roles: Vec<Role>,
    },

    /// Collect one round of triples and decrypt the tallies
    Round {
        #[arg(long, value_enum)]
        phase: PhaseArg,

        #[arg(short, long)]
        turn: u64,

        /// Surviving parties (comma-separated); everyone if omitted
        #[arg(short, long, value_delimiter = ',')]
        survivors: Vec<PartyId>,

        /// Party that runs the relay chain over the tallies
        #[arg(long, default_value = "0")]
        via: PartyId,
    },

    /// Show the stored game record
    Info,
}

/// Public outcome of setup, kept between invocations
#[derive(Debug, Serialize, Deserialize)]
struct GameRecord {
    game_id: GameId,
    n_parties: usize,
    joint_public_key: PublicKey,
    key_tag: KeyTag,
    mult_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    // Ensure data directory exists
    std::fs::create_dir_all(&cli.dest)?;

    let transport =
        HttpTransport::new(cli.peers.clone()).with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Setup => {
            run_setup(&cli, &transport).await?;
        }
        Commands::AssignRoles { ref roles } => {
            run_assign(&cli, &transport, roles).await?;
        }
        Commands::Round {
            phase,
            turn,
            ref survivors,
            via,
        } => {
            run_round(&cli, &transport, phase.into(), turn, survivors, via).await?;
        }
        Commands::Info => {
            show_info(&cli)?;
        }
    }

    Ok(())
}

async fn run_setup(cli: &Cli, transport: &HttpTransport) -> Result<()> {
    let n_parties = cli.peers.len();
    info!(game_id = %cli.game_id, n_parties, "Starting DKG");

    let outcome = DkgCoordinator::new(transport, cli.game_id.clone(), n_parties)
        .run()
        .await?;

    let record = GameRecord {
        game_id: cli.game_id.clone(),
        n_parties,
        joint_public_key: outcome.joint_public_key,
        key_tag: outcome.key_tag,
        mult_key: outcome.mult_key.fingerprint(),
    };
    let path = record_path(cli);
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;

    info!(key_tag = %record.key_tag, path = ?path, "DKG completed, game record saved");
    println!(
        "Joint Public Key: {}",
        hex::encode(record.joint_public_key.to_bytes())
    );

    Ok(())
}

async fn run_assign(cli: &Cli, transport: &HttpTransport, roles: &[Role]) -> Result<()> {
    let record = load_record(cli)?;
    let roster = if roles.is_empty() {
        Roster::standard(record.n_parties, &mut OsRng)?
    } else {
        Roster::new(roles.to_vec())?
    };

    info!(game_id = %record.game_id, seats = roster.len(), "Assigning roles");
    BlindRoleAssigner::new(transport, record.game_id.clone(), record.n_parties)
        .assign(&roster, &record.joint_public_key)
        .await?;

    println!("Every party learned its role");
    Ok(())
}

async fn run_round(
    cli: &Cli,
    transport: &HttpTransport,
    phase: Phase,
    turn: u64,
    survivors: &[PartyId],
    via: PartyId,
) -> Result<()> {
    let record = load_record(cli)?;
    let survivors: Vec<PartyId> = if survivors.is_empty() {
        (0..record.n_parties).collect()
    } else {
        survivors.to_vec()
    };

    info!(%phase, turn, survivors = ?survivors, "Collecting round");
    let collector = ActionCollector::collect_round(
        transport,
        &record.game_id,
        record.n_parties,
        phase,
        &survivors,
        turn,
    )
    .await?;
    let tallies = collector
        .tallies()
        .context("round collected no submissions")?;

    match phase {
        Phase::Night => {
            let attack = decrypt_tally(transport, &record.game_id, via, &tallies.attack).await?;
            let heal = decrypt_tally(transport, &record.game_id, via, &tallies.heal).await?;
            match resolve_night(&attack, &heal) {
                Some(victim) => println!("Party {} was killed", victim),
                None => println!("No one died tonight"),
            }
        }
        Phase::Vote => {
            let vote = decrypt_tally(transport, &record.game_id, via, &tallies.vote).await?;
            println!("Votes: {:?}", vote.values());
            match resolve_vote(&vote) {
                Some(party) => println!("Party {} was voted out", party),
                None => println!("No majority"),
            }
        }
        Phase::Day => println!("Day round collected"),
    }

    Ok(())
}

fn show_info(cli: &Cli) -> Result<()> {
    let record = load_record(cli)?;

    println!("Game Record:");
    println!("  Game ID: {}", record.game_id);
    println!("  N Parties: {}", record.n_parties);
    println!(
        "  Joint Public Key: {}",
        hex::encode(record.joint_public_key.to_bytes())
    );
    println!("  Key Tag: {}", record.key_tag);
    println!("  Mult Key: {}", record.mult_key);

    Ok(())
}

fn record_path(cli: &Cli) -> PathBuf {
    cli.dest.join(format!("game.{}.json", cli.game_id))
}

fn load_record(cli: &Cli) -> Result<GameRecord> {
    let path = record_path(cli);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("no game record at {}, run setup first", path.display()))?;
    let record: GameRecord = serde_json::from_str(&json)?;
    if record.n_parties != cli.peers.len() {
        bail!(
            "game record has {} parties but {} peers were given",
            record.n_parties,
            cli.peers.len()
        );
    }
    Ok(record)
}
