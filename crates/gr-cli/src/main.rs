//! CLI frontend for the Gloamreach combat engine.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "gloam",
    about = "Gloamreach: run seeded encounters and duels against the combat engine",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log every resolved action and AI decision to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fight a PvE encounter from a JSON roster
    Encounter {
        /// Roster file: a JSON array of combatants (default: built-in sample)
        #[arg(short, long)]
        roster: Option<PathBuf>,

        /// RNG seed for a reproducible fight
        #[arg(short, long)]
        seed: Option<u64>,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Fight a PvP duel between two characters
    Duel {
        /// Challenger sheet (JSON, default: built-in sample)
        #[arg(long)]
        challenger: Option<PathBuf>,

        /// Defender sheet (JSON, default: built-in sample)
        #[arg(long)]
        defender: Option<PathBuf>,

        /// Gold each side stakes
        #[arg(short, long)]
        wager: Option<u64>,

        /// Gold each duelist starts with
        #[arg(long, default_value = "500")]
        purse: u64,

        /// RNG seed for a reproducible fight
        #[arg(short, long)]
        seed: Option<u64>,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Roll a dice expression such as 2d6+3
    Roll {
        /// The expression (NdS±M, or a flat number)
        expr: String,

        /// Roll as a critical hit (dice doubled)
        #[arg(long)]
        crit: bool,

        /// RNG seed
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Make a crafting quality roll
    Quality {
        /// Skill bonus
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        skill: i32,
        /// Tool bonus
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        tool: i32,
        /// Workstation bonus
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        station: i32,
        /// Material quality bonus
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        materials: i32,
        /// Recipe mastery bonus
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        mastery: i32,
        /// Temporary buffs
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        buffs: i32,
        /// Luck
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        luck: i32,

        /// RNG seed
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Print a sample roster to start from
    SampleRoster {
        /// Print a single duelist sheet instead
        #[arg(long)]
        duelist: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Encounter {
            roster,
            seed,
            config,
            format,
        } => commands::encounter::run(roster.as_deref(), seed, config.as_deref(), format),
        Commands::Duel {
            challenger,
            defender,
            wager,
            purse,
            seed,
            config,
            format,
        } => commands::duel::run(&commands::duel::DuelArgs {
            challenger,
            defender,
            wager,
            purse,
            seed,
            config,
            format,
        }),
        Commands::Roll { expr, crit, seed } => commands::roll::run(&expr, crit, seed),
        Commands::Quality {
            skill,
            tool,
            station,
            materials,
            mastery,
            buffs,
            luck,
            seed,
        } => {
            let bonuses = gr_mechanics::QualityBonuses {
                skill,
                tool,
                station,
                materials,
                mastery,
                buffs,
                luck,
            };
            commands::roll::quality(&bonuses, seed)
        }
        Commands::SampleRoster { duelist } => commands::sample::run(duelist),
    }
}
