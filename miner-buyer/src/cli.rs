//! Command-line interface.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "miner-buyer",
    version,
    about = "Create storage miners when fees are cheap and sort them by proving deadline"
)]
pub struct Args {
    /// Forward daemon output to the terminal and log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    /// Owner address new miners are created for
    #[arg(long = "owner-addr", env = "OWNER_ADDR", global = true)]
    pub owner: Option<String>,

    /// Highest acceptable gas premium (e.g. `2 FIL`, `150 nanoFIL`)
    #[arg(long, env = "THRESHOLD", global = true)]
    pub threshold: Option<String>,

    /// Full node API endpoint
    #[arg(
        long,
        env = "LOTUS_API",
        default_value = "127.0.0.1:1234",
        global = true
    )]
    pub lotus_api: String,

    /// Full node API token
    #[arg(long, env = "LOTUS_TOKEN", hide_env_values = true, global = true)]
    pub lotus_token: Option<String>,

    /// Storage-miner API endpoint
    #[arg(
        long,
        env = "LOTUSMINER_API",
        default_value = "127.0.0.1:2345",
        global = true
    )]
    pub miner_api: String,

    /// Storage-miner API token; replaced by the data directory's token once started
    #[arg(long, env = "LOTUSMINER_TOKEN", hide_env_values = true, global = true)]
    pub miner_token: Option<String>,

    /// Prefix for miner data directories, backups and ledgers [default: home directory]
    #[arg(long, env = "MINER_BUYER_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Storage-miner executable
    #[arg(
        long,
        env = "LOTUS_MINER_BIN",
        default_value = "lotus-miner",
        global = true
    )]
    pub lotus_miner_bin: PathBuf,

    /// Full node executable, used for wallet export
    #[arg(long, env = "LOTUS_BIN", default_value = "lotus", global = true)]
    pub lotus_bin: PathBuf,

    /// Zone deadline hours are observed in: `local` or an IANA name
    #[arg(long, env = "MINER_BUYER_TZ", default_value = "local", global = true)]
    pub timezone: String,

    /// Seconds to wait for a started daemon to answer its API
    #[arg(long, default_value_t = 120, value_name = "SECS", global = true)]
    pub startup_timeout: u64,

    /// Epochs a message must be buried under before it counts as confirmed
    #[arg(long, default_value_t = 5, global = true)]
    pub confidence: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daily window the zeroth deadline must fall in for a miner to be kept.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Window start, e.g. `9:00AM` or `09:00`
    #[arg(long, requires = "finish")]
    pub start: Option<String>,

    /// Window end, inclusive, e.g. `5:00PM` or `17:00`
    #[arg(long, requires = "start")]
    pub finish: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a miner if fees are below the threshold, classify and archive it
    Buy {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Restore a backed-up miner, report its zeroth deadline hour and put it back
    Info {
        /// Worker address of the miner
        worker: String,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Start, stop, back up and move away an existing miner data directory
    Backup {
        /// Worker address of the miner
        worker: String,
    },

    /// Propose and confirm a new owner for a miner
    Transfer {
        /// Miner actor address
        #[arg(long)]
        miner: String,

        /// New owner address
        #[arg(long)]
        new: String,

        /// Current owner address [default: --owner-addr]
        #[arg(long)]
        owner: Option<String>,
    },

    /// Transfer every miner listed in a file
    BulkTransfer {
        /// Lines of `<miner-or-worker> [<new-owner>]`
        #[arg(long, default_value = "keepminer.list")]
        file: PathBuf,

        /// New owner for lines that do not name one
        #[arg(long)]
        new: Option<String>,
    },

    /// Show the current disposition and last state of every worker
    Ledger,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_window_requires_both_ends() {
        let result = Args::try_parse_from(["miner-buyer", "buy", "--start", "9:00AM"]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "miner-buyer",
            "buy",
            "--start",
            "9:00AM",
            "--finish",
            "5:00PM",
        ])
        .unwrap();
        match args.command {
            Commands::Buy { window } => {
                assert_eq!(window.start.as_deref(), Some("9:00AM"));
                assert_eq!(window.finish.as_deref(), Some("5:00PM"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_transfer_owner_is_separate_from_global_owner() {
        let args = Args::try_parse_from([
            "miner-buyer",
            "--owner-addr",
            "f0100",
            "transfer",
            "--miner",
            "f01234",
            "--new",
            "f0200",
            "--owner",
            "f0300",
        ])
        .unwrap();
        assert_eq!(args.owner.as_deref(), Some("f0100"));
        match args.command {
            Commands::Transfer { owner, .. } => assert_eq!(owner.as_deref(), Some("f0300")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
