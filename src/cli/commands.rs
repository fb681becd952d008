use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sealed-ledger", about = "Single-node proof-of-work UTXO ledger")]
pub struct Opt {
    #[arg(
        long = "data-dir",
        global = true,
        help = "Ledger database directory (overrides LEDGER_DATA_DIR)"
    )]
    pub data_dir: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "createblockchain",
        about = "Create the ledger, paying the genesis reward to ADDRESS"
    )]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Transfer coins between addresses")]
    Send {
        #[arg(help = "Source wallet address (must be a local wallet)")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send, in coins")]
        amount: f64,
    },
    #[command(name = "printchain", about = "Print all blocks from tip to genesis")]
    Printchain,
    #[command(
        name = "verifychain",
        about = "Check every block's seal, linkage and signatures"
    )]
    Verifychain,
}
