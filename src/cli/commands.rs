use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "lumen-chain", about = "A pedagogical UTXO blockchain node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

/// Every command works against the node selected by the `NODE_ID`
/// environment variable.
#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "createchain",
        about = "Create the chain and pay the genesis reward to ADDR"
    )]
    Createchain {
        #[arg(long = "addr", help = "The address receiving the genesis coinbase")]
        addr: String,
    },
    #[command(name = "createwallet", about = "Generate a wallet and print its address")]
    Createwallet,
    #[command(name = "listaddr", about = "List the addresses in the local wallet file")]
    Listaddr,
    #[command(name = "printchain", about = "Print every block, newest first")]
    Printchain,
    #[command(name = "printtx", about = "Print one transaction of one block")]
    Printtx {
        #[arg(short = 'b', long = "block", help = "Block index counted from the tip")]
        block: u64,
        #[arg(short = 't', long = "tx", help = "Transaction index inside that block")]
        tx: usize,
    },
    #[command(name = "printalltxs", about = "Print every transaction of every block")]
    Printalltxs,
    #[command(name = "getblocknum", about = "Print the number of blocks in the chain")]
    Getblocknum,
    #[command(name = "send", about = "Transfer coins between addresses")]
    Send {
        #[arg(long = "src", help = "Source wallet address")]
        src: String,
        #[arg(long = "dst", help = "Destination wallet address")]
        dst: String,
        #[arg(long, help = "Amount to transfer in base units")]
        amount: u64,
        #[arg(long, help = "Mine the transaction locally instead of broadcasting")]
        mine: bool,
    },
    #[command(name = "getbalance", about = "Sum the unspent outputs of an address")]
    Getbalance {
        #[arg(long = "addr", help = "The address to query")]
        addr: String,
    },
    #[command(name = "rebuildutxo", about = "Rebuild the UTXO index from the chain")]
    Rebuildutxo,
    #[command(name = "startnode", about = "Join the network and serve the peer protocol")]
    Startnode {
        #[arg(long, help = "Enable mining and send rewards to this address")]
        miner: Option<String>,
    },
}
