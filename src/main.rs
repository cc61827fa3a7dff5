use clap::Parser;
use data_encoding::HEXLOWER;
use log::LevelFilter;
use lumen_chain::core::{Blockchain, ProofOfWork, Transaction};
use lumen_chain::error::{ChainError, Result};
use lumen_chain::network::{send_tx, Server, CENTRAL_NODE};
use lumen_chain::storage::UTXOSet;
use lumen_chain::wallet::{pub_key_hash_from_address, validate_address, Wallets};
use lumen_chain::{Command, Opt, GLOBAL_CONFIG};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn node_id() -> Result<String> {
    GLOBAL_CONFIG
        .get_node_id()
        .ok_or_else(|| ChainError::Io("NODE_ID is not set".to_string()))
}

fn run_command(command: Command) -> Result<()> {
    let node_id = node_id()?;

    match command {
        Command::Createchain { addr } => {
            if !validate_address(&addr) {
                return Err(ChainError::InvalidAddress(addr));
            }
            let blockchain = Blockchain::create_blockchain(&addr, &node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new(&node_id)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::Listaddr => {
            let wallets = Wallets::new(&node_id)?;
            for (idx, address) in wallets.get_addresses().iter().enumerate() {
                println!("#{idx}: {address}");
            }
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let mut iterator = blockchain.iterator();
            while let Some(block) = iterator.next() {
                println!("Height:    {}", block.get_height());
                println!("Timestamp: {}", block.get_timestamp());
                println!(
                    "Prev hash: {}",
                    HEXLOWER.encode(block.get_prev_block_hash())
                );
                println!("Hash:      {}", block.get_hash_hex());
                println!("PoW valid: {}", ProofOfWork::validate(&block));
                println!();
            }
        }
        Command::Printtx { block, tx } => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let transaction = blockchain.get_tx(block, tx)?;
            println!("{transaction}");
        }
        Command::Printalltxs => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let mut block_idx = blockchain.get_block_count();
            let mut iterator = blockchain.iterator();
            while let Some(block) = iterator.next() {
                block_idx -= 1;
                println!("== Block #{block_idx} ==");
                for transaction in block.get_transactions() {
                    println!("{transaction}");
                }
            }
        }
        Command::Getblocknum => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            println!("{}", blockchain.get_block_count());
        }
        Command::Send {
            src,
            dst,
            amount,
            mine,
        } => {
            if !validate_address(&src) {
                return Err(ChainError::InvalidAddress(src));
            }
            if !validate_address(&dst) {
                return Err(ChainError::InvalidAddress(dst));
            }

            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let wallets = Wallets::new(&node_id)?;
            let wallet = wallets
                .get_wallet(&src)
                .ok_or_else(|| ChainError::Wallet(format!("no wallet for address {src}")))?;
            let tx = Transaction::new_utxo_tx(wallet, &dst, amount, &utxo_set)?;

            if mine {
                let coinbase =
                    Transaction::new_coinbase_tx(&src, vec![], blockchain.current_reward())?;
                let block = blockchain.mine_block(&[coinbase, tx])?;
                utxo_set.update(&block)?;
            } else {
                send_tx(CENTRAL_NODE, &tx)?;
            }
            println!("Success!");
        }
        Command::Getbalance { addr } => {
            let pub_key_hash = pub_key_hash_from_address(&addr)?;
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            let balance: u64 = utxo_set
                .find_utxo(&pub_key_hash)?
                .iter()
                .map(|out| out.get_value())
                .sum();
            println!("Balance of '{addr}': {balance}");
        }
        Command::Rebuildutxo => {
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!(
                "Done! {} transactions in the UTXO set.",
                utxo_set.count_transactions()?
            );
        }
        Command::Startnode { miner } => {
            if let Some(ref addr) = miner {
                if !validate_address(addr) {
                    return Err(ChainError::InvalidAddress(addr.clone()));
                }
                println!("Mining is on; rewards go to {addr}");
                GLOBAL_CONFIG.set_mining_addr(addr.clone());
            }
            let blockchain = Blockchain::open_blockchain(&node_id)?;
            let server = Server::new(blockchain, GLOBAL_CONFIG.get_node_addr(), miner);
            server.run()?;
        }
    }
    Ok(())
}
