// Command-line front end for the ledger. Each invocation opens the database, runs one
// operation and exits.
use clap::Parser;
use log::{error, LevelFilter};
use sealed_ledger::core::units_to_coins;
use sealed_ledger::{
    convert_address, hash_pub_key, open_database, Blockchain, Command, Ledger, Opt, Wallets,
    GLOBAL_CONFIG,
};
use std::process;

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Some(dir) = opt.data_dir {
        GLOBAL_CONFIG.set_data_dir(dir);
    }

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> sealed_ledger::Result<()> {
    let db = open_database(GLOBAL_CONFIG.get_data_dir()?)?;

    match command {
        Command::Createwallet => {
            let address = Wallets::open(&db)?.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::ListAddresses => {
            for address in Wallets::open(&db)?.get_addresses() {
                println!("{address}")
            }
        }
        Command::Createblockchain { address } => {
            let ledger = Ledger::open(&db, &address)?;
            println!("Done! Tip: {}", ledger.blockchain().get_tip_hash());
        }
        Command::GetBalance { address } => {
            let balance = Ledger::load(&db)?.get_balance(&address)?;
            println!("Balance of {address}: {balance}");
        }
        Command::Send { from, to, amount } => {
            let block = Ledger::load(&db)?.transfer(&from, &to, amount)?;
            println!("Success! Block {}", block.get_hash())
        }
        Command::Printchain => {
            for block in Blockchain::load(&db)?.iterator() {
                let block = block?;
                println!("Pre block hash: {}", block.get_pre_block_hash());
                println!("Cur block hash: {}", block.get_hash());
                println!("Cur block Timestamp: {}", block.get_timestamp());
                println!("Nonce: {}", block.get_nonce());

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", tx.get_id_hex());
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let address = convert_address(&hash_pub_key(input.get_pub_key()));
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                input.get_txid_hex(),
                                input.get_vout(),
                                address,
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            units_to_coins(output.get_value()),
                            convert_address(output.get_pub_key_hash()),
                        )
                    }
                }
                println!()
            }
        }
        Command::Verifychain => {
            let count = Blockchain::load(&db)?.verify_chain()?;
            println!("Chain is valid: {count} blocks checked");
        }
    }
    Ok(())
}
