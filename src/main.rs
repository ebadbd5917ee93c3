use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use qledger::consensus::{Ledger, LedgerError};
use qledger::core::{Address, AddressKind, Transaction};
use qledger::crypto::{SchemeRegistry, SignatureType};
use qledger::LedgerConfig;

#[derive(Parser)]
#[command(name = "qledger")]
#[command(about = "QLEDGER - Proof-of-work ledger with classical and post-quantum signatures", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./qledger.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding chain.json and mempool.json
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the configured mining difficulty
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show chain head, mempool size and validity
    Status,

    /// Validate the chain
    Validate,

    /// Mine pending transactions into a new block (Ctrl-C cancels)
    Mine {
        /// Address credited with the mining reward
        #[arg(short, long)]
        miner: Address,
    },

    /// Show the balance of an address
    Balance { address: Address },

    /// Show confirmed and pending transactions of an address
    History { address: Address },

    /// Look up a transaction by hash
    Tx { hash: String },

    /// Show a block by index or hash
    Block { id: String },

    /// Show signature-type and value distribution
    Metrics,

    /// Generate a key pair and write it to a key file
    Keygen {
        /// classical, falcon or dilithium
        #[arg(short, long, default_value = "falcon")]
        scheme: SignatureType,

        /// Key file to write
        #[arg(short, long, default_value = "key.json")]
        out: PathBuf,
    },

    /// Sign a transfer with a key file and submit it to the mempool
    Send {
        /// Key file produced by `keygen`
        #[arg(short, long, default_value = "key.json")]
        key: PathBuf,
        /// Recipient address
        #[arg(short, long)]
        to: Address,
        /// Amount to send
        #[arg(short, long)]
        amount: u64,
    },
}

/// On-disk key pair, hex encoded
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    signature_type: SignatureType,
    address: Address,
    public_key: String,
    secret_key: Zeroizing<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = LedgerConfig::load_with_overrides(cli.config, cli.data_dir, cli.difficulty)
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    // Keygen needs no ledger
    if let Commands::Keygen { scheme, out } = &cli.command {
        return keygen(*scheme, out);
    }

    let ledger = Arc::new(Ledger::new(config).map_err(|e| format!("Failed to open ledger: {}", e))?);

    match cli.command {
        Commands::Status => {
            let status = ledger.get_status();
            println!("╔═══════════════════════════════════════════════════════════════╗");
            println!("║                     QLEDGER STATUS                            ║");
            println!("╚═══════════════════════════════════════════════════════════════╝");
            println!("Chain Length:         {} blocks", status.chain_length);
            println!("Head:                 #{} {}", status.head_index, status.head_hash);
            println!("Head Timestamp:       {}", status.head_timestamp);
            println!("Pending Transactions: {}", status.pending_transactions);
            if status.in_flight_transactions > 0 {
                println!("Being Mined:          {}", status.in_flight_transactions);
            }
            println!("Difficulty:           {}", status.difficulty);
            println!("Mining Reward:        {}", status.mining_reward);
            println!("Valid:                {}", if status.is_valid { "✅ yes" } else { "❌ no" });
        }

        Commands::Validate => {
            println!("🔍 Validating chain...");
            if ledger.is_valid() {
                println!("✅ Chain is VALID");
            } else {
                return Err("Chain is INVALID".into());
            }
        }

        Commands::Mine { miner } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling mining");
                    on_interrupt.cancel();
                }
            });

            println!("⛏️  Mining new block...");
            let receipt = ledger
                .spawn_mining(miner, cancel)
                .await
                .map_err(|e| LedgerError::MiningTask(e.to_string()))
                .and_then(|result| result)
                .map_err(|e| format!("Mining failed: {}", e))?;

            println!("✅ Block #{} mined: {}", receipt.block_index, receipt.hash);
            println!("   Transactions: {}", receipt.transaction_count);
            println!("   Attempts:     {}", receipt.attempts_required);
            println!("   Time:         {} ms", receipt.elapsed_ms);
            println!("💰 Reward of {} credited to {}", receipt.reward, receipt.miner);
        }

        Commands::Balance { address } => {
            println!("💰 {}: {}", address, ledger.get_address_balance(&address));
        }

        Commands::History { address } => {
            let history = ledger.get_transaction_history(&address);
            if history.is_empty() {
                println!("No transactions for {}", address);
            }
            for record in history {
                let tx = &record.transaction;
                let state = match record.block_index {
                    Some(index) => format!("block #{}", index),
                    None => "pending".to_string(),
                };
                println!("{} {} -> {} {} ({})", tx.timestamp, tx.from, tx.to, tx.amount, state);
                println!("   {}", tx.tx_hash);
            }
        }

        Commands::Tx { hash } => {
            let record = ledger
                .get_transaction_by_hash(&hash)
                .ok_or_else(|| format!("Transaction {} not found", hash))?;
            print_json(&record)?;
        }

        Commands::Block { id } => {
            let block = match id.parse::<u64>() {
                Ok(index) => ledger.get_block_by_index(index),
                Err(_) => ledger.get_block_by_hash(&id),
            }
            .ok_or_else(|| format!("Block {} not found", id))?;
            print_json(&block)?;
        }

        Commands::Metrics => {
            let metrics = ledger.security_metrics();
            println!("🛡️  Signed transactions: {}", metrics.total_transactions);
            for share in &metrics.signature_shares {
                println!("   {:<10} {:>6} ({:.2}%)", share.signature_type, share.count, share.percentage);
            }
            println!("💰 Value held: {}", metrics.total_value);
            for entry in &metrics.value_by_kind {
                println!(
                    "   {:<10} {:>6} in {} addresses ({:.2}%)",
                    entry.kind.signature_type(),
                    entry.value,
                    entry.funded_addresses,
                    entry.percentage
                );
            }
            println!("⚠️  Quantum-vulnerable value: {:.2}%", metrics.classical_value_percent);
        }

        Commands::Send { key, to, amount } => {
            let key_file = read_key_file(&key)?;
            let balance = ledger.get_address_balance(&key_file.address);
            if balance < i128::from(amount) {
                return Err(format!(
                    "Insufficient balance: {} holds {}, tried to send {}",
                    key_file.address, balance, amount
                ));
            }

            let public_key = hex::decode(&key_file.public_key).map_err(|e| format!("Bad public key: {}", e))?;
            let secret_key =
                Zeroizing::new(hex::decode(key_file.secret_key.as_bytes()).map_err(|e| format!("Bad secret key: {}", e))?);

            let registry = SchemeRegistry::with_defaults();
            let scheme = registry.get(key_file.signature_type).map_err(|e| e.to_string())?;
            let tx = Transaction::new_signed(&**scheme, &public_key, &secret_key, to, amount)
                .map_err(|e| format!("Signing failed: {}", e))?;
            let hash = tx.tx_hash.clone();

            ledger
                .add_transaction(tx)
                .map_err(|e| format!("Transaction failed: {}", e))?;
            println!("✅ Transaction {} added to mempool", hash);
        }

        Commands::Keygen { .. } => {}
    }
    Ok(())
}

fn keygen(signature_type: SignatureType, out: &Path) -> Result<(), String> {
    let kind = AddressKind::for_signature_type(signature_type)
        .ok_or_else(|| format!("Cannot generate keys for {}", signature_type))?;
    let registry = SchemeRegistry::with_defaults();
    let scheme = registry.get(signature_type).map_err(|e| e.to_string())?;
    let keys = scheme.generate_keypair();

    let key_file = KeyFile {
        signature_type,
        address: Address::from_public_key(kind, &keys.public_key),
        public_key: hex::encode(&keys.public_key),
        secret_key: Zeroizing::new(hex::encode(keys.secret_key())),
    };
    write_key_file(out, &key_file)?;

    println!("🔐 {} key pair written to {}", signature_type, out.display());
    println!("   Address: {}", key_file.address);
    Ok(())
}

/// Create `path` and write the key file; an existing file is never replaced
fn write_key_file(path: &Path, key_file: &KeyFile) -> Result<(), String> {
    let json = Zeroizing::new(serde_json::to_string_pretty(key_file).map_err(|e| e.to_string())?);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => format!("{} already exists", path.display()),
            _ => format!("Failed to create {}: {}", path.display(), e),
        })?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

fn read_key_file(path: &Path) -> Result<KeyFile, String> {
    let json = Zeroizing::new(
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
    );
    serde_json::from_str(&json).map_err(|e| format!("Malformed key file {}: {}", path.display(), e))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qledger::crypto::{FalconScheme, SignatureScheme};
    use tempfile::TempDir;

    fn sample_key_file() -> KeyFile {
        let keys = FalconScheme.generate_keypair();
        KeyFile {
            signature_type: SignatureType::Falcon,
            address: Address::from_public_key(AddressKind::Falcon, &keys.public_key),
            public_key: hex::encode(&keys.public_key),
            secret_key: Zeroizing::new(hex::encode(keys.secret_key())),
        }
    }

    #[test]
    fn test_key_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("key.json");
        let key_file = sample_key_file();

        write_key_file(&path, &key_file).unwrap();
        let loaded = read_key_file(&path).unwrap();
        assert_eq!(loaded.address, key_file.address);
        assert_eq!(*loaded.secret_key, *key_file.secret_key);
    }

    #[test]
    fn test_key_file_never_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("key.json");
        let first = sample_key_file();
        write_key_file(&path, &first).unwrap();

        let err = write_key_file(&path, &sample_key_file()).unwrap_err();
        assert!(err.contains("already exists"));
        assert_eq!(read_key_file(&path).unwrap().address, first.address);
    }
}
