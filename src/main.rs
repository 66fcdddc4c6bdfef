//! ALFA SecureStore - CLI
//!
//! Command-line access to a file-backed secure store.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde_json::Value;

use alfa_securestore::logging::{init_tracing, LogFormat};
use alfa_securestore::{
    CoreConfig, EncryptedBackupPayload, FileStore, SecureCore, SecureStorage, StorageOptions,
};

#[derive(Parser)]
#[command(name = "alfa-securestore")]
#[command(author = "ALFA SYSTEM")]
#[command(version = alfa_securestore::VERSION)]
#[command(about = "ALFA SecureStore - encrypted key/value store")]
struct Cli {
    /// Store file (defaults to the user data directory)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Namespace for storage commands
    #[arg(short, long)]
    namespace: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Passphrase (prompted if not set)
    #[arg(long, env = "ALFA_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Log output: pretty or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or unlock the master key
    Init,

    /// Store a value (JSON if it parses, otherwise a string)
    Set {
        key: String,
        value: String,

        /// Encrypt with the master key
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Print a value
    Get {
        key: String,

        #[arg(short, long)]
        encrypt: bool,
    },

    /// Remove a value
    Remove { key: String },

    /// List keys in the namespace
    Keys,

    /// Write an encrypted backup of one value
    Backup {
        key: String,

        /// Output file
        output: PathBuf,

        /// Read the value as encrypted
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Restore a backup file into a key
    Restore {
        /// Backup file
        input: PathBuf,

        key: String,

        /// Store the restored value encrypted
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Re-wrap the master key under a new passphrase
    Passwd,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_passphrase(from_env: Option<String>, prompt: &str) -> anyhow::Result<SecretString> {
    let passphrase = match from_env {
        Some(p) => p,
        None => rpassword::prompt_password(prompt).context("could not read passphrase")?,
    };
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }
    Ok(SecretString::from(passphrase))
}

fn options(encrypt: bool) -> StorageOptions {
    if encrypt {
        StorageOptions::new().encrypted()
    } else {
        StorageOptions::new()
    }
}

async fn unlock(core: &SecureCore, passphrase: Option<String>) -> anyhow::Result<()> {
    let passphrase = read_passphrase(passphrase, "Passphrase: ")?;
    core.initialize_master_key(Some(&passphrase))
        .await
        .context("could not unlock master key")?;
    Ok(())
}

fn read_value(storage: &SecureStorage, key: &str, encrypt: bool) -> anyhow::Result<Value> {
    match storage.get_with::<Value>(key, &options(encrypt)) {
        Some(value) => Ok(value),
        None => bail!("no readable value under '{}'", key),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    let store_path = cli.store.clone().unwrap_or_else(FileStore::default_path);
    let core = SecureCore::open_file(&store_path, config)?;
    let storage = core.create_secure_storage(cli.namespace.as_deref());

    match cli.command {
        Commands::Init => {
            let existed = core.manager().has_persisted_record();
            unlock(&core, cli.passphrase).await?;
            if existed {
                println!("🔓 Master key unlocked");
            } else {
                println!("🔐 Master key created at: {}", store_path.display());
            }
            println!("   Key ID: {}", core.key_id().unwrap_or_default());
        }

        Commands::Set { key, value, encrypt } => {
            if encrypt {
                unlock(&core, cli.passphrase).await?;
            }
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let result = storage.set_with(&key, &value, &options(encrypt));
            match result.error {
                None => println!("✅ Stored '{}' ({} bytes)", key, result.bytes.unwrap_or(0)),
                Some(kind) => bail!("write rejected: {}", kind),
            }
        }

        Commands::Get { key, encrypt } => {
            if encrypt {
                unlock(&core, cli.passphrase).await?;
            }
            match storage.get_raw(&key, &options(encrypt)) {
                Some(value) => println!("{}", value),
                None => bail!("no readable value under '{}'", key),
            }
        }

        Commands::Remove { key } => {
            if !storage.remove(&key) {
                bail!("could not remove '{}'", key);
            }
            println!("🗑️ Removed '{}'", key);
        }

        Commands::Keys => {
            let keys = storage.keys(None);
            if keys.is_empty() {
                println!("📭 No keys in namespace '{}'", storage.namespace());
            } else {
                println!("🔑 Keys in '{}' ({}):", storage.namespace(), keys.len());
                for key in keys {
                    println!("   {}", key);
                }
            }
        }

        Commands::Backup { key, output, encrypt } => {
            unlock(&core, cli.passphrase).await?;
            let value = read_value(&storage, &key, encrypt)?;
            let payload = core.create_backup(&value)?;
            std::fs::write(&output, payload.to_json()?)?;
            println!("💾 Backup of '{}' written to: {}", key, output.display());
        }

        Commands::Restore { input, key, encrypt } => {
            unlock(&core, cli.passphrase).await?;
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("could not read {}", input.display()))?;
            let payload = EncryptedBackupPayload::<Value>::from_json(&json)?;
            let value = core.restore_backup(&payload)?;

            let result = storage.set_with(&key, &value, &options(encrypt));
            if let Some(kind) = result.error {
                bail!("write rejected: {}", kind);
            }
            println!("♻️ Restored '{}' from: {}", key, input.display());
        }

        Commands::Passwd => {
            unlock(&core, cli.passphrase).await?;
            let new_passphrase = read_passphrase(
                std::env::var("ALFA_NEW_PASSPHRASE").ok(),
                "New passphrase: ",
            )?;
            core.change_passphrase(&new_passphrase).await?;
            println!("✅ Passphrase changed");
        }
    }

    Ok(())
}
