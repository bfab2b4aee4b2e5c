//! Onion CLI: layered multi-authority encryption
//!
//! Usage:
//!   onion encrypt --authorities <N> [--text <TEXT> | --input <FILE>] [--dir <DIR>]
//!   onion encrypt --stored-keys [--text <TEXT> | --input <FILE>] [--dir <DIR>]
//!   onion decrypt [--dir <DIR>] [--output <FILE>]
//!   onion keygen  --authorities <N> [--dir <DIR>]
//!   onion inspect [--dir <DIR>]

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use onion_envelope::{
    inspect, overhead, run, EnvelopeStore, FileStore, LayerCountStore, Mode, Outcome, SessionConfig,
    DEFAULT_MODULUS_BITS,
};

/// Sequential multi-authority hybrid encryption (RSA-OAEP + AES-256-GCM)
#[derive(Parser, Debug)]
#[command(name = "onion")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate keys for N authorities and seal a message through all of them
    Encrypt {
        /// Number of authorities (layers)
        #[arg(short = 'n', long, required_unless_present = "stored_keys")]
        authorities: Option<u32>,

        /// Seal to the keys and N already in --dir (see `keygen`)
        #[arg(long, conflicts_with_all = ["authorities", "key_bits"])]
        stored_keys: bool,

        /// Text to encrypt
        #[arg(short, long, conflicts_with = "input")]
        text: Option<String>,

        /// File to encrypt (stdin if neither --text nor --input is given)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Key store directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// RSA modulus size per authority
        #[arg(long)]
        key_bits: Option<usize>,
    },

    /// Peel every layer, authority N first, using the stored keys
    Decrypt {
        /// Key store directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Also write the plaintext here ("-" for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate and store keys for N authorities without encrypting.
    /// Refused while an envelope is stored in --dir
    Keygen {
        #[arg(short = 'n', long)]
        authorities: u32,

        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        #[arg(long, default_value_t = DEFAULT_MODULUS_BITS)]
        key_bits: usize,
    },

    /// Show outer-layer metadata of the stored envelope (no decryption)
    Inspect {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

fn init_tracing() {
    let log_format = std::env::var("ONION_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "onion_envelope=info,onion=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Command::Encrypt {
            authorities,
            stored_keys,
            text,
            input,
            dir,
            key_bits,
        } => {
            let plaintext = read_plaintext(text, input)?;
            let config = if stored_keys {
                SessionConfig::encrypt_stored(plaintext, &dir)
            } else {
                let n = authorities.unwrap_or(0);
                SessionConfig::encrypt(n, plaintext, &dir)
                    .with_modulus_bits(key_bits.unwrap_or(DEFAULT_MODULUS_BITS))
            };
            cmd_encrypt(config, &dir)
        }
        Command::Decrypt { dir, output } => cmd_decrypt(dir, output),
        Command::Keygen {
            authorities,
            dir,
            key_bits,
        } => cmd_keygen(authorities, dir, key_bits),
        Command::Inspect { dir } => cmd_inspect(dir),
    }
}

fn read_plaintext(text: Option<String>, input: Option<PathBuf>) -> Result<Vec<u8>> {
    Ok(match (text, input) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(path)) => {
            fs::read(&path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("read stdin")?;
            buf
        }
    })
}

fn cmd_encrypt(config: SessionConfig, dir: &Path) -> Result<()> {
    if config.mode == Mode::Encrypt && config.authority_count == 0 {
        bail!("--authorities must be at least 1");
    }

    match run(&config)? {
        Outcome::Encrypted {
            authorities,
            envelope_len,
        } => {
            eprintln!("sealed through {authorities} authorities ({envelope_len} bytes)");
            for i in 1..=authorities {
                eprintln!("  public_{i}.pem & private_{i}.pem");
            }
            eprintln!("envelope: {}", dir.join(onion_envelope::ENVELOPE_FILE).display());
        }
        other => bail!("unexpected session outcome: {other:?}"),
    }
    Ok(())
}

fn cmd_decrypt(dir: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let config = SessionConfig::decrypt(&dir);
    let Outcome::Decrypted { plaintext } = run(&config)? else {
        bail!("unexpected session outcome");
    };

    match output {
        Some(path) if path.as_os_str() == "-" => io::stdout().write_all(&plaintext)?,
        Some(path) => {
            fs::write(&path, &plaintext).with_context(|| format!("write {}", path.display()))?;
            eprintln!("output: {}", path.display());
        }
        None => {
            println!("Result: {}", String::from_utf8_lossy(&plaintext));
        }
    }
    eprintln!("decrypted: {}", dir.join(onion_envelope::DECRYPTED_FILE).display());
    Ok(())
}

fn cmd_keygen(authorities: u32, dir: PathBuf, key_bits: usize) -> Result<()> {
    if authorities == 0 {
        bail!("--authorities must be at least 1");
    }
    let config = SessionConfig::keygen(authorities, &dir).with_modulus_bits(key_bits);
    run(&config)?;
    eprintln!("generated {authorities} keypairs in {}", dir.display());
    Ok(())
}

fn cmd_inspect(dir: PathBuf) -> Result<()> {
    let store = FileStore::new(&dir)?;
    let envelope = store.load_envelope()?;
    let layers = store.load_layer_count().ok();
    let info = inspect(&envelope).context("stored envelope has no valid outer frame")?;

    println!("Onion Envelope");
    println!("==============");
    println!("Total Size:        {} bytes", info.total_len);
    match layers {
        Some(n) => println!("Layers (config):   {n}"),
        None => println!("Layers (config):   unknown"),
    }
    println!("Outer Wrapped Key: {} bytes", info.wrapped_key_len);
    println!("Outer Payload:     {} bytes", info.inner_len);
    if let Some(n) = layers {
        let plaintext = info
            .total_len
            .saturating_sub(overhead(info.wrapped_key_len) * n as usize);
        println!("Plaintext Size:    ~{plaintext} bytes");
    }

    Ok(())
}
