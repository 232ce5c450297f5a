use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use casework_api::crypto::{fingerprint, generate_private_key_pem};
use casework_api::storage::{LocalStorage, Storage};

#[derive(Parser)]
#[command(name = "casework-keygen")]
#[command(about = "Generate an RSA private key for the Casework keychain")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Key directory (the server's keychain path)")]
    dir: String,

    #[arg(long, default_value_t = 2048, help = "RSA modulus size in bits")]
    bits: usize,

    #[arg(long, default_value = ".pem", help = "Key file suffix")]
    suffix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if cli.bits < 2048 {
        bail!("refusing to generate a key smaller than 2048 bits");
    }

    let storage = LocalStorage::new(&cli.dir)
        .await
        .with_context(|| format!("cannot open key directory {}", cli.dir))?;

    // Newest key wins, so the name must not collide with an existing one
    let name = format!("{}{}", Utc::now().timestamp(), cli.suffix);
    if storage.ls("").await?.iter().any(|entry| entry.name == name) {
        bail!("{} already exists, try again in a second", name);
    }

    let pem = generate_private_key_pem(cli.bits)?;
    storage.save(&name, pem.as_bytes()).await?;

    println!("{}", fingerprint(pem.as_bytes()));
    eprintln!("Wrote {}/{}", cli.dir.trim_end_matches('/'), name);
    Ok(())
}
