use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use transit_broker::BrokerRuntimeConfig;
use transit_broker::config::StorageKind;
use transit_core::CacheConfigRequest;

#[derive(Parser)]
#[command(name = "greentic-transit", version, about = "Transit engine mount runner")]
struct BrokerArgs {
    #[command(flatten)]
    mount: MountArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct MountArgs {
    /// Storage backend: `memory` or `file`
    #[arg(long, env = "GREENTIC_TRANSIT_STORAGE", default_value = "file")]
    storage: String,
    /// Root directory for file storage
    #[arg(long, env = "GREENTIC_TRANSIT_STORAGE_PATH")]
    storage_path: Option<PathBuf>,
    /// Never cache decoded policies
    #[arg(long)]
    caching_disabled: bool,
    /// Number of per-name lock shards
    #[arg(long)]
    lock_shards: Option<usize>,
    /// Override NATS URL for invalidations
    #[arg(long)]
    nats_url: Option<String>,
    /// Override NATS invalidation subject
    #[arg(long)]
    nats_subject: Option<String>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Serve invalidations until interrupted (default)
    Serve,
    /// Inspect or change the cache configuration
    #[command(subcommand)]
    CacheConfig(CacheConfigCommand),
}

#[derive(Subcommand)]
enum CacheConfigCommand {
    /// Print the live cache configuration
    Show,
    /// Configure a new cache of the given type and size
    Set {
        /// `unlimited` or `lru`
        cache_type: String,
        /// Maximum number of cached policies (required for `lru`)
        #[arg(long)]
        size: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("greentic-transit exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = BrokerArgs::parse();
    transit_broker::telemetry::init(&args.mount.log)?;
    let config = runtime_config(&args.mount)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => transit_broker::run(config).await,
        Command::CacheConfig(CacheConfigCommand::Show) => {
            let view = transit_broker::show_cache_config(&config).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::CacheConfig(CacheConfigCommand::Set { cache_type, size }) => {
            let request = CacheConfigRequest {
                cache_type,
                cache_size: size,
            };
            let view = transit_broker::set_cache_config(&config, &request).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
    }
}

fn runtime_config(args: &MountArgs) -> anyhow::Result<BrokerRuntimeConfig> {
    let storage = StorageKind::parse(&args.storage, args.storage_path.clone())?;
    let mut config = BrokerRuntimeConfig::new(storage);
    if args.caching_disabled {
        config.caching_disabled = Some(true);
    }
    config.lock_shards = args.lock_shards;
    config.nats_url = args.nats_url.clone();
    config.nats_subject = args.nats_subject.clone();
    Ok(config)
}
