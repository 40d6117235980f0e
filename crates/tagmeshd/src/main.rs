//! `tagmeshd`: the tagmesh daemon.
//!
//! Binary entrypoint that runs a gossip node over the local statement
//! ledger, plus offline commands to edit and read it.
//!
//! # Usage
//!
//! ```text
//! tagmeshd start                             # start the node
//! tagmeshd start -c tagmesh.toml             # start with a config file
//! tagmeshd start -d ./node2                  # second instance
//! tagmeshd start --peer <endpoint_id>        # gossip with an existing node
//! tagmeshd keygen                            # create the author key
//! tagmeshd tag <infohash> anime drama        # set this author's view of a torrent
//! tagmeshd inspect <infohash> --history      # read tags from the local ledger
//! ```

mod config;
mod handler;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, SecretKey};
use tagmesh_engine::{TagNode, UpdateReport};
use tagmesh_gossip::Synchronizer;
use tagmesh_ledger::{Ledger, LedgerStore};
use tagmesh_net::{PeerSet, TAGMESH_ALPN, TagTransport, peer_id_of};
use tagmesh_resolver::Resolver;
use tagmesh_types::{AuthorId, PeerId, Predicate};
use tracing::{error, info, warn};

use config::CliConfig;
use handler::TagProtocol;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "tagmeshd", version, about = "Decentralized torrent tagging daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override data directory (useful for running multiple instances).
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gossip node.
    Start {
        /// Peer node(s) to gossip with.
        ///
        /// Format: `<endpoint_id>` or `<endpoint_id>@<host:port>`.
        /// Can be specified multiple times.
        #[arg(short, long)]
        peer: Vec<String>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },

    /// Generate the author signing key (`author.key`).
    Keygen {
        /// Replace an existing key.
        #[arg(long)]
        force: bool,
    },

    /// Set this author's tags on a torrent. Run while the node is stopped;
    /// the next gossip round announces the new statements.
    Tag {
        /// 40-character hex infohash.
        infohash: String,
        /// The complete desired tag set. Omit to remove every tag.
        tags: Vec<String>,
    },

    /// Print the tags of a torrent from the local ledger.
    Inspect {
        /// 40-character hex infohash.
        infohash: String,

        /// Also print every statement, newest clock last per edge.
        #[arg(long)]
        history: bool,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }

    match cli.command {
        Commands::Start { peer, memory } => {
            // CLI peers replace config peers.
            if !peer.is_empty() {
                config.node.peers = peer;
            }
            cmd_start(config, memory).await
        }
        Commands::Keygen { force } => {
            let key = create_author_key(&config.node.data_dir, force)?;
            println!("{}", author_of(&key));
            Ok(())
        }
        Commands::Tag { infohash, tags } => {
            let report = cmd_tag(&config, &infohash, &tags).await?;
            if report.is_empty() {
                println!("No change");
            }
            for tag in &report.added {
                println!("+ {tag}");
            }
            for tag in &report.removed {
                println!("- {tag}");
            }
            Ok(())
        }
        Commands::Inspect { infohash, history } => cmd_inspect(&config, &infohash, history),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// tagmeshd start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig, memory: bool) -> Result<()> {
    info!("starting tagmeshd");
    info!(
        data_dir = %config.node.data_dir.display(),
        memory,
        interval_ms = config.gossip_interval().as_millis() as u64,
        "node configuration"
    );
    let gossip_config = config.gossip_config()?;

    // --- Ledger ---
    let store = if memory {
        LedgerStore::in_memory()
    } else {
        std::fs::create_dir_all(&config.node.data_dir)
            .context("failed to create data directory")?;
        open_store(&config.node.data_dir)?
    };
    let ledger = Arc::new(Ledger::new(store));
    info!(
        statements = ledger.len()?,
        last_seq = ledger.last_seq(),
        "ledger ready"
    );
    let resolver = Arc::new(Resolver::with_policy(
        ledger,
        config.policy(),
        config.cache_entries(),
    ));

    // --- Network identity (iroh SecretKey) ---
    let secret_key = if memory {
        let key = SecretKey::from(random_bytes());
        info!("generated ephemeral node key (memory mode)");
        key
    } else {
        load_or_create_secret_key(&config.node.data_dir)?
    };

    // --- Network transport (iroh QUIC) ---
    // The Router runs the accept loop; the TagTransport only dials out.
    let endpoint = Endpoint::builder()
        .secret_key(secret_key)
        .alpns(vec![TAGMESH_ALPN.to_vec()])
        .relay_mode(iroh::RelayMode::Default)
        .bind()
        .await
        .context("failed to bind iroh endpoint")?;
    let transport = Arc::new(TagTransport::from_endpoint(endpoint.clone()));

    info!(endpoint_id = %endpoint.id().fmt_short(), "iroh endpoint ready");
    for addr in endpoint.addr().ip_addrs() {
        info!(%addr, "listening on");
    }

    // --- Bootstrap peers ---
    let peers = Arc::new(PeerSet::new());
    for peer_str in &config.node.peers {
        match parse_peer(peer_str) {
            Ok((addr, peer)) => {
                transport.add_peer_addr(addr).await;
                peers.insert(peer);
                info!(%peer, "added bootstrap peer");
            }
            Err(e) => warn!(peer = %peer_str, "skipping invalid peer: {e:#}"),
        }
    }

    // --- Gossip ---
    let sync = Arc::new(Synchronizer::new(
        resolver,
        transport.clone(),
        peers.clone(),
        gossip_config,
    ));

    let protocol = TagProtocol::new(sync.clone(), peers, transport.clone());
    let router = Router::builder(endpoint.clone())
        .accept(TAGMESH_ALPN, protocol)
        .spawn();

    info!("to gossip with this node: tagmeshd start --peer {}", endpoint.id());

    let gossip = tokio::spawn(sync.run(config.gossip_interval()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    gossip.abort();

    // Stops accepting connections, waits for in-flight handlers, then
    // closes the endpoint.
    router.shutdown().await.context("router shutdown failed")?;
    transport.close().await;

    Ok(())
}

// -----------------------------------------------------------------------
// Offline commands
// -----------------------------------------------------------------------

fn open_store(data_dir: &Path) -> Result<LedgerStore> {
    let path = data_dir.join("ledger");
    LedgerStore::open(&path).map_err(|e| {
        error!(path = %path.display(), %e, "failed to open ledger");
        anyhow::anyhow!(
            "cannot open ledger at {}. Is the node running? ({e})",
            path.display(),
        )
    })
}

/// Open the on-disk ledger behind a [`TagNode`] with no networking.
fn open_node(config: &CliConfig) -> Result<TagNode> {
    std::fs::create_dir_all(&config.node.data_dir).context("failed to create data directory")?;
    let ledger = Arc::new(Ledger::new(open_store(&config.node.data_dir)?));
    let resolver = Resolver::with_policy(ledger, config.policy(), config.cache_entries());
    Ok(TagNode::new(Arc::new(resolver)))
}

async fn cmd_tag(config: &CliConfig, infohash: &str, tags: &[String]) -> Result<UpdateReport> {
    let key = load_author_key(&config.node.data_dir)?;
    let node = open_node(config)?;
    let report = node
        .update_tags(infohash, Predicate::Tag, tags, &key)
        .await
        .with_context(|| format!("failed to tag {infohash}"))?;
    Ok(report)
}

fn cmd_inspect(config: &CliConfig, infohash: &str, history: bool) -> Result<()> {
    let node = open_node(config)?;
    let tags = node.get_suggestions(infohash, Predicate::Tag)?;
    println!("Tags: {}", tags.len());
    for tag in &tags {
        println!("  {tag}");
    }

    if history {
        let statements = node.history(infohash, Predicate::Tag)?;
        println!("Statements: {}", statements.len());
        for s in &statements {
            println!(
                "  {} {} clock={} author={}",
                s.operation, s.object, s.clock, s.creator
            );
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Networking helpers
// -----------------------------------------------------------------------

/// Parse a peer node string.
///
/// Formats:
/// - `<endpoint_id>`: hex-encoded 32-byte public key (iroh relay used for discovery)
/// - `<endpoint_id>@<host:port>`: with an explicit direct address
fn parse_peer(s: &str) -> Result<(EndpointAddr, PeerId)> {
    let (id_str, addr_str) = match s.split_once('@') {
        Some((id, addr)) => (id, Some(addr)),
        None => (s, None),
    };

    let endpoint_id: iroh::EndpointId = id_str
        .parse()
        .context("invalid endpoint ID (expected hex-encoded public key)")?;

    let mut endpoint_addr = EndpointAddr::new(endpoint_id);
    if let Some(addr) = addr_str {
        let socket_addr: SocketAddr = addr
            .parse()
            .context("invalid socket address in peer (expected host:port)")?;
        endpoint_addr = endpoint_addr.with_ip_addr(socket_addr);
    }

    Ok((endpoint_addr, peer_id_of(&endpoint_id)))
}

// -----------------------------------------------------------------------
// Key management
// -----------------------------------------------------------------------

fn random_bytes() -> [u8; 32] {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

fn read_key_file(path: &Path) -> Result<[u8; 32]> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    anyhow::ensure!(
        bytes.len() == 32,
        "{} must be exactly 32 bytes",
        path.display()
    );
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Load or create a persistent iroh secret key from `data_dir/node.key`.
///
/// Each data directory gets its own stable network identity.
fn load_or_create_secret_key(data_dir: &Path) -> Result<SecretKey> {
    let key_path = data_dir.join("node.key");
    if key_path.exists() {
        let key = SecretKey::from_bytes(&read_key_file(&key_path)?);
        info!(
            endpoint_id = %key.public().fmt_short(),
            "loaded existing node key"
        );
        Ok(key)
    } else {
        let key = SecretKey::from(random_bytes());
        std::fs::write(&key_path, key.to_bytes()).context("failed to write node.key")?;
        info!(
            path = %key_path.display(),
            endpoint_id = %key.public().fmt_short(),
            "generated new node key"
        );
        Ok(key)
    }
}

fn author_of(key: &SigningKey) -> AuthorId {
    AuthorId::from(key.verifying_key().to_bytes())
}

/// Write a new author key to `data_dir/author.key`.
///
/// The author key signs statements and is separate from the node key, so
/// moving a data directory to another machine keeps the author.
fn create_author_key(data_dir: &Path, force: bool) -> Result<SigningKey> {
    let key_path = data_dir.join("author.key");
    anyhow::ensure!(
        force || !key_path.exists(),
        "{} already exists (use --force to replace it)",
        key_path.display()
    );
    std::fs::create_dir_all(data_dir).context("failed to create data directory")?;
    let key = SigningKey::from_bytes(&random_bytes());
    std::fs::write(&key_path, key.to_bytes()).context("failed to write author.key")?;
    info!(path = %key_path.display(), author = %author_of(&key), "generated author key");
    Ok(key)
}

fn load_author_key(data_dir: &Path) -> Result<SigningKey> {
    let key_path = data_dir.join("author.key");
    anyhow::ensure!(
        key_path.exists(),
        "no author key at {} (run `tagmeshd keygen` first)",
        key_path.display()
    );
    Ok(SigningKey::from_bytes(&read_key_file(&key_path)?))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
