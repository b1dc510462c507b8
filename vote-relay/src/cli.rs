use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser};
use tracing::{info, warn};

use crate::{
    catalog::Catalog,
    coordinator::RelayConfig,
    proxy::ProxyStore,
    registry::DEFAULT_OUTBOX_CAPACITY,
    store::{MemoryStore, VoteStore},
    tally::DEFAULT_FIND_LIMIT,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay live poll tallies over WebSockets", long_about = None)]
pub struct Cli {
    /// Interface to bind the HTTP and WebSocket listener to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// JSON file holding the poll catalog. The built-in polls are used when absent.
    #[arg(long, env = "POLL_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Frames queued per connection before further frames to it are dropped.
    #[arg(long = "outbox-capacity", default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Base URL of the resource proxy. Votes are kept in memory when absent.
    #[arg(long = "store-url", env = "STORE_GATEWAY_URL")]
    pub url: Option<String>,

    /// Project key sent with every store request.
    #[arg(long = "store-key", env = "STORE_API_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Collection holding vote records.
    #[arg(long = "store-collection", default_value = "votes")]
    pub collection: String,

    /// Maximum records read when tallying a poll.
    #[arg(long = "find-limit", default_value_t = DEFAULT_FIND_LIMIT)]
    pub find_limit: usize,

    /// Deadline for each store request, in milliseconds.
    #[arg(long = "store-timeout-ms", default_value_t = 5000)]
    pub timeout_ms: u64,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => {
                let catalog = Catalog::from_path(path)?;
                info!(path = %path.display(), polls = catalog.len(), "loaded poll catalog");
                Ok(catalog)
            }
            None => Ok(Catalog::default()),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            find_limit: self.store.find_limit,
            store_timeout: Duration::from_millis(self.store.timeout_ms),
            outbox_capacity: self.outbox_capacity,
        }
    }
}

impl StoreArgs {
    pub fn build_store(&self) -> Result<Arc<dyn VoteStore>> {
        let Some(url) = &self.url else {
            warn!("no store url configured, votes will only be kept in memory");
            return Ok(Arc::new(MemoryStore::new()));
        };

        let key = self
            .key
            .as_deref()
            .context("--store-key (STORE_API_KEY) is required with --store-url")?;
        let store = ProxyStore::new(url, key, self.collection.clone())
            .context("failed to build store client")?;
        info!(
            endpoint = store.endpoint(),
            collection = %self.collection,
            "using remote vote store"
        );
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["vote-relay"]).expect("parse");
        assert_eq!(cli.store.find_limit, 1000);
        assert_eq!(cli.store.collection, "votes");
        let config = cli.relay_config();
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.outbox_capacity, 256);
    }

    #[test]
    fn remote_store_requires_key() {
        let cli = Cli::try_parse_from([
            "vote-relay",
            "--store-url",
            "https://gateway.example",
        ])
        .expect("parse");
        if cli.store.key.is_none() {
            assert!(cli.store.build_store().is_err());
        }
    }

    #[test]
    fn listen_addr_combines_bind_and_port() {
        let cli = Cli::try_parse_from(["vote-relay", "--bind", "127.0.0.1", "--port", "0"])
            .expect("parse");
        assert_eq!(cli.listen_addr(), "127.0.0.1:0".parse::<SocketAddr>().unwrap());
    }
}
