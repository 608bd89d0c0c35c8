use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::store::{checks_path, normalize_key};
use crate::util::split_list;

const DEFAULT_ETCD: &str = "http://localhost:4001";

const DEFAULT_PREFIX: &str = "urlmon";

const DEFAULT_SENSU: &str = "localhost:3030";

const DEFAULT_HANDLERS: &str = "hipchat";

const DEFAULT_PORT: u16 = 9731;

/// Process options, from flags or `URLMON_*` environment variables
#[derive(Debug, Clone, Parser)]
#[command(name = "urlmon", about = "Monitor URLs defined in etcd and report to sensu")]
pub struct Options {
    /// Etcd server url. Comma separate multiple servers
    #[arg(short, long, env = "URLMON_ETCD", default_value = DEFAULT_ETCD)]
    pub etcd: String,

    /// The prefix to use in etcd for storing check urls
    #[arg(short, long, env = "URLMON_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Librato user
    #[arg(short, long, env = "URLMON_USER")]
    pub user: Option<String>,

    /// Librato token
    #[arg(short, long, env = "URLMON_TOKEN")]
    pub token: Option<String>,

    /// The port to start the status interface on
    #[arg(short = 'P', long, env = "URLMON_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Sensu client address
    #[arg(short, long, env = "URLMON_SENSU", default_value = DEFAULT_SENSU)]
    pub sensu: String,

    /// Sensu handlers to use for alert messages. Comma separate multiples
    #[arg(short = 'H', long, env = "URLMON_HANDLERS", default_value = DEFAULT_HANDLERS)]
    pub handlers: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "URLMON_LOG_LEVEL", default_value_t = LevelFilter::INFO)]
    pub log_level: LevelFilter,
}

impl Options {
    pub fn handler_names(&self) -> Vec<String> {
        split_list(&self.handlers)
    }

    /// Watched key space
    pub fn prefix_path(&self) -> String {
        normalize_key(&self.prefix)
    }

    /// Directory holding one subtree per check
    pub fn checks_path(&self) -> String {
        checks_path(&self.prefix)
    }

    /// Metrics credentials, when both are set and non-empty
    pub fn metrics_credentials(&self) -> Option<(String, String)> {
        match (self.user.as_deref(), self.token.as_deref()) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Some((user.to_string(), token.to_string()))
            }
            _ => None,
        }
    }

    pub fn status_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
