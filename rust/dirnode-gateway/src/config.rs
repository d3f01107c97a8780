//! Configuration management for the directory node process.

use std::env;
use std::time::Duration;

/// `STORE_PROVIDER` selects the content-addressed backend (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreProvider {
    Oci,
    LocalFs,
}

/// Nested OCI auth options, `AUTH_CONFIG_*` (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct OciAuthConfig {
    pub insecure: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Where the content-addressed store persists records (spec.md §6
/// "Persisted state layout"). Nested under `STORE_PROVIDER` rather than
/// flattened, since only one branch is ever relevant to a given deployment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub oci_registry: String,
    pub oci_repository: String,
    pub localfs_root: String,
}

/// `AUTHN_MODE` (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthnMode {
    Jwt,
    X509,
    Mtls,
}

#[derive(Debug, Clone)]
pub struct AuthnConfig {
    pub enabled: bool,
    pub mode: AuthnMode,
    pub socket_path: Option<String>,
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub enabled: bool,
    pub trust_domain: String,
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub listen_address: String,
    pub bootstrap_peers: Vec<String>,
    pub key_path: Option<String>,
    pub datastore_dir: Option<String>,
    pub gossipsub_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub scheduler_interval: Duration,
    pub worker_count: usize,
    pub worker_timeout: Duration,
    pub registry_monitor_check_interval: Duration,
    pub registry_config_path: String,
    pub credentials_dir: String,
    pub requesting_node_id: String,
}

/// Top-level directory node configuration, assembled from the environment
/// variables named in spec.md §6. Every field has a named default so a
/// bare-environment launch is still well-defined.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: String,
    pub healthcheck_address: String,
    pub store_provider: StoreProvider,
    pub oci_auth: OciAuthConfig,
    pub store: StoreConfig,
    pub routing: RoutingConfig,
    pub sqlite_db_path: String,
    pub sync: SyncConfig,
    pub authn: AuthnConfig,
    pub authz: AuthzConfig,
}

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:7000";
pub const DEFAULT_HEALTHCHECK_ADDRESS: &str = "0.0.0.0:7001";
pub const DEFAULT_SQLITE_DB_PATH: &str = "dirnode.sqlite3";
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MONITOR_CHECK_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_OCI_REGISTRY: &str = "127.0.0.1:5000";
pub const DEFAULT_OCI_REPOSITORY: &str = "agentdir/records";
pub const DEFAULT_LOCALFS_ROOT: &str = "./dirnode-data";
pub const DEFAULT_REGISTRY_CONFIG_PATH: &str = "./registry-config.json";
pub const DEFAULT_CREDENTIALS_DIR: &str = "./dirnode-credentials";

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            healthcheck_address: DEFAULT_HEALTHCHECK_ADDRESS.to_string(),
            store_provider: StoreProvider::LocalFs,
            oci_auth: OciAuthConfig::default(),
            store: StoreConfig {
                oci_registry: DEFAULT_OCI_REGISTRY.to_string(),
                oci_repository: DEFAULT_OCI_REPOSITORY.to_string(),
                localfs_root: DEFAULT_LOCALFS_ROOT.to_string(),
            },
            routing: RoutingConfig {
                listen_address: "/ip4/0.0.0.0/tcp/0".to_string(),
                bootstrap_peers: Vec::new(),
                key_path: None,
                datastore_dir: None,
                gossipsub_enabled: true,
            },
            sqlite_db_path: DEFAULT_SQLITE_DB_PATH.to_string(),
            sync: SyncConfig {
                scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
                worker_count: DEFAULT_WORKER_COUNT,
                worker_timeout: Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS),
                registry_monitor_check_interval: Duration::from_secs(DEFAULT_MONITOR_CHECK_INTERVAL_SECS),
                registry_config_path: DEFAULT_REGISTRY_CONFIG_PATH.to_string(),
                credentials_dir: DEFAULT_CREDENTIALS_DIR.to_string(),
                requesting_node_id: uuid::Uuid::new_v4().to_string(),
            },
            authn: AuthnConfig {
                enabled: false,
                mode: AuthnMode::Mtls,
                socket_path: None,
                audiences: Vec::new(),
            },
            authz: AuthzConfig { enabled: false, trust_domain: "agentdir.example".to_string() },
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to named
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(value) = env::var("DIRECTORY_SERVER_LISTEN_ADDRESS") {
            config.listen_address = value;
        }
        if let Ok(value) = env::var("DIRECTORY_SERVER_HEALTHCHECK_ADDRESS") {
            config.healthcheck_address = value;
        }

        if let Ok(value) = env::var("STORE_PROVIDER") {
            config.store_provider = match value.to_lowercase().as_str() {
                "oci" => StoreProvider::Oci,
                "localfs" => StoreProvider::LocalFs,
                other => {
                    warn!("unrecognized STORE_PROVIDER {other:?}, defaulting to localfs");
                    StoreProvider::LocalFs
                }
            };
        }

        config.oci_auth = OciAuthConfig {
            insecure: env_flag("AUTH_CONFIG_INSECURE"),
            username: env::var("AUTH_CONFIG_USERNAME").ok(),
            password: env::var("AUTH_CONFIG_PASSWORD").ok(),
            access_token: env::var("AUTH_CONFIG_ACCESS_TOKEN").ok(),
            refresh_token: env::var("AUTH_CONFIG_REFRESH_TOKEN").ok(),
        };

        if let Ok(value) = env::var("STORE_OCI_REGISTRY") {
            config.store.oci_registry = value;
        }
        if let Ok(value) = env::var("STORE_OCI_REPOSITORY") {
            config.store.oci_repository = value;
        }
        if let Ok(value) = env::var("STORE_LOCALFS_ROOT") {
            config.store.localfs_root = value;
        }

        if let Ok(value) = env::var("ROUTING_LISTEN_ADDRESS") {
            config.routing.listen_address = value;
        }
        if let Ok(value) = env::var("ROUTING_BOOTSTRAP_PEERS") {
            config.routing.bootstrap_peers = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
        config.routing.key_path = env::var("ROUTING_KEY_PATH").ok();
        config.routing.datastore_dir = env::var("ROUTING_DATASTORE_DIR").ok();
        if let Ok(value) = env::var("ROUTING_GOSSIPSUB_ENABLED") {
            config.routing.gossipsub_enabled = parse_bool(&value);
        }

        if let Ok(value) = env::var("DATABASE_SQLITE_DB_PATH") {
            config.sqlite_db_path = value;
        }

        if let Some(secs) = env_parsed::<u64>("SYNC_SCHEDULER_INTERVAL") {
            config.sync.scheduler_interval = Duration::from_secs(secs);
        }
        if let Some(count) = env_parsed::<usize>("SYNC_WORKER_COUNT") {
            config.sync.worker_count = count;
        }
        if let Some(secs) = env_parsed::<u64>("SYNC_WORKER_TIMEOUT") {
            config.sync.worker_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed::<u64>("SYNC_REGISTRY_MONITOR_CHECK_INTERVAL") {
            config.sync.registry_monitor_check_interval = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var("SYNC_REGISTRY_CONFIG_PATH") {
            config.sync.registry_config_path = value;
        }
        if let Ok(value) = env::var("SYNC_CREDENTIALS_DIR") {
            config.sync.credentials_dir = value;
        }
        if let Ok(value) = env::var("SYNC_REQUESTING_NODE_ID") {
            config.sync.requesting_node_id = value;
        }

        config.authn.enabled = env_flag("AUTHN_ENABLED");
        if let Ok(value) = env::var("AUTHN_MODE") {
            config.authn.mode = match value.to_lowercase().as_str() {
                "jwt" => AuthnMode::Jwt,
                "x509" => AuthnMode::X509,
                "mtls" => AuthnMode::Mtls,
                other => {
                    warn!("unrecognized AUTHN_MODE {other:?}, defaulting to mtls");
                    AuthnMode::Mtls
                }
            };
        }
        config.authn.socket_path = env::var("AUTHN_SOCKET_PATH").ok();
        if let Ok(value) = env::var("AUTHN_AUDIENCES") {
            config.authn.audiences = value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }

        config.authz.enabled = env_flag("AUTHZ_ENABLED");
        if let Ok(value) = env::var("AUTHZ_TRUST_DOMAIN") {
            config.authz.trust_domain = value;
        }

        config
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| parse_bool(&value)).unwrap_or(false)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_well_defined() {
        let config = Config::default();
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
        assert_eq!(config.store_provider, StoreProvider::LocalFs);
        assert_eq!(config.sync.worker_count, DEFAULT_WORKER_COUNT);
    }

    #[test]
    fn parse_bool_accepts_common_truthy_spellings() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
