//! The directory node daemon: wires configuration, storage, routing,
//! federation, search, and authn/authz into a single gRPC server
//! (spec.md §5, §6).

#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use dirnode_authn::{JwtSvidValidator, JwtTrustSource, TrustDomainPolicy};
use dirnode_db::Database;
use dirnode_gateway::config::{AuthnMode, Config, StoreProvider};
use dirnode_gateway::inspector::{NoopRegistryInspector, OciRegistryInspector};
use dirnode_gateway::remote::GrpcRemoteDirectoryClient;
use dirnode_gateway::services::{FederationCredentials, RoutingServiceImpl, SearchServiceImpl, StoreServiceImpl, SyncServiceImpl};
use dirnode_gateway::AuthnInterceptor;
use dirnode_proto::dirnode::v1::routing_service_server::RoutingServiceServer;
use dirnode_proto::dirnode::v1::search_service_server::SearchServiceServer;
use dirnode_proto::dirnode::v1::store_service_server::StoreServiceServer;
use dirnode_proto::dirnode::v1::sync_service_server::SyncServiceServer;
use dirnode_proto::FILE_DESCRIPTOR_SET;
use dirnode_routing::RoutingNode;
use dirnode_search::SearchService;
use dirnode_store::{LocalFsStore, OciStore, StoreApi};
use dirnode_sync::{Monitor, NoopLabelPublisher, RegistryInspector, Scheduler, WorkerConfig, WorkerPool};
use jsonwebtoken::{Algorithm, DecodingKey};
use oci_distribution::secrets::RegistryAuth;
use spiffe::TrustDomain;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    info!("starting directory node, listening on {}", config.listen_address);

    let db = Database::connect(&config.sqlite_db_path).await?;

    let oci_auth = registry_auth(&config);
    let store: Arc<dyn StoreApi> = match config.store_provider {
        StoreProvider::Oci => Arc::new(OciStore::new(
            &config.store.oci_registry,
            &config.store.oci_repository,
            oci_auth.clone(),
            config.oci_auth.insecure,
            db.clone(),
        )),
        StoreProvider::LocalFs => Arc::new(LocalFsStore::new(config.store.localfs_root.clone(), db.clone())),
    };

    let keypair = load_or_generate_keypair(config.routing.key_path.as_deref()).await?;
    let routing_node = Arc::new(RoutingNode::spawn(keypair, config.routing.gossipsub_enabled)?);
    routing_node.listen(config.routing.listen_address.parse()?).await?;
    if !config.routing.bootstrap_peers.is_empty() {
        let peers: Vec<libp2p::Multiaddr> = config
            .routing
            .bootstrap_peers
            .iter()
            .map(|addr| addr.parse())
            .collect::<Result<Vec<_>, _>>()?;
        routing_node.add_peers(peers).await?;
        routing_node.bootstrap().await?;
    }

    let inspector: Arc<dyn RegistryInspector> = match config.store_provider {
        StoreProvider::Oci => Arc::new(OciRegistryInspector::new(&config.store.oci_registry, oci_auth, config.oci_auth.insecure)),
        StoreProvider::LocalFs => Arc::new(NoopRegistryInspector),
    };
    let monitor = Monitor::new(
        db.clone(),
        store.clone(),
        inspector,
        Arc::new(NoopLabelPublisher),
        config.sync.worker_count,
        config.sync.registry_monitor_check_interval,
    );

    let (queue_tx, queue_rx) = tokio::sync::mpsc::channel::<dirnode_sync::SyncJob>(256);
    let scheduler = Scheduler::new(db.clone(), queue_tx, config.sync.scheduler_interval);
    let worker_config = WorkerConfig {
        worker_timeout: config.sync.worker_timeout,
        registry_config_path: PathBuf::from(&config.sync.registry_config_path),
        credentials_dir: PathBuf::from(&config.sync.credentials_dir),
        repository: config.store.oci_repository.clone(),
        requesting_node_id: config.sync.requesting_node_id.clone(),
    };
    let worker_pool = WorkerPool::new(db.clone(), Arc::new(GrpcRemoteDirectoryClient::new()), monitor, worker_config);
    worker_pool.spawn(config.sync.worker_count, queue_rx);

    let search_service = Arc::new(SearchService::new(db.clone()));

    let authz_policy = if config.authz.enabled {
        let trust_domain: TrustDomain = config
            .authz
            .trust_domain
            .parse()
            .map_err(|error| anyhow::anyhow!("invalid AUTHZ_TRUST_DOMAIN: {error}"))?;
        Some(Arc::new(TrustDomainPolicy::new(trust_domain)))
    } else {
        None
    };

    let jwt_validator = if config.authn.enabled && config.authn.mode == AuthnMode::Jwt {
        Some(Arc::new(jwt_validator_from_config(&config)?))
    } else {
        None
    };
    let authn = AuthnInterceptor::new(config.authn.enabled, config.authn.mode, jwt_validator);

    let store_service = StoreServiceImpl::new(store, authz_policy.clone());
    let routing_service = RoutingServiceImpl::new(routing_node, db.clone(), authz_policy.clone());
    let search_service = SearchServiceImpl::new(search_service, authz_policy.clone());
    let sync_service = SyncServiceImpl::new(db.clone(), federation_credentials(&config), authz_policy);

    let (health_reporter, health_service) = health_reporter();
    health_reporter.set_serving::<StoreServiceServer<StoreServiceImpl>>().await;
    health_reporter.set_serving::<RoutingServiceServer<RoutingServiceImpl>>().await;
    health_reporter.set_serving::<SearchServiceServer<SearchServiceImpl>>().await;
    health_reporter.set_serving::<SyncServiceServer<SyncServiceImpl>>().await;

    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    let listen_address: std::net::SocketAddr = config.listen_address.parse()?;
    let interceptor = authn.clone();
    let server = Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(StoreServiceServer::with_interceptor(store_service, move |request| interceptor.intercept(request)))
        .add_service({
            let interceptor = authn.clone();
            RoutingServiceServer::with_interceptor(routing_service, move |request| interceptor.intercept(request))
        })
        .add_service({
            let interceptor = authn.clone();
            SearchServiceServer::with_interceptor(search_service, move |request| interceptor.intercept(request))
        })
        .add_service({
            let interceptor = authn.clone();
            SyncServiceServer::with_interceptor(sync_service, move |request| interceptor.intercept(request))
        });

    info!("gRPC server listening on {}", config.listen_address);
    server
        .serve_with_shutdown(listen_address, async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, draining scheduler and workers");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}

fn registry_auth(config: &Config) -> RegistryAuth {
    match (&config.oci_auth.username, &config.oci_auth.password) {
        (Some(username), Some(password)) => RegistryAuth::Basic(username.clone(), password.clone()),
        _ => RegistryAuth::Anonymous,
    }
}

fn federation_credentials(config: &Config) -> FederationCredentials {
    FederationCredentials {
        remote_registry_url: format!("{}/{}", config.store.oci_registry, config.store.oci_repository),
        username: config.oci_auth.username.clone().unwrap_or_default(),
        password: config.oci_auth.password.clone().unwrap_or_default(),
    }
}

fn jwt_validator_from_config(config: &Config) -> anyhow::Result<JwtSvidValidator> {
    let secret = config
        .oci_auth
        .access_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("AUTHN_MODE=jwt requires a configured trust source key"))?;
    let source = JwtTrustSource::new(
        DecodingKey::from_secret(secret.as_bytes()),
        Algorithm::HS256,
        config.authn.audiences.clone(),
    );
    Ok(JwtSvidValidator::new(vec![source]))
}

/// Loads the persisted libp2p identity at `key_path`, generating and
/// persisting a fresh ed25519 keypair if absent (spec.md §6 `ROUTING_KEY_PATH`).
async fn load_or_generate_keypair(key_path: Option<&str>) -> anyhow::Result<libp2p::identity::Keypair> {
    let Some(key_path) = key_path else {
        return Ok(libp2p::identity::Keypair::generate_ed25519());
    };

    match tokio::fs::read(key_path).await {
        Ok(bytes) => Ok(libp2p::identity::Keypair::from_protobuf_encoding(&bytes)?),
        Err(_) => {
            let keypair = libp2p::identity::Keypair::generate_ed25519();
            if let Some(parent) = std::path::Path::new(key_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(key_path, keypair.to_protobuf_encoding()?).await?;
            Ok(keypair)
        }
    }
}
