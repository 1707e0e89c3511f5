//! Raft node process entry point.
//!
//! Hosts the peer-facing `Raft` service on `PORT` and the `RaftClient`
//! service on `CLIENT_PORT`, then starts the node's background election,
//! heartbeat, replication, and apply loops (§4.3-§4.5).

use std::sync::Arc;

use concord::config::RaftNodeConfig;
use concord::logging::init_tracing;
use concord::raft::{LoggingStateMachine, RaftNode};
use concord::rpc::raft::raft_client_server::RaftClientServer;
use concord::rpc::raft::raft_server::RaftServer;
use tower_http::trace::TraceLayer;
use tracing::info;

fn main() -> anyhow::Result<()> {
    concord::runtime::build()?.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = RaftNodeConfig::from_env()?;
    let peers = config.peers()?;
    let peer_addr = format!("0.0.0.0:{}", config.port).parse()?;
    let client_addr = format!("0.0.0.0:{}", config.client_port).parse()?;

    info!(
        node_id = %config.node_id,
        port = config.port,
        client_port = config.client_port,
        peers = peers.len(),
        "starting raft node"
    );

    let node = RaftNode::new(config.node_id.clone(), peers, Arc::new(LoggingStateMachine));
    node.start();

    let shutdown = node.clone();
    let raft_server = tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(RaftServer::new(node.clone()))
        .serve_with_shutdown(peer_addr, async {
            let _ = tokio::signal::ctrl_c().await;
        });

    let client_server = tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(RaftClientServer::new(node))
        .serve_with_shutdown(client_addr, async {
            let _ = tokio::signal::ctrl_c().await;
        });

    let result = tokio::try_join!(raft_server, client_server);
    shutdown.shutdown();
    result?;

    Ok(())
}
