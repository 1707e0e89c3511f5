//! Coordinator process entry point.

use concord::config::CoordinatorConfig;
use concord::logging::init_tracing;
use concord::rpc::twopc::two_phase_commit_coordinator_server::TwoPhaseCommitCoordinatorServer;
use concord::twopc::Coordinator;
use tower_http::trace::TraceLayer;
use tracing::info;

fn main() -> anyhow::Result<()> {
    concord::runtime::build()?.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = CoordinatorConfig::from_env()?;
    let addr = format!("0.0.0.0:{}", config.port).parse()?;

    info!(
        port = config.port,
        participants = config.participant_addresses.len(),
        "starting coordinator"
    );

    let coordinator = Coordinator::new(config.participant_addresses);

    tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(TwoPhaseCommitCoordinatorServer::new(coordinator))
        .serve(addr)
        .await?;

    Ok(())
}
