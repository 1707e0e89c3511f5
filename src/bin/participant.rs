//! 2PC participant process entry point.
//!
//! Hosts both the voting-phase and decision-phase gRPC services on their
//! own ports behind a single shared [`Participant`], matching §6's
//! `VOTING_PORT`/`DECISION_PORT` configuration.

use concord::config::ParticipantConfig;
use concord::logging::init_tracing;
use concord::rpc::twopc::participant_decision_phase_server::ParticipantDecisionPhaseServer;
use concord::rpc::twopc::participant_voting_phase_server::ParticipantVotingPhaseServer;
use concord::twopc::validator::ValidatorRegistry;
use concord::twopc::Participant;
use tower_http::trace::TraceLayer;
use tracing::info;

fn main() -> anyhow::Result<()> {
    concord::runtime::build()?.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = ParticipantConfig::from_env()?;
    let voting_addr = format!("0.0.0.0:{}", config.voting_port).parse()?;
    let decision_addr = format!("0.0.0.0:{}", config.decision_port).parse()?;

    info!(
        participant_id = %config.participant_id,
        service_name = %config.service_name,
        voting_port = config.voting_port,
        decision_port = config.decision_port,
        "starting participant"
    );

    let participant = Participant::new(
        config.participant_id,
        config.service_name,
        ValidatorRegistry::with_default_services(),
    );

    let voting_server = tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(ParticipantVotingPhaseServer::new(participant.clone()))
        .serve(voting_addr);

    let decision_server = tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(ParticipantDecisionPhaseServer::new(participant))
        .serve(decision_addr);

    tokio::try_join!(voting_server, decision_server)?;

    Ok(())
}
