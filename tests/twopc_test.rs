//! End-to-end 2PC scenarios (§8 of the spec): a coordinator driving three
//! real participant processes over loopback gRPC.

use std::time::Duration;

use concord::rpc::twopc::participant_decision_phase_server::ParticipantDecisionPhaseServer;
use concord::rpc::twopc::participant_voting_phase_server::ParticipantVotingPhaseServer;
use concord::rpc::twopc::two_phase_commit_coordinator_server::TwoPhaseCommitCoordinator as CoordinatorService;
use concord::rpc::twopc::TransactionRequest;
use concord::twopc::validator::{AlwaysAbort, AlwaysCommit, ValidatorRegistry};
use concord::twopc::types::CoordinatorStatus;
use concord::twopc::{Coordinator, Participant};
use tonic::transport::Server;
use tonic::Request;

fn registry_with(service: &str, commit: bool) -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    if commit {
        registry.register(service, Box::new(AlwaysCommit));
    } else {
        registry.register(service, Box::new(AlwaysAbort::new("forced abort for test")));
    }
    registry
}

/// Starts a participant's voting and decision endpoints on the given ports
/// and returns its address pair (`voting_addr`, `decision_addr`).
async fn start_participant(
    participant_id: &str,
    service_name: &str,
    commit: bool,
    voting_port: u16,
    decision_port: u16,
) -> (String, String) {
    let participant = Participant::new(
        participant_id.to_string(),
        service_name.to_string(),
        registry_with(service_name, commit),
    );

    let voting_addr: std::net::SocketAddr = format!("127.0.0.1:{voting_port}").parse().unwrap();
    let decision_addr: std::net::SocketAddr = format!("127.0.0.1:{decision_port}").parse().unwrap();

    let voting_participant = participant.clone();
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(ParticipantVotingPhaseServer::new(voting_participant))
            .serve(voting_addr)
            .await;
    });
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(ParticipantDecisionPhaseServer::new(participant))
            .serve(decision_addr)
            .await;
    });

    (format!("127.0.0.1:{voting_port}"), format!("127.0.0.1:{decision_port}"))
}

fn booking_request(tid: &str) -> TransactionRequest {
    let mut parameters = std::collections::HashMap::new();
    parameters.insert("rider_id".to_string(), "r1".to_string());
    parameters.insert("driver_id".to_string(), "d1".to_string());
    parameters.insert("amount".to_string(), "25.00".to_string());
    TransactionRequest {
        transaction_id: tid.to_string(),
        operation_type: "BOOK_RIDE".to_string(),
        parameters,
        timestamp: 0,
    }
}

/// Scenario 1 (§8): all three participants forced to commit.
#[tokio::test]
async fn happy_path_commits_unanimously() {
    let (addr1, _) = start_participant("PARTICIPANT_1", "DriverService", true, 41001, 41002).await;
    let (addr2, _) = start_participant("PARTICIPANT_2", "PaymentService", true, 41011, 41012).await;
    let (addr3, _) = start_participant("PARTICIPANT_3", "BookingService", true, 41021, 41022).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let coordinator = Coordinator::new(vec![addr1, addr2, addr3]);
    let response = CoordinatorService::initiate_transaction(&coordinator, Request::new(booking_request("txn-1")))
        .await
        .unwrap()
        .into_inner();

    assert!(response.success);
    assert_eq!(response.final_decision, "GLOBAL_COMMIT");
    assert_eq!(
        coordinator.status_of("txn-1"),
        Some(CoordinatorStatus::GlobalCommit)
    );
}

/// Scenario 2 (§8): the payment participant is forced to abort.
#[tokio::test]
async fn single_abort_forces_global_abort() {
    let (addr1, _) = start_participant("PARTICIPANT_1", "DriverService", true, 41101, 41102).await;
    let (addr2, _) = start_participant("PARTICIPANT_2", "PaymentService", false, 41111, 41112).await;
    let (addr3, _) = start_participant("PARTICIPANT_3", "BookingService", true, 41121, 41122).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let coordinator = Coordinator::new(vec![addr1, addr2, addr3]);
    let response = CoordinatorService::initiate_transaction(&coordinator, Request::new(booking_request("txn-2")))
        .await
        .unwrap()
        .into_inner();

    assert!(!response.success);
    assert_eq!(response.final_decision, "GLOBAL_ABORT");
    assert_eq!(
        coordinator.status_of("txn-2"),
        Some(CoordinatorStatus::GlobalAbort)
    );
}

/// Scenario 3 (§8): one participant address is never brought up, so its
/// vote request times out/fails to connect; presumed-abort applies.
#[tokio::test]
async fn unreachable_participant_is_presumed_abort() {
    let (addr1, _) = start_participant("PARTICIPANT_1", "DriverService", true, 41201, 41202).await;
    let (addr2, _) = start_participant("PARTICIPANT_2", "BookingService", true, 41221, 41222).await;
    // No participant ever listens on this address.
    let unreachable_addr = "127.0.0.1:41299".to_string();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let coordinator = Coordinator::new(vec![addr1, unreachable_addr, addr2]);
    let response = CoordinatorService::initiate_transaction(&coordinator, Request::new(booking_request("txn-3")))
        .await
        .unwrap()
        .into_inner();

    assert!(!response.success);
    assert_eq!(response.final_decision, "GLOBAL_ABORT");
}
