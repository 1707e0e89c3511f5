//! End-to-end Raft scenarios (§8 of the spec): real `tonic` servers on
//! loopback ports, driven by real clients, polled to convergence with a
//! bounded deadline — the same shape as `cell-consensus/tests/raft_test.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concord::raft::{InMemoryStateMachine, RaftNode, StateMachine};
use concord::rpc::raft::raft_client_client::RaftClientClient;
use concord::rpc::raft::raft_client_server::RaftClientServer;
use concord::rpc::raft::raft_server::RaftServer;
use concord::rpc::raft::ClientRequest;
use serial_test::serial;
use tonic::transport::Server;

/// Spins up `count` Raft nodes on consecutive loopback ports starting at
/// `base_port`, each with its own [`InMemoryStateMachine`], and starts their
/// background loops. Returns the nodes plus their state machines.
async fn start_cluster(
    base_port: u16,
    count: u16,
) -> (Vec<Arc<RaftNode>>, Vec<Arc<InMemoryStateMachine>>) {
    let ids: Vec<String> = (0..count).map(|i| format!("node{i}")).collect();
    let addrs: Vec<String> = (0..count).map(|i| format!("127.0.0.1:{}", base_port + i)).collect();

    let mut nodes = Vec::new();
    let mut state_machines = Vec::new();

    for i in 0..count as usize {
        let mut peers = HashMap::new();
        for j in 0..count as usize {
            if i != j {
                peers.insert(ids[j].clone(), addrs[j].clone());
            }
        }
        let sm = Arc::new(InMemoryStateMachine::new());
        let node = RaftNode::new(ids[i].clone(), peers, sm.clone() as Arc<dyn StateMachine>);

        let peer_addr: std::net::SocketAddr = addrs[i].parse().unwrap();
        let client_addr: std::net::SocketAddr =
            format!("127.0.0.1:{}", base_port + 1000 + i as u16).parse().unwrap();

        let peer_node = node.clone();
        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(RaftServer::new(peer_node))
                .serve(peer_addr)
                .await;
        });
        let client_node = node.clone();
        tokio::spawn(async move {
            let _ = Server::builder()
                .add_service(RaftClientServer::new(client_node))
                .serve(client_addr)
                .await;
        });

        node.start();
        nodes.push(node);
        state_machines.push(sm);
    }

    // Give the listeners a moment to bind before anyone dials them.
    tokio::time::sleep(Duration::from_millis(100)).await;
    (nodes, state_machines)
}

async fn wait_for<F: Fn() -> bool>(deadline: Duration, condition: F) -> bool {
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn client_addr(base_port: u16, index: u16) -> String {
    format!("127.0.0.1:{}", base_port + 1000 + index)
}

/// Scenario 4 (§8): 5 nodes start simultaneously; within 10s exactly one
/// reports leader with term >= 1.
#[tokio::test]
#[serial]
async fn single_leader_elected_within_cluster() {
    let (nodes, _sms) = start_cluster(40400, 5).await;

    let elected = wait_for(Duration::from_secs(10), || {
        nodes.iter().filter(|n| n.is_leader()).count() == 1
    })
    .await;
    assert!(elected, "expected exactly one leader within 10s");

    let leaders: Vec<_> = nodes.iter().filter(|n| n.is_leader()).collect();
    assert_eq!(leaders.len(), 1);
    assert!(leaders[0].current_term() >= 1);

    for node in &nodes {
        node.shutdown();
    }
}

/// Scenario 5 (§8): a client submits an operation to the leader; within 5s
/// the entry is applied by a majority of the cluster's state machines.
#[tokio::test]
#[serial]
async fn committed_entry_applies_on_majority() {
    let base_port = 40500;
    let (nodes, sms) = start_cluster(base_port, 5).await;

    wait_for(Duration::from_secs(10), || {
        nodes.iter().any(|n| n.is_leader())
    })
    .await;
    let leader_index = nodes.iter().position(|n| n.is_leader()).expect("no leader elected");

    let channel = tonic::transport::Endpoint::from_shared(format!(
        "http://{}",
        client_addr(base_port, leader_index as u16)
    ))
    .unwrap()
    .connect()
    .await
    .unwrap();
    let mut client = RaftClientClient::new(channel);
    let response = client
        .submit_operation(ClientRequest {
            operation: "SET x=10".to_string(),
            client_id: "test-client".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(response.success);

    let applied_on_majority = wait_for(Duration::from_secs(5), || {
        sms.iter().filter(|sm| sm.applied().iter().any(|(_, cmd)| cmd == "SET x=10")).count() >= 3
    })
    .await;
    assert!(applied_on_majority, "entry did not reach a majority within 5s");

    for node in &nodes {
        node.shutdown();
    }
}

/// Scenario 6 (§8): a client submits to a follower; the request is
/// forwarded to the leader transparently and the entry is not duplicated.
#[tokio::test]
#[serial]
async fn follower_forwards_submission_to_leader() {
    let base_port = 40600;
    let (nodes, sms) = start_cluster(base_port, 5).await;

    wait_for(Duration::from_secs(10), || nodes.iter().any(|n| n.is_leader())).await;
    let leader_index = nodes.iter().position(|n| n.is_leader()).expect("no leader elected");
    let follower_index = (leader_index + 1) % nodes.len();

    // The follower only learns who the leader is once it has received at
    // least one AppendEntries (heartbeat or otherwise).
    wait_for(Duration::from_secs(5), || {
        nodes[follower_index].current_leader().is_some()
    })
    .await;

    let channel = tonic::transport::Endpoint::from_shared(format!(
        "http://{}",
        client_addr(base_port, follower_index as u16)
    ))
    .unwrap()
    .connect()
    .await
    .unwrap();
    let mut client = RaftClientClient::new(channel);
    let response = client
        .submit_operation(ClientRequest {
            operation: "SET y=20".to_string(),
            client_id: "test-client".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(response.success, "forwarded submission should succeed: {:?}", response.message);

    let applied_once = wait_for(Duration::from_secs(5), || {
        sms[leader_index]
            .applied()
            .iter()
            .filter(|(_, cmd)| cmd == "SET y=20")
            .count()
            == 1
    })
    .await;
    assert!(applied_once, "entry should be applied exactly once on the leader");

    for node in &nodes {
        node.shutdown();
    }
}
