//! Integration tests for endpoint ownership election.

use std::os::unix::net::UnixListener as StdUnixListener;
use std::time::Duration;

use details_relay::ipc::rendezvous::{Election, RelayRole, Rendezvous};
use details_relay::models::endpoint::RelayEndpoint;
use details_relay::AppError;

use super::test_helpers::{temp_endpoint, within, CONNECT_TIMEOUT};

fn rendezvous(endpoint: &RelayEndpoint) -> Rendezvous {
    Rendezvous::new(endpoint.clone(), CONNECT_TIMEOUT)
        .with_probe_policy(5, Duration::from_millis(20))
}

#[tokio::test]
async fn first_process_owns_and_second_borrows() {
    let (_dir, endpoint) = temp_endpoint();

    let first = rendezvous(&endpoint).elect().await.expect("first election");
    assert_eq!(first.role(), RelayRole::Owner);
    assert!(first.role().is_owner());

    let second = rendezvous(&endpoint).elect().await.expect("second election");
    assert_eq!(second.role(), RelayRole::Borrower);
    assert!(!second.role().is_owner());
}

#[tokio::test]
async fn probe_reflects_listener_lifetime() {
    let (_dir, endpoint) = temp_endpoint();
    let probe = rendezvous(&endpoint);
    assert!(!probe.is_running().await);

    let election = probe.elect().await.expect("elect");
    assert!(probe.is_running().await);
    drop(election);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_contenders_yield_exactly_one_owner() {
    for contenders in 2..=10 {
        let (_dir, endpoint) = temp_endpoint();

        let mut tasks = Vec::new();
        for _ in 0..contenders {
            let rendezvous = rendezvous(&endpoint);
            tasks.push(tokio::spawn(async move { rendezvous.elect().await }));
        }

        let mut elections = Vec::new();
        for task in tasks {
            elections.push(within(task).await.expect("join").expect("election"));
        }

        let owners = elections
            .iter()
            .filter(|election| matches!(election, Election::Owner(_)))
            .count();
        assert_eq!(owners, 1, "{contenders} contenders must produce one owner");
        assert_eq!(elections.len() - owners, contenders - 1);
    }
}

#[tokio::test]
async fn stale_socket_file_is_reclaimed() {
    let (_dir, endpoint) = temp_endpoint();
    let RelayEndpoint::Path(path) = endpoint.clone() else {
        unreachable!("temp endpoint is a path");
    };
    drop(StdUnixListener::bind(&path).expect("create stale socket"));
    assert!(path.exists(), "std listener leaves the socket file behind");

    let election = rendezvous(&endpoint).elect().await.expect("elect over stale file");

    assert_eq!(election.role(), RelayRole::Owner);
}

#[tokio::test]
async fn unbindable_path_is_bind_failure() {
    let (dir, _) = temp_endpoint();
    let endpoint = RelayEndpoint::Path(dir.path().join("missing-dir").join("relay.sock"));

    let result = rendezvous(&endpoint).elect().await;

    assert!(matches!(result, Err(AppError::BindFailure(_))), "got {result:?}");
}

#[tokio::test]
async fn loopback_endpoint_elects_owner_then_borrower() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("ephemeral port");
        probe.local_addr().expect("local addr").port()
    };
    let endpoint = RelayEndpoint::Loopback(port);

    let owner = rendezvous(&endpoint).elect().await.expect("owner election");
    assert_eq!(owner.role(), RelayRole::Owner);

    let borrower = rendezvous(&endpoint).elect().await.expect("borrower election");
    assert_eq!(borrower.role(), RelayRole::Borrower);
}
