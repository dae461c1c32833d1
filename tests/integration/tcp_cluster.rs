//! Replicas served over loopback TCP.

use std::net::TcpListener;
use std::sync::Arc;

use ordered_kv::core::{Limits, Membership, ReplicaId};
use ordered_kv::replica::{Coordinator, Replica, ReplicaHandle, StatusBoard, TcpCoordinator};
use ordered_kv::sched::{CausalOrder, OrderingPolicy, TotalOrder};
use ordered_kv::transport::{
    ReplicaState, ReplicaStatus, Request, ServerHandle, StatusCode, TcpTransport, call_addr,
    serve,
};

use crate::fixtures::wait_until;

const MAX_FRAME: usize = 64 * 1024;

struct TcpCluster<P: OrderingPolicy> {
    addrs: Vec<String>,
    handles: Vec<ReplicaHandle<P>>,
    coordinator: ServerHandle,
    board: Arc<StatusBoard>,
}

impl<P: OrderingPolicy> TcpCluster<P> {
    fn start(size: usize) -> Self {
        let board = Arc::new(StatusBoard::new());
        let coordinator = serve(
            TcpListener::bind("127.0.0.1:0").expect("bind coordinator"),
            board.clone(),
            MAX_FRAME,
        )
        .expect("serve coordinator");
        let coordinator_addr = coordinator.local_addr().to_string();

        let listeners: Vec<TcpListener> = (0..size)
            .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind replica"))
            .collect();
        let addrs: Vec<String> = listeners
            .iter()
            .map(|l| l.local_addr().expect("local addr").to_string())
            .collect();

        let limits = Limits {
            max_frame_bytes: MAX_FRAME,
            ..Limits::default()
        };
        let handles = listeners
            .into_iter()
            .enumerate()
            .map(|(id, listener)| {
                let membership =
                    Membership::new(ReplicaId::new(id as u32), size).expect("membership");
                let replica = Arc::new(Replica::<P>::new(membership, &limits));
                let server = serve(listener, replica.clone(), MAX_FRAME).expect("serve replica");
                let coordinator: Arc<dyn Coordinator> = Arc::new(TcpCoordinator::new(
                    coordinator_addr.clone(),
                    Some(addrs[id].clone()),
                    MAX_FRAME,
                ));
                replica
                    .start(
                        TcpTransport::new(addrs.clone(), MAX_FRAME),
                        limits.fanout_parallelism,
                        Some(coordinator),
                    )
                    .expect("start replica")
                    .with_server(server)
            })
            .collect();

        Self {
            addrs,
            handles,
            coordinator,
            board,
        }
    }

    fn put(&self, id: usize, key: &str, value: &str) {
        let request = Request::Write {
            key: key.into(),
            value: value.into(),
        };
        let response = call_addr(&self.addrs[id], &request, MAX_FRAME).expect("put");
        assert_eq!(response.status, StatusCode::Ok, "{:?}", response.reason);
        assert!(response.message_id.is_some());
    }

    fn status(&self, id: usize) -> ReplicaStatus {
        call_addr(&self.addrs[id], &Request::Status, MAX_FRAME)
            .expect("status")
            .replica
            .expect("status body")
    }

    fn shutdown(self) -> Arc<StatusBoard> {
        for handle in self.handles {
            handle.shutdown();
        }
        self.coordinator.shutdown();
        self.board
    }
}

#[test]
fn total_order_over_tcp() {
    let cluster = TcpCluster::<TotalOrder>::start(3);
    wait_until("every replica to report ready", || {
        cluster.board.states().len() == 3
    });

    for n in 0..6 {
        cluster.put(n % 3, "k", &n.to_string());
    }
    for id in 0..3 {
        wait_until("writes applied", || cluster.status(id).applied == 6);
    }
    let histories: Vec<_> = cluster
        .handles
        .iter()
        .map(|h| {
            h.replica()
                .store()
                .history()
                .into_iter()
                .map(|w| w.message_id)
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(histories[0], histories[1]);
    assert_eq!(histories[1], histories[2]);
    assert!(cluster.handles[0].local_addr().is_some());

    let board = cluster.shutdown();
    assert!(board.states().values().all(|s| *s == ReplicaState::Down));
}

#[test]
fn causal_over_tcp() {
    let cluster = TcpCluster::<CausalOrder>::start(2);
    cluster.put(0, "a", "1");
    cluster.put(1, "b", "2");
    for id in 0..2 {
        wait_until("writes applied", || cluster.status(id).applied == 2);
        let status = cluster.status(id);
        assert_eq!(status.pending, 0);
        assert_eq!(status.clock.to_string(), cluster.status(1 - id).clock.to_string());
    }
    cluster.shutdown();
}

#[test]
fn ack_to_causal_replica_is_rejected() {
    let cluster = TcpCluster::<CausalOrder>::start(1);
    let response = call_addr(
        &cluster.addrs[0],
        &Request::Ack {
            sender: ReplicaId::new(0),
            receiver: ReplicaId::new(0),
            message_id: ordered_kv::core::MessageId::new(ReplicaId::new(0), 1),
            timestamp: ordered_kv::core::Timestamp::Vector(
                ordered_kv::core::VectorTimestamp::zero(1),
            ),
        },
        MAX_FRAME,
    )
    .expect("call");
    assert!(!response.status.is_ok());
    cluster.shutdown();
}
