//! In-process cluster over a `LocalMesh`.

use std::sync::Arc;

use ordered_kv::core::{Limits, Membership, MessageId, ReplicaId};
use ordered_kv::replica::{Coordinator, Replica, ReplicaHandle, StatusBoard};
use ordered_kv::sched::OrderingPolicy;
use ordered_kv::transport::LocalMesh;

pub struct LocalCluster<P: OrderingPolicy> {
    mesh: LocalMesh,
    board: Arc<StatusBoard>,
    handles: Vec<ReplicaHandle<P>>,
}

impl<P: OrderingPolicy> LocalCluster<P> {
    pub fn start(size: usize) -> Self {
        Self::start_with(size, &Limits::default())
    }

    pub fn start_with(size: usize, limits: &Limits) -> Self {
        let mesh = LocalMesh::new();
        let board = Arc::new(StatusBoard::new());
        let replicas: Vec<Arc<Replica<P>>> = (0..size as u32)
            .map(|id| {
                let membership = Membership::new(ReplicaId::new(id), size).expect("membership");
                let replica = Arc::new(Replica::<P>::new(membership, limits));
                mesh.register(ReplicaId::new(id), replica.clone());
                replica
            })
            .collect();
        let handles = replicas
            .iter()
            .map(|replica| {
                let coordinator: Arc<dyn Coordinator> = board.clone();
                replica
                    .start(
                        mesh.endpoint(replica.id()),
                        limits.fanout_parallelism,
                        Some(coordinator),
                    )
                    .expect("start replica")
            })
            .collect();
        Self {
            mesh,
            board,
            handles,
        }
    }

    pub fn mesh(&self) -> &LocalMesh {
        &self.mesh
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn replica(&self, id: u32) -> &Arc<Replica<P>> {
        self.handles[id as usize].replica()
    }

    pub fn replicas(&self) -> impl Iterator<Item = &Arc<Replica<P>>> {
        self.handles.iter().map(ReplicaHandle::replica)
    }

    /// Message ids in the order `id` applied them.
    pub fn applied_order(&self, id: u32) -> Vec<MessageId> {
        self.replica(id)
            .store()
            .history()
            .into_iter()
            .map(|write| write.message_id)
            .collect()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
    }
}
