//! Causal delivery across an in-process cluster.

use ordered_kv::core::{MessageId, ReplicaId, WritePayload};
use ordered_kv::sched::CausalOrder;
use ordered_kv::transport::ReplicaState;

use crate::fixtures::cluster::LocalCluster;
use crate::fixtures::wait_until;

fn put(cluster: &LocalCluster<CausalOrder>, id: u32, key: &str, value: &str) -> MessageId {
    cluster
        .replica(id)
        .handle_write(WritePayload::new(key, value))
        .expect("write accepted")
}

#[test]
fn dependent_write_waits_for_its_cause() {
    let cluster = LocalCluster::<CausalOrder>::start(3);
    let (r0, r2) = (ReplicaId::new(0), ReplicaId::new(2));
    cluster.mesh().hold(r0, r2);

    let first = put(&cluster, 0, "x", "1");
    wait_until("replica 1 to apply the first write", || {
        cluster.replica(1).store().get("x").as_deref() == Some("1")
    });
    let second = put(&cluster, 1, "x", "2");

    wait_until("replica 2 to park the dependent write", || {
        cluster.replica(2).scheduler().pending_len() == 1
            && cluster.replica(2).scheduler().stats().parked >= 1
    });
    assert_eq!(cluster.replica(2).store().get("x"), None);
    assert_eq!(cluster.mesh().held_len(r0, r2), 1);

    for response in cluster.mesh().release(r0, r2) {
        assert!(response.expect("delivered").status.is_ok());
    }
    for id in 0..3 {
        wait_until("both writes everywhere", || {
            cluster.replica(id).store().applied_len() == 2
        });
        assert_eq!(cluster.applied_order(id), vec![first, second]);
        assert_eq!(cluster.replica(id).store().get("x").as_deref(), Some("2"));
        assert_eq!(cluster.replica(id).scheduler().pending_len(), 0);
    }

    cluster.shutdown();
}

#[test]
fn concurrent_writers_converge_on_applied_sets() {
    let cluster = LocalCluster::<CausalOrder>::start(3);
    let per_replica = 10;

    std::thread::scope(|scope| {
        for id in 0..3u32 {
            let cluster = &cluster;
            scope.spawn(move || {
                for n in 0..per_replica {
                    put(cluster, id, &format!("k{id}"), &n.to_string());
                }
            });
        }
    });

    let total = 3 * per_replica;
    for id in 0..3 {
        wait_until("every write applied", || {
            cluster.replica(id).store().applied_len() == total
        });
    }
    for id in 0..3 {
        let order = cluster.applied_order(id);
        for origin in 0..3 {
            let seqs: Vec<u64> = order
                .iter()
                .filter(|m| m.origin == ReplicaId::new(origin))
                .map(|m| m.seq)
                .collect();
            assert_eq!(seqs, (1..=per_replica as u64).collect::<Vec<_>>());
        }
        for origin in 0..3 {
            assert_eq!(
                cluster.replica(id).store().get(&format!("k{origin}")),
                Some((per_replica - 1).to_string())
            );
        }
        let clock = cluster.replica(id).scheduler().current_timestamp();
        assert_eq!(clock.as_slice(), &[per_replica as u64; 3]);
    }

    cluster.shutdown();
}

#[test]
fn lifecycle_is_reported_to_the_coordinator() {
    let cluster = LocalCluster::<CausalOrder>::start(2);
    let states = cluster.board().states();
    assert_eq!(states.len(), cluster.size());
    assert!(states.values().all(|state| *state == ReplicaState::Ready));
    cluster.shutdown();
}
