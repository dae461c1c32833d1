//! Total-order delivery across an in-process cluster.

use ordered_kv::core::{Limits, MessageId, ReplicaId, WritePayload};
use ordered_kv::sched::TotalOrder;

use crate::fixtures::cluster::LocalCluster;
use crate::fixtures::wait_until;

fn put(cluster: &LocalCluster<TotalOrder>, id: u32, key: &str, value: &str) -> MessageId {
    cluster
        .replica(id)
        .handle_write(WritePayload::new(key, value))
        .expect("write accepted")
}

#[test]
fn replicas_apply_the_same_sequence() {
    let cluster = LocalCluster::<TotalOrder>::start(3);
    let per_replica = 8;

    std::thread::scope(|scope| {
        for id in 0..3u32 {
            let cluster = &cluster;
            scope.spawn(move || {
                for n in 0..per_replica {
                    put(cluster, id, "shared", &format!("{id}-{n}"));
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

    let reference = cluster.applied_order(0);
    for id in 1..3 {
        assert_eq!(cluster.applied_order(id), reference, "replica {id} diverged");
    }
    let last = cluster.replica(0).store().get("shared");
    for replica in cluster.replicas() {
        assert_eq!(replica.store().get("shared"), last);
        assert_eq!(replica.scheduler().pending_len(), 0);
        assert!(replica.scheduler().inspect(|policy| policy.acks().is_empty()));
    }

    cluster.shutdown();
}

#[test]
fn delivery_waits_for_every_ack() {
    let cluster = LocalCluster::<TotalOrder>::start(3);
    let (r0, r2) = (ReplicaId::new(0), ReplicaId::new(2));
    cluster.mesh().hold(r2, r0);

    let id = put(&cluster, 0, "color", "green");
    for peer in [1, 2] {
        wait_until("peers to deliver", || {
            cluster.replica(peer).store().applied_len() == 1
        });
    }
    wait_until("replica 2's ack to be held", || {
        cluster.mesh().held_len(r2, r0) == 1
    });
    assert_eq!(cluster.replica(0).store().get("color"), None);
    assert_eq!(cluster.replica(0).scheduler().pending_len(), 1);

    for response in cluster.mesh().release(r2, r0) {
        assert!(response.expect("delivered").status.is_ok());
    }
    wait_until("origin to deliver", || {
        cluster.replica(0).store().applied_len() == 1
    });
    for replica in 0..3 {
        assert_eq!(cluster.applied_order(replica), vec![id]);
    }

    cluster.shutdown();
}

#[test]
fn sequential_fanout_still_agrees() {
    let limits = Limits {
        fanout_parallelism: 1,
        ..Limits::default()
    };
    let cluster = LocalCluster::<TotalOrder>::start_with(2, &limits);
    for n in 0..5 {
        put(&cluster, n % 2, "k", &n.to_string());
    }
    for id in 0..2 {
        wait_until("every write applied", || {
            cluster.replica(id).store().applied_len() == 5
        });
    }
    assert_eq!(cluster.applied_order(0), cluster.applied_order(1));
    cluster.shutdown();
}
