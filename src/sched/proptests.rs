//! Randomized cluster simulations: N schedulers wired together in one
//! thread, with every interleaving of loop steps and message delivery left
//! to the strategy.

use std::sync::Mutex;

use proptest::prelude::*;

use super::*;
use crate::core::{
    CausalOrdering, Envelope, Limits, Membership, MessageId, ReplicaId, ScalarTimestamp,
    VectorTimestamp, WritePayload,
};

const NODES: usize = 3;

#[derive(Clone, Debug)]
enum Op {
    Submit(usize),
    Step(usize),
    Deliver(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NODES).prop_map(Op::Submit),
        (0..NODES).prop_map(Op::Step),
        any::<usize>().prop_map(Op::Deliver),
    ]
}

fn limits() -> Limits {
    Limits {
        buffer_capacity: 4096,
        ..Limits::default()
    }
}

fn nodes<P: OrderingPolicy>() -> Vec<Scheduler<P>> {
    (0..NODES)
        .map(|idx| {
            let membership = Membership::new(ReplicaId::new(idx as u32), NODES)
                .unwrap_or_else(|e| panic!("membership: {e}"));
            Scheduler::new(membership, &limits())
        })
        .collect()
}

fn payload(node: usize, n: usize) -> WritePayload {
    WritePayload::new(format!("k{}", n % 4), format!("{node}-{n}"))
}

/// Total order: write fan-out is synchronous (a broadcast is buffered at
/// every replica before its origin does anything else), acks travel
/// through an unordered pool.
struct TotalCluster {
    nodes: Vec<TotalOrderScheduler>,
    acks: Mutex<Vec<(usize, AckReceipt<ScalarTimestamp>)>>,
    applied: Vec<Mutex<Vec<MessageId>>>,
}

struct TotalNode<'a> {
    cluster: &'a TotalCluster,
    index: usize,
}

impl Executor<ScalarTimestamp> for TotalNode<'_> {
    fn execute(&self, effect: Effect<ScalarTimestamp>) {
        match effect {
            Effect::Broadcast(env) => {
                for node in &self.cluster.nodes {
                    node.receive(env.clone())
                        .unwrap_or_else(|e| panic!("receive {}: {e}", env.message_id));
                }
            }
            Effect::Acknowledge(env) => {
                let mut acks = self.cluster.acks.lock().unwrap();
                for to in 0..NODES {
                    acks.push((
                        to,
                        AckReceipt {
                            acker: ReplicaId::new(self.index as u32),
                            message_id: env.message_id,
                            clock: env.timestamp,
                        },
                    ));
                }
            }
            Effect::Apply(env) => {
                self.cluster.applied[self.index]
                    .lock()
                    .unwrap()
                    .push(env.message_id);
            }
        }
    }
}

impl TotalCluster {
    fn new() -> Self {
        Self {
            nodes: nodes(),
            acks: Mutex::new(Vec::new()),
            applied: (0..NODES).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn step(&self, index: usize) -> bool {
        self.nodes[index].step(&TotalNode {
            cluster: self,
            index,
        })
    }

    fn deliver(&self, seed: usize) -> bool {
        let next = {
            let mut acks = self.acks.lock().unwrap();
            if acks.is_empty() {
                None
            } else {
                let len = acks.len();
                Some(acks.swap_remove(seed % len))
            }
        };
        let Some((to, receipt)) = next else {
            return false;
        };
        self.nodes[to]
            .register_ack(receipt)
            .unwrap_or_else(|e| panic!("ack at {to}: {e}"));
        true
    }

    fn quiesce(&self) {
        loop {
            let mut progress = false;
            for index in 0..NODES {
                progress |= self.step(index);
            }
            progress |= self.deliver(0);
            if !progress {
                return;
            }
        }
    }
}

/// Causal order: every write copy, self-addressed ones included, travels
/// through an unordered pool.
struct CausalCluster {
    nodes: Vec<CausalScheduler>,
    writes: Mutex<Vec<(usize, Envelope<VectorTimestamp>)>>,
    applied: Vec<Mutex<Vec<Envelope<VectorTimestamp>>>>,
}

struct CausalNode<'a> {
    cluster: &'a CausalCluster,
    index: usize,
}

impl Executor<VectorTimestamp> for CausalNode<'_> {
    fn execute(&self, effect: Effect<VectorTimestamp>) {
        match effect {
            Effect::Broadcast(env) => {
                let mut writes = self.cluster.writes.lock().unwrap();
                for to in 0..NODES {
                    writes.push((to, env.clone()));
                }
            }
            Effect::Apply(env) => {
                self.cluster.applied[self.index].lock().unwrap().push(env);
            }
            Effect::Acknowledge(env) => panic!("causal mode acknowledged {}", env.message_id),
        }
    }
}

impl CausalCluster {
    fn new() -> Self {
        Self {
            nodes: nodes(),
            writes: Mutex::new(Vec::new()),
            applied: (0..NODES).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn step(&self, index: usize) -> bool {
        self.nodes[index].step(&CausalNode {
            cluster: self,
            index,
        })
    }

    fn deliver(&self, seed: usize) -> bool {
        let next = {
            let mut writes = self.writes.lock().unwrap();
            if writes.is_empty() {
                None
            } else {
                let len = writes.len();
                Some(writes.swap_remove(seed % len))
            }
        };
        let Some((to, env)) = next else {
            return false;
        };
        self.nodes[to]
            .receive(env)
            .unwrap_or_else(|e| panic!("receive at {to}: {e}"));
        true
    }

    fn quiesce(&self) {
        loop {
            let mut progress = false;
            for index in 0..NODES {
                progress |= self.step(index);
            }
            progress |= self.deliver(0);
            if !progress {
                return;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn total_order_replicas_agree(ops in prop::collection::vec(op_strategy(), 0..160)) {
        let cluster = TotalCluster::new();
        let mut submitted = 0usize;
        for (n, op) in ops.into_iter().enumerate() {
            match op {
                Op::Submit(node) => {
                    cluster.nodes[node]
                        .submit_write(payload(node, n))
                        .unwrap_or_else(|e| panic!("submit: {e}"));
                    submitted += 1;
                }
                Op::Step(node) => {
                    cluster.step(node);
                }
                Op::Deliver(seed) => {
                    cluster.deliver(seed);
                }
            }
        }
        cluster.quiesce();

        let reference = cluster.applied[0].lock().unwrap().clone();
        prop_assert_eq!(reference.len(), submitted);
        for applied in &cluster.applied[1..] {
            prop_assert_eq!(&*applied.lock().unwrap(), &reference);
        }
        for node in &cluster.nodes {
            prop_assert_eq!(node.pending_len(), 0);
            prop_assert!(node.inspect(|p| p.acks().is_empty()));
        }
    }

    #[test]
    fn causal_delivery_respects_happens_before(ops in prop::collection::vec(op_strategy(), 0..160)) {
        let cluster = CausalCluster::new();
        let mut submitted = 0usize;
        for (n, op) in ops.into_iter().enumerate() {
            match op {
                Op::Submit(node) => {
                    cluster.nodes[node]
                        .submit_write(payload(node, n))
                        .unwrap_or_else(|e| panic!("submit: {e}"));
                    submitted += 1;
                }
                Op::Step(node) => {
                    cluster.step(node);
                }
                Op::Deliver(seed) => {
                    cluster.deliver(seed);
                }
            }
        }
        cluster.quiesce();

        for (index, applied) in cluster.applied.iter().enumerate() {
            let applied = applied.lock().unwrap();
            prop_assert_eq!(applied.len(), submitted, "replica {} missed writes", index);
            for (pos, first) in applied.iter().enumerate() {
                for second in &applied[pos + 1..] {
                    let ordering = second
                        .timestamp
                        .compare(&first.timestamp)
                        .unwrap_or_else(|e| panic!("compare: {e}"));
                    prop_assert_ne!(
                        ordering,
                        CausalOrdering::Before,
                        "replica {} applied {} before its cause {}",
                        index,
                        first.message_id,
                        second.message_id
                    );
                }
            }
        }
        let expected = submitted as u64;
        for node in &cluster.nodes {
            let clock = node.current_timestamp();
            prop_assert_eq!(clock.as_slice().iter().sum::<u64>(), expected);
            prop_assert_eq!(node.pending_len(), 0);
        }
    }
}
