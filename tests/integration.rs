#[path = "integration/fixtures/mod.rs"]
mod fixtures;

#[path = "integration/causal.rs"]
mod causal;
#[path = "integration/config.rs"]
mod config;
#[path = "integration/tcp_cluster.rs"]
mod tcp_cluster;
#[path = "integration/total_order.rs"]
mod total_order;
