use std::net::TcpListener;
use std::sync::Arc;

use super::super::NodeArgs;
use crate::Result;
use crate::config::Config;
use crate::core::{Membership, Mode};
use crate::replica::{Coordinator, Replica, TcpCoordinator};
use crate::sched::{CausalOrder, OrderingPolicy, TotalOrder};
use crate::telemetry::{self, TelemetryConfig};
use crate::transport::{TcpTransport, serve};

pub(crate) fn handle(verbosity: u8, args: NodeArgs) -> Result<()> {
    let mut cfg = args.resolve()?;
    telemetry::apply_replica_logging_defaults(&mut cfg.logging);
    let _guard = telemetry::init(
        TelemetryConfig::new(verbosity.max(1), cfg.logging.clone()).for_replica(cfg.replica_id),
    );

    let membership = cfg.validate()?;
    match cfg.mode {
        Mode::Causal => serve_replica::<CausalOrder>(&cfg, membership),
        Mode::Sequential => serve_replica::<TotalOrder>(&cfg, membership),
    }
}

fn serve_replica<P: OrderingPolicy>(cfg: &Config, membership: Membership) -> Result<()> {
    let limits = &cfg.limits;
    let listener = TcpListener::bind(&cfg.listen_addr)?;
    let replica = Arc::new(Replica::<P>::new(membership, limits));
    let server = serve(listener, Arc::clone(&replica), limits.max_frame_bytes)?;
    let listen_addr = server.local_addr();
    tracing::info!(
        replica = %membership.local(),
        mode = %cfg.mode,
        addr = %listen_addr,
        peers = cfg.peers.len(),
        "listening"
    );

    let coordinator = cfg.coordinator_addr.as_ref().map(|addr| {
        Arc::new(TcpCoordinator::new(
            addr.clone(),
            Some(listen_addr.to_string()),
            limits.max_frame_bytes,
        )) as Arc<dyn Coordinator>
    });
    let transport = TcpTransport::new(cfg.peers.clone(), limits.max_frame_bytes);
    let handle = replica
        .start(transport, limits.fanout_parallelism, coordinator)?
        .with_server(server);

    super::wait_for_shutdown_signal();
    handle.shutdown();
    Ok(())
}
