use std::net::TcpListener;
use std::sync::Arc;

use super::super::{CoordinatorArgs, render};
use crate::Result;
use crate::core::Limits;
use crate::replica::StatusBoard;
use crate::transport::serve;

pub(crate) fn handle(args: CoordinatorArgs) -> Result<()> {
    let listener = TcpListener::bind(&args.listen)?;
    let board = Arc::new(StatusBoard::new());
    let server = serve(listener, Arc::clone(&board), Limits::default().max_frame_bytes)?;
    tracing::info!(addr = %server.local_addr(), "coordinator listening");

    super::wait_for_shutdown_signal();
    server.shutdown();
    print!("{}", render::render_board(&board.states()));
    Ok(())
}
