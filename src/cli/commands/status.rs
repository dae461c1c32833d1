use super::super::{StatusArgs, render};
use crate::Result;
use crate::core::Limits;
use crate::transport::{Request, TransportError, call_addr};

pub(crate) fn handle(args: StatusArgs) -> Result<()> {
    let response = call_addr(&args.addr, &Request::Status, Limits::default().max_frame_bytes)?
        .into_result()?;
    let status = response.replica.ok_or(TransportError::Closed)?;
    if args.json {
        let json = serde_json::to_string_pretty(&status).map_err(TransportError::from)?;
        println!("{json}");
    } else {
        print!("{}", render::render_status(&status));
    }
    Ok(())
}
