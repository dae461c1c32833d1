use super::super::PutArgs;
use crate::Result;
use crate::core::Limits;
use crate::transport::{Request, TransportError, call_addr};

pub(crate) fn handle(args: PutArgs) -> Result<()> {
    let request = Request::Write {
        key: args.key,
        value: args.value,
    };
    let response = call_addr(&args.addr, &request, Limits::default().max_frame_bytes)?
        .into_result()?;
    let id = response.message_id.ok_or(TransportError::Closed)?;
    println!("accepted {id}");
    Ok(())
}
