//! Input relay: forward host keystrokes to the target.
//!
//! Started only after DC1. Reads raw bytes from stdin and feeds them into
//! the transport writer queue, where they interleave safely with anything
//! else headed for the target. A blocking stdin read cannot be interrupted
//! portably, so the thread is tracked but never joined; the cancellation
//! flag stops it from forwarding the moment its current read returns.

use std::io::Read;

use tracing::{debug, warn};

use crate::task::{CancelFlag, TaskHandle};
use crate::transport::TransportWriter;

pub fn start(writer: TransportWriter, cancel: CancelFlag) -> std::io::Result<TaskHandle> {
    let flag = cancel.clone();
    std::thread::Builder::new()
        .name("input-relay".into())
        .spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 64];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => {
                        debug!("stdin closed, input relay stopping");
                        break;
                    }
                    Ok(n) => {
                        if flag.is_cancelled() {
                            break;
                        }
                        if writer.send(buf[..n].to_vec()).is_err() {
                            debug!("writer gone, input relay stopping");
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, input relay stopping");
                        break;
                    }
                }
            }
        })?;

    Ok(TaskHandle::detached("input-relay", cancel))
}
