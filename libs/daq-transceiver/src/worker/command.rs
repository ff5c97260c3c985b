use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use daq_api::{Command, CommandHandler};

use crate::latch::ExitLatch;

/// Polling interval while the command queue is empty, bounding
/// cancellation latency the same way the receive/interpret loops do
/// (spec.md §5 "all blocking waits use a short timeout").
const COMMAND_POLL: Duration = Duration::from_millis(100);

/// The dedicated command thread (spec.md §4.2 "Command thread ... pops
/// commands off the command queue and invokes `handle_command`. This
/// decouples command handling latency from interpret latency."): owns
/// `command_rx` and `handler` for the lifetime of a bidirectional
/// worker, entirely separate from the interpret loop's thread, so a
/// slow `handle_command` never stalls `interpret`/`refresh`.
pub fn run(worker: String, mut handler: Box<dyn CommandHandler>, command_rx: Receiver<Command>, latch: ExitLatch) {
    loop {
        match command_rx.recv_timeout(COMMAND_POLL) {
            Ok(cmd) => {
                if let Err(e) = handler.handle_command(cmd.value) {
                    tracing::warn!(worker = %worker, error = %e, "command handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if latch.is_tripped() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::info!(worker = %worker, "command thread exiting");
}
