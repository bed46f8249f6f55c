use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use paint::Painter;
use render_protocol::RendererMsg;

use crate::RenderWorker;

/// Run the background render loop until `Shutdown` or disconnection.
///
/// 1. Announces `Ready`.
/// 2. While idle or paused, blocks on the command channel.
/// 3. While a render is requested, keeps handling commands until the next
///    tick deadline, then drains what is queued and runs one frame pass.
///
/// The worker holds a loopback sender for watermark loaders, so the channel
/// never disconnects on its own; the main thread sends `Shutdown`.
pub fn run_render_loop<P: Painter>(mut worker: RenderWorker<P>, commands: &Receiver<RendererMsg>) {
    worker.announce_ready();
    let interval = worker.config().frame_interval;
    let mut next_tick = Instant::now();

    loop {
        if !worker.is_render_requested() || worker.is_paused() {
            let Ok(message) = commands.recv() else {
                break;
            };
            if worker.handle_message(message).is_break() {
                break;
            }
            continue;
        }

        let now = Instant::now();
        if now < next_tick {
            match commands.recv_timeout(next_tick - now) {
                Ok(message) => {
                    if worker.handle_message(message).is_break() {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if worker.drain_messages(commands).is_break() {
            break;
        }
        if let Some(report) = worker.render_frame() {
            tracing::trace!(
                sequence = report.sequence,
                painted = report.painted,
                blitted = report.blitted,
                continued = report.continued,
                "frame pass finished"
            );
        }
        next_tick = Instant::now() + interval;
    }

    tracing::debug!(stats = ?worker.stats(), "render loop exiting");
}
