//! Background renderer thread creation.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use engine::RendererThreadChannels;
use paint::Painter;
use renderer::{RenderWorker, RendererConfig, WatermarkFetcher, run_render_loop};

pub const RENDERER_THREAD_NAME: &str = "hologram-renderer";

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn the background renderer thread")]
    Thread(#[from] std::io::Error),
}

/// Moves `painter` and the renderer half of the channels onto a new thread
/// running the frame loop.
pub fn spawn_renderer<P: Painter>(
    painter: P,
    config: RendererConfig,
    fetcher: Arc<dyn WatermarkFetcher>,
    channels: RendererThreadChannels,
) -> Result<JoinHandle<()>, SpawnError> {
    let handle = thread::Builder::new()
        .name(RENDERER_THREAD_NAME.into())
        .spawn(move || {
            let RendererThreadChannels {
                command_receiver,
                command_sender,
                event_producer,
            } = channels;
            let worker = RenderWorker::new(painter, config, fetcher, event_producer, command_sender);
            run_render_loop(worker, &command_receiver);
        })?;
    tracing::debug!(thread = RENDERER_THREAD_NAME, "background renderer spawned");
    Ok(handle)
}
