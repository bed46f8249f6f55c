//! Hologram card rendering, main-thread side.
//!
//! An application builds one [`Scheduler`] at startup and hands it to every
//! [`CanvasHost`]. Hosts publish interaction state; the scheduler coalesces it
//! into one batched message per animation frame for the background renderer
//! thread, which owns every card surface after its one-time transfer.

pub mod canvas_host;
pub mod logging;
pub mod runtime;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use canvas_host::{CanvasHost, CanvasProps, ContainerSize};
pub use frame_scheduler::FrameBudgetConfig;
pub use paint::{ClipMaskSpec, HologramPainter, PaintError, PaintInput, Painter};
pub use render_protocol::{
    CardId, Pointer, PresentTarget, Priority, RenderMode, RenderState, Surface, WatermarkConfig,
};
pub use renderer::{FileWatermarkFetcher, RendererConfig, WatermarkFetcher, WatermarkLoadError};
pub use runtime::{SpawnError, spawn_renderer};
pub use scheduler::{FlushReport, Registration, RenderedAck, Scheduler, SchedulerConfig, Visibility};
