//! Test doubles and a deterministic harness.
//!
//! `Harness` connects a real `Scheduler` to a `RenderWorker` that runs on the
//! test thread, so every message, flush and frame pass happens exactly when
//! the test asks for it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use engine::create_thread_channels;
use image::{Rgba, RgbaImage};
use paint::{PaintError, PaintInput, Painter};
use render_protocol::{CardId, Pointer, PresentTarget, RenderState, RendererMsg};
use renderer::{FrameReport, RenderWorker, WatermarkFetcher, WatermarkLoadError};

use crate::scheduler::{FlushReport, Scheduler, SchedulerConfig};

/// Card "A" of the reference scenario: 100x100, high priority, dynamic,
/// idle, hue 300, pattern on, watermark off.
pub(crate) fn card_a() -> RenderState {
    RenderState {
        theme_hue: 300.0,
        ..RenderState::new("A", 100, 100)
    }
}

/// Records every state it is asked to paint, and whether a watermark image
/// came with it.
#[derive(Clone, Default)]
pub(crate) struct RecordingPainter {
    painted: Arc<Mutex<Vec<(RenderState, bool)>>>,
}

impl RecordingPainter {
    pub(crate) fn paint_count(&self) -> usize {
        self.painted.lock().unwrap().len()
    }

    pub(crate) fn paints_for(&self, card: &str) -> usize {
        self.painted
            .lock()
            .unwrap()
            .iter()
            .filter(|(state, _)| state.card_id.as_str() == card)
            .count()
    }

    pub(crate) fn last_pointer(&self) -> Option<Pointer> {
        self.painted.lock().unwrap().last().map(|(state, _)| state.pointer)
    }

    pub(crate) fn last_had_watermark(&self) -> Option<bool> {
        self.painted.lock().unwrap().last().map(|(_, watermark)| *watermark)
    }
}

impl Painter for RecordingPainter {
    type Caches = ();

    fn paint(
        &self,
        target: &mut RgbaImage,
        input: &PaintInput<'_>,
        _caches: (),
    ) -> Result<(), PaintError> {
        let shade = (input.state.theme_hue as u32 % 256) as u8;
        for pixel in target.pixels_mut() {
            *pixel = Rgba([shade, 0, 0, 255]);
        }
        self.painted
            .lock()
            .unwrap()
            .push((input.state.clone(), input.watermark.is_some()));
        Ok(())
    }
}

/// Serves a small opaque square for any url.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    pub(crate) fetches: Arc<AtomicUsize>,
}

impl WatermarkFetcher for MemoryFetcher {
    fn fetch(&self, _url: &str) -> Result<RgbaImage, WatermarkLoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])))
    }
}

/// Forwards every present to a channel as `(card, width, height)`.
pub(crate) struct ChannelTarget(pub(crate) Sender<(CardId, u32, u32)>);

impl PresentTarget for ChannelTarget {
    fn present(&mut self, card_id: &CardId, pixels: &RgbaImage) {
        let _ = self.0.send((card_id.clone(), pixels.width(), pixels.height()));
    }
}

pub(crate) fn message_kind(message: &RendererMsg) -> &'static str {
    match message {
        RendererMsg::Register { .. } => "register",
        RendererMsg::Unregister { .. } => "unregister",
        RendererMsg::Update { .. } => "update",
        RendererMsg::SetClipMask { .. } => "set_clip_mask",
        RendererMsg::SetPaused { .. } => "set_paused",
        RendererMsg::LoadWatermark { .. } => "load_watermark",
        RendererMsg::WatermarkLoaded { .. } => "watermark_loaded",
        RendererMsg::Shutdown => "shutdown",
    }
}

pub(crate) struct Harness {
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) worker: RenderWorker<RecordingPainter>,
    pub(crate) painter: RecordingPainter,
    pub(crate) fetches: Arc<AtomicUsize>,
    commands: Receiver<RendererMsg>,
    sent_kinds: Vec<&'static str>,
}

impl Harness {
    /// Renderer has not announced readiness yet.
    pub(crate) fn new() -> Self {
        let config = SchedulerConfig::default();
        let (main, renderer) = create_thread_channels(config.event_capacity);
        let painter = RecordingPainter::default();
        let fetcher = MemoryFetcher::default();
        let fetches = Arc::clone(&fetcher.fetches);
        let worker = RenderWorker::new(
            painter.clone(),
            config.renderer,
            Arc::new(fetcher),
            renderer.event_producer,
            renderer.command_sender,
        );
        Self {
            scheduler: Arc::new(Scheduler::connected(config, main, None)),
            worker,
            painter,
            fetches,
            commands: renderer.command_receiver,
            sent_kinds: Vec::new(),
        }
    }

    /// Ready, with the clip mask already installed so it cannot arrive in
    /// the middle of a test and force repaints.
    pub(crate) fn started() -> Self {
        let mut harness = Self::new();
        harness.worker.announce_ready();
        assert!(harness.wait_for_clip_mask(), "clip mask never reached the renderer");
        harness
    }

    /// Hands every queued command to the worker.
    pub(crate) fn pump_renderer(&mut self) {
        while let Ok(message) = self.commands.try_recv() {
            self.sent_kinds.push(message_kind(&message));
            let _ = self.worker.handle_message(message);
        }
    }

    /// Takes queued commands without handing them to the worker.
    pub(crate) fn take_sent(&mut self) -> Vec<RendererMsg> {
        let messages: Vec<_> = self.commands.try_iter().collect();
        self.sent_kinds.extend(messages.iter().map(message_kind));
        messages
    }

    pub(crate) fn sent_kinds(&self) -> &[&'static str] {
        &self.sent_kinds
    }

    /// One animation frame on the main side, then one pass on the renderer.
    pub(crate) fn tick(&mut self) -> (FlushReport, Option<FrameReport>) {
        let report = self.scheduler.on_animation_frame();
        self.pump_renderer();
        (report, self.worker.render_frame())
    }

    pub(crate) fn wait_for_clip_mask(&mut self) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            self.scheduler.on_animation_frame();
            self.pump_renderer();
            if self.worker.has_clip_mask() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Pumps until the watermark loader thread has posted its result back.
    pub(crate) fn wait_for_watermarks(&mut self, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            self.pump_renderer();
            if self.worker.watermark_count() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }
}
