//! Background render context.
//!
//! `RenderWorker` owns every per-card drawing resource, the shared clip mask
//! and the watermark image cache. It consumes `RendererMsg`s, runs at most one
//! pending frame pass at a time, and is the only place pixels are produced.
//!
//! Internal layout:
//! - `resources`: per-card surface, painter caches, gradient, static snapshot.
//! - `watermarks`: decoded watermark images and the fetch seam.
//! - `frame_loop`: the thread body that paces passes at `frame_interval`.

mod frame_loop;
mod resources;
mod watermarks;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use engine::RendererEventProducer;
use frame_scheduler::{FrameBudgetConfig, FrameOutcome, FrameScheduler};
use image::RgbaImage;
use paint::{PaintInput, Painter};
use render_protocol::{
    CardId, ClipMask, MAX_DRAW_DIMENSION, RenderState, RendererMsg, StateBatch, StateKey, Surface,
};
use smallvec::SmallVec;
use smol_str::SmolStr;

pub use frame_loop::run_render_loop;
use resources::RenderResources;
pub use watermarks::{
    FileWatermarkFetcher, WatermarkCache, WatermarkFetcher, WatermarkHandle, WatermarkLoadError,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Minimum spacing between two frame passes.
    pub frame_interval: Duration,
    /// Push a `Rendered` event after every paint or cache blit.
    pub emit_render_acks: bool,
    pub frame_budget: FrameBudgetConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            emit_render_acks: true,
            frame_budget: FrameBudgetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub passes: u64,
    pub paints: u64,
    pub cache_blits: u64,
    pub unchanged_skips: u64,
    pub phase_skips: u64,
    pub failures: u64,
    pub duplicate_registrations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOutcome {
    Painted,
    Blitted,
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub sequence: u64,
    pub painted: u32,
    pub blitted: u32,
    pub unchanged: u32,
    pub phase_skipped: u32,
    pub failed: u32,
    /// Another pass was requested by the continuation rule.
    pub continued: bool,
}

impl FrameReport {
    fn record(&mut self, outcome: CardOutcome) {
        match outcome {
            CardOutcome::Painted => self.painted += 1,
            CardOutcome::Blitted => self.blitted += 1,
            CardOutcome::Unchanged => self.unchanged += 1,
            CardOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Default)]
struct SharedAssets {
    clip_mask: Option<ClipMask>,
    watermarks: WatermarkCache,
}

pub struct RenderWorker<P: Painter> {
    painter: P,
    config: RendererConfig,
    frame_scheduler: FrameScheduler,
    resources: HashMap<CardId, RenderResources<P::Caches>>,
    states: HashMap<CardId, RenderState>,
    shared: SharedAssets,
    events: RendererEventProducer,
    loopback: Sender<RendererMsg>,
    fetcher: Arc<dyn WatermarkFetcher>,
    next_registration: u64,
    paused: bool,
    stats: RenderStats,
}

impl<P: Painter> RenderWorker<P> {
    pub fn new(
        painter: P,
        config: RendererConfig,
        fetcher: Arc<dyn WatermarkFetcher>,
        events: RendererEventProducer,
        loopback: Sender<RendererMsg>,
    ) -> Self {
        Self {
            painter,
            config,
            frame_scheduler: FrameScheduler::new(config.frame_budget),
            resources: HashMap::new(),
            states: HashMap::new(),
            shared: SharedAssets::default(),
            events,
            loopback,
            fetcher,
            next_registration: 0,
            paused: false,
            stats: RenderStats::default(),
        }
    }

    pub fn config(&self) -> RendererConfig {
        self.config
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn card_count(&self) -> usize {
        self.resources.len()
    }

    pub fn has_resources(&self, card_id: &CardId) -> bool {
        self.resources.contains_key(card_id)
    }

    pub fn has_clip_mask(&self) -> bool {
        self.shared.clip_mask.is_some()
    }

    pub fn watermark_count(&self) -> usize {
        self.shared.watermarks.len()
    }

    pub fn is_render_requested(&self) -> bool {
        self.frame_scheduler.is_render_requested()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Tells the main thread the context is up and accepting registrations.
    pub fn announce_ready(&mut self) {
        self.events.push_ready();
    }

    pub fn handle_message(&mut self, message: RendererMsg) -> ControlFlow<()> {
        match message {
            RendererMsg::Register { card_id, surface } => self.register(card_id, surface),
            RendererMsg::Unregister { card_id } => self.unregister(&card_id),
            RendererMsg::Update { states } => self.update(states),
            RendererMsg::SetClipMask { mask } => self.set_clip_mask(mask),
            RendererMsg::SetPaused { paused } => self.set_paused(paused),
            RendererMsg::LoadWatermark { key, url } => self.load_watermark(key, url),
            RendererMsg::WatermarkLoaded { key, url, image } => {
                self.install_watermark(key, url, image)
            }
            RendererMsg::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Handles every message already queued without blocking.
    pub fn drain_messages(&mut self, receiver: &Receiver<RendererMsg>) -> ControlFlow<()> {
        loop {
            match receiver.try_recv() {
                Ok(message) => self.handle_message(message)?,
                Err(TryRecvError::Empty) => return ControlFlow::Continue(()),
                Err(TryRecvError::Disconnected) => return ControlFlow::Break(()),
            }
        }
    }

    fn register(&mut self, card_id: CardId, surface: Surface) {
        if self.resources.contains_key(&card_id) {
            self.stats.duplicate_registrations += 1;
            tracing::warn!(card_id = %card_id, "surface already registered, ignoring second handoff");
            return;
        }
        let order = self.next_registration;
        self.next_registration += 1;
        self.resources
            .insert(card_id.clone(), RenderResources::new(surface, order));
        tracing::debug!(card_id = %card_id, "render resources allocated");

        if self.states.contains_key(&card_id) {
            self.frame_scheduler.request_render();
        }
    }

    fn unregister(&mut self, card_id: &CardId) {
        if let Some(mut resources) = self.resources.remove(card_id) {
            resources.release_static_cache();
            tracing::debug!(card_id = %card_id, "render resources released");
        }
        self.states.remove(card_id);
    }

    fn update(&mut self, states: StateBatch) {
        let mut renderable = false;
        for state in states {
            let state = state.normalized();
            renderable |= self.resources.contains_key(&state.card_id);
            self.states.insert(state.card_id.clone(), state);
        }
        if renderable {
            self.frame_scheduler.request_render();
        }
    }

    fn set_clip_mask(&mut self, mask: ClipMask) {
        tracing::debug!(width = mask.width(), height = mask.height(), "clip mask installed");
        self.shared.clip_mask = Some(mask);
        // Painted output depends on the mask but state keys do not.
        for resources in self.resources.values_mut() {
            resources.invalidate();
        }
        if !self.resources.is_empty() {
            self.frame_scheduler.request_render();
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::debug!(paused, pending = self.is_render_requested(), "render passes toggled");
        }
        self.paused = paused;
    }

    fn load_watermark(&mut self, key: SmolStr, url: SmolStr) {
        if !self.shared.watermarks.begin_load(&key) {
            return;
        }
        let fetcher = Arc::clone(&self.fetcher);
        let loopback = self.loopback.clone();
        let thread_key = key.clone();
        let spawned = thread::Builder::new()
            .name("hologram-watermark".into())
            .spawn(move || match fetcher.fetch(&url) {
                Ok(image) => {
                    let _ = loopback.send(RendererMsg::WatermarkLoaded {
                        key: thread_key,
                        url,
                        image,
                    });
                }
                Err(error) => {
                    tracing::warn!(key = %thread_key, url = %url, %error, "watermark load failed");
                }
            });
        if let Err(error) = spawned {
            tracing::warn!(key = %key, %error, "watermark loader thread unavailable");
        }
    }

    fn install_watermark(&mut self, key: SmolStr, url: SmolStr, image: RgbaImage) {
        let mut affected = false;
        for (card_id, state) in &self.states {
            let uses_image = state.enabled_watermark
                && state
                    .watermark
                    .mask_url
                    .as_ref()
                    .is_some_and(|mask_url| *mask_url == key || *mask_url == url);
            if !uses_image {
                continue;
            }
            if let Some(resources) = self.resources.get_mut(card_id) {
                resources.invalidate();
                affected = true;
            }
        }
        self.shared.watermarks.insert(key, url, image);
        if affected {
            self.frame_scheduler.request_render();
        }
    }

    /// Runs one frame pass if a render was requested. Cards are visited high,
    /// medium, low; each is painted, blitted from its static snapshot, skipped
    /// as unchanged, or skipped because its priority is out of phase.
    ///
    /// While paused nothing runs and the request is kept for resume.
    pub fn render_frame(&mut self) -> Option<FrameReport> {
        if self.paused {
            return None;
        }
        let tick = self.frame_scheduler.begin_frame()?;
        let budget = self.config.frame_budget;
        let mut report = FrameReport {
            sequence: tick.sequence,
            ..FrameReport::default()
        };
        let mut outcome = FrameOutcome::default();

        for card_id in self.visit_order() {
            let Some(state) = self.states.get(&card_id) else {
                continue;
            };
            let Some(resources) = self.resources.get_mut(&card_id) else {
                continue;
            };
            outcome.any_active |= state.active;

            let effective = state.with_dpr(budget.effective_dpr(state.priority, state.dpr));
            let key = effective.state_key();
            if !tick.admits(state.priority, &budget) {
                report.phase_skipped += 1;
                if resources.last_state_key.as_ref() != Some(&key) {
                    outcome.deferred_cards = true;
                }
                continue;
            }

            let card_outcome = render_card(&self.painter, &self.shared, resources, &effective, key);
            if matches!(card_outcome, CardOutcome::Painted | CardOutcome::Blitted) {
                resources.surface.present(&card_id);
                if self.config.emit_render_acks {
                    self.events.push_rendered(card_id.clone(), Instant::now());
                }
            }
            report.record(card_outcome);
        }

        let decision = self.frame_scheduler.finish_frame(tick, outcome);
        report.continued = decision.render_requested;
        self.absorb(&report);
        Some(report)
    }

    fn visit_order(&self) -> SmallVec<[CardId; 8]> {
        let mut order: SmallVec<[(_, u64, CardId); 8]> = self
            .resources
            .iter()
            .filter_map(|(card_id, resources)| {
                let state = self.states.get(card_id)?;
                Some((state.priority, resources.registration_order, card_id.clone()))
            })
            .collect();
        order.sort_by_key(|(priority, registration_order, _)| (*priority, *registration_order));
        order.into_iter().map(|(_, _, card_id)| card_id).collect()
    }

    fn absorb(&mut self, report: &FrameReport) {
        self.stats.passes += 1;
        self.stats.paints += u64::from(report.painted);
        self.stats.cache_blits += u64::from(report.blitted);
        self.stats.unchanged_skips += u64::from(report.unchanged);
        self.stats.phase_skips += u64::from(report.phase_skipped);
        self.stats.failures += u64::from(report.failed);
    }
}

fn render_card<P: Painter>(
    painter: &P,
    shared: &SharedAssets,
    resources: &mut RenderResources<P::Caches>,
    state: &RenderState,
    key: StateKey,
) -> CardOutcome {
    if state.mode.is_static() && resources.blit_static_cache(&key) {
        resources.last_state_key = Some(key);
        return CardOutcome::Blitted;
    }
    if resources.last_state_key.as_ref() == Some(&key) {
        return CardOutcome::Unchanged;
    }

    let (width, height) = state.draw_size();
    if !state.draw_size_in_bounds() {
        tracing::error!(
            card_id = %state.card_id,
            width,
            height,
            limit = MAX_DRAW_DIMENSION,
            "draw size out of bounds"
        );
        resources.invalidate();
        return CardOutcome::Failed;
    }
    resources.surface.resize(width, height);
    resources.refresh_gradient(state.theme_hue);
    let gradient = resources.gradient();
    let watermark = if state.enabled_watermark {
        state
            .watermark
            .mask_url
            .as_deref()
            .and_then(|url| shared.watermarks.lookup(url))
    } else {
        None
    };
    let input = PaintInput {
        state,
        gradient: &gradient,
        clip_mask: shared.clip_mask.as_ref(),
        watermark,
    };

    let caches = resources.caches.take().unwrap_or_default();
    let target = resources.surface.pixels_mut();
    let painted = panic::catch_unwind(AssertUnwindSafe(|| painter.paint(target, &input, caches)));
    match painted {
        Ok(Ok(caches)) => resources.caches = Some(caches),
        Ok(Err(error)) => {
            tracing::error!(card_id = %state.card_id, %error, "paint failed");
            resources.invalidate();
            return CardOutcome::Failed;
        }
        Err(payload) => {
            let panic_message = panic_message(payload.as_ref());
            tracing::error!(card_id = %state.card_id, panic_message, "painter panicked");
            resources.invalidate();
            return CardOutcome::Failed;
        }
    }

    if state.mode.is_static() {
        resources.capture_static_cache(key.clone());
    } else {
        resources.release_static_cache();
    }
    resources.last_state_key = Some(key);
    CardOutcome::Painted
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
