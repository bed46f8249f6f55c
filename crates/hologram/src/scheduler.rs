//! Main-thread scheduler.
//!
//! Single point of contact between canvas hosts and the background renderer.
//! It owns the renderer thread, queues registrations until the renderer is
//! ready, keeps the latest `RenderState` per card, and sends at most one
//! batched `Update` per animation frame. Hidden pages pause flushing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use engine::{LatestValueMailbox, MainThreadChannels, create_thread_channels};
use paint::{ClipMaskSpec, Painter, synthesize_clip_mask};
use render_protocol::{CardId, ClipMask, RenderState, RendererEvent, RendererMsg, Surface};
use renderer::{FileWatermarkFetcher, RendererConfig, WatermarkFetcher};
use smol_str::SmolStr;

use crate::runtime::spawn_renderer;

const RENDERED_LOG_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Device pixel ratio the shared clip mask is rasterized at.
    pub device_pixel_ratio: f32,
    /// Slots in the renderer→main event ring.
    pub event_capacity: usize,
    /// When false no thread is spawned and every call is a no-op.
    pub background_enabled: bool,
    pub renderer: RendererConfig,
    pub clip_mask: ClipMaskSpec,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            event_capacity: 256,
            background_enabled: true,
            renderer: RendererConfig::default(),
            clip_mask: ClipMaskSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// What one `on_animation_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Renderer events drained.
    pub events: usize,
    /// A scheduled flush ran.
    pub flushed: bool,
    /// States carried by the `Update` message, zero if none was sent.
    pub states_sent: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAck {
    pub card_id: CardId,
    pub timestamp: Instant,
}

enum ClipMaskDelivery {
    Pending(Receiver<ClipMask>),
    Ready(ClipMask),
    Sent,
    Unavailable,
}

struct SchedulerState {
    link: Option<MainThreadChannels>,
    ready: bool,
    queued_registrations: VecDeque<(CardId, Surface)>,
    registered: HashSet<CardId>,
    known_states: HashMap<CardId, RenderState>,
    pending: LatestValueMailbox<RenderState>,
    flush_scheduled: bool,
    paused: bool,
    clip_mask: ClipMaskDelivery,
    requested_watermarks: HashSet<SmolStr>,
    rendered_counts: HashMap<CardId, u64>,
    rendered_log: VecDeque<RenderedAck>,
    event_buffer: Vec<RendererEvent>,
}

impl SchedulerState {
    fn new(link: Option<MainThreadChannels>, clip_mask: ClipMaskDelivery) -> Self {
        Self {
            link,
            ready: false,
            queued_registrations: VecDeque::new(),
            registered: HashSet::new(),
            known_states: HashMap::new(),
            pending: LatestValueMailbox::new(),
            flush_scheduled: false,
            paused: false,
            clip_mask,
            requested_watermarks: HashSet::new(),
            rendered_counts: HashMap::new(),
            rendered_log: VecDeque::new(),
            event_buffer: Vec::new(),
        }
    }

    fn send(&mut self, message: RendererMsg) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if link.command_sender.send(message).is_err() {
            tracing::error!("background renderer disconnected, scheduler is now a no-op");
            self.link = None;
        }
    }

    fn pump_events(&mut self) -> usize {
        let Some(link) = self.link.as_mut() else {
            return 0;
        };
        let mut events = std::mem::take(&mut self.event_buffer);
        link.event_consumer.drain_into(&mut events);
        let abandoned = events.is_empty() && link.event_consumer.is_abandoned();

        let count = events.len();
        for event in events.drain(..) {
            match event {
                RendererEvent::Ready => self.on_ready(),
                RendererEvent::Rendered { card_id, timestamp } => {
                    *self.rendered_counts.entry(card_id.clone()).or_default() += 1;
                    if self.rendered_log.len() == RENDERED_LOG_LIMIT {
                        self.rendered_log.pop_front();
                    }
                    self.rendered_log.push_back(RenderedAck { card_id, timestamp });
                }
            }
        }
        self.event_buffer = events;

        if abandoned {
            tracing::error!("background renderer exited, scheduler is now a no-op");
            self.link = None;
        }
        count
    }

    fn on_ready(&mut self) {
        if self.ready {
            return;
        }
        self.ready = true;
        let queued = self.queued_registrations.len();
        while let Some((card_id, surface)) = self.queued_registrations.pop_front() {
            self.send(RendererMsg::Register { card_id, surface });
        }
        tracing::debug!(queued, "background renderer ready");
        self.deliver_clip_mask();
    }

    /// Sends the clip mask once both it and readiness exist, in either order.
    fn deliver_clip_mask(&mut self) {
        let current = std::mem::replace(&mut self.clip_mask, ClipMaskDelivery::Unavailable);
        self.clip_mask = match current {
            ClipMaskDelivery::Pending(receiver) => match receiver.try_recv() {
                Ok(mask) => ClipMaskDelivery::Ready(mask),
                Err(TryRecvError::Empty) => ClipMaskDelivery::Pending(receiver),
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("clip mask synthesis ended without a result");
                    ClipMaskDelivery::Unavailable
                }
            },
            other => other,
        };
        if !self.ready {
            return;
        }
        match std::mem::replace(&mut self.clip_mask, ClipMaskDelivery::Sent) {
            ClipMaskDelivery::Ready(mask) => self.send(RendererMsg::SetClipMask { mask }),
            other => self.clip_mask = other,
        }
    }

    fn flush(&mut self) -> usize {
        let states = self.pending.drain();
        let count = states.len();
        if count > 0 {
            self.send(RendererMsg::Update { states });
        }
        count
    }
}

/// Explicit scheduler context. Build one per application and share the `Arc`.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    renderer_thread: Option<JoinHandle<()>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new<P: Painter>(config: SchedulerConfig, painter: P) -> Arc<Self> {
        Self::with_fetcher(config, painter, Arc::new(FileWatermarkFetcher))
    }

    pub fn with_fetcher<P: Painter>(
        config: SchedulerConfig,
        painter: P,
        fetcher: Arc<dyn WatermarkFetcher>,
    ) -> Arc<Self> {
        if !config.background_enabled {
            tracing::info!("background rendering disabled, scheduler is a no-op");
            return Arc::new(Self::disabled(config));
        }

        let (main, renderer) = create_thread_channels(config.event_capacity.max(1));
        match spawn_renderer(painter, config.renderer, fetcher, renderer) {
            Ok(handle) => Arc::new(Self::connected(config, main, Some(handle))),
            Err(error) => {
                tracing::error!(%error, "background renderer unavailable, scheduler is a no-op");
                Arc::new(Self::disabled(config))
            }
        }
    }

    /// Wires the scheduler to already created channels. The renderer half is
    /// driven by whoever holds it; `renderer_thread` is joined on drop.
    pub(crate) fn connected(
        config: SchedulerConfig,
        channels: MainThreadChannels,
        renderer_thread: Option<JoinHandle<()>>,
    ) -> Self {
        let clip_mask = start_clip_mask(config.clip_mask, config.device_pixel_ratio);
        Self {
            state: Mutex::new(SchedulerState::new(Some(channels), clip_mask)),
            renderer_thread,
            config,
        }
    }

    fn disabled(config: SchedulerConfig) -> Self {
        Self {
            state: Mutex::new(SchedulerState::new(None, ClipMaskDelivery::Unavailable)),
            renderer_thread: None,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// False once the renderer is disabled, failed to start, or went away.
    pub fn is_enabled(&self) -> bool {
        self.lock().link.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn has_pending_flush(&self) -> bool {
        self.lock().flush_scheduled
    }

    pub fn clip_mask_delivered(&self) -> bool {
        matches!(self.lock().clip_mask, ClipMaskDelivery::Sent)
    }

    pub fn registered_count(&self) -> usize {
        self.lock().registered.len()
    }

    pub fn known_state(&self, card_id: &CardId) -> Option<RenderState> {
        self.lock().known_states.get(card_id).cloned()
    }

    /// Transfers `surface` to the renderer. The surface never comes back,
    /// not even through [`Registration::unregister`].
    ///
    /// Before the renderer is ready registrations wait in FIFO order. A
    /// second registration of the same card drops its surface and returns
    /// an inert handle.
    pub fn register(self: &Arc<Self>, card_id: impl Into<CardId>, surface: Surface) -> Registration {
        let card_id = card_id.into();
        let mut state = self.lock();
        if state.link.is_none() {
            return Registration::inert(card_id);
        }
        if !state.registered.insert(card_id.clone()) {
            tracing::warn!(card_id = %card_id, "card already registered, surface dropped");
            return Registration::inert(card_id);
        }

        if state.ready {
            state.send(RendererMsg::Register {
                card_id: card_id.clone(),
                surface,
            });
        } else {
            tracing::debug!(card_id = %card_id, "renderer not ready, registration queued");
            state.queued_registrations.push_back((card_id.clone(), surface));
        }
        Registration {
            card_id,
            scheduler: Arc::downgrade(self),
        }
    }

    fn unregister(&self, card_id: &CardId) {
        let mut state = self.lock();
        if !state.registered.remove(card_id) {
            return;
        }
        state.known_states.remove(card_id);
        state.pending.remove(card_id);
        state
            .queued_registrations
            .retain(|(queued, _)| queued != card_id);
        state.send(RendererMsg::Unregister {
            card_id: card_id.clone(),
        });
    }

    /// Records `render_state` as the card's latest state and schedules one
    /// coalesced flush. Repeated updates before the flush replace each other.
    pub fn update(&self, render_state: RenderState) {
        let mut state = self.lock();
        if state.link.is_none() {
            return;
        }
        state
            .known_states
            .insert(render_state.card_id.clone(), render_state.clone());
        state.pending.insert(render_state);
        if !state.paused {
            state.flush_scheduled = true;
        }
    }

    /// Asks the renderer to fetch and decode a watermark image. Only the
    /// first request per url is forwarded.
    pub fn load_watermark(&self, key: impl Into<SmolStr>, url: impl Into<SmolStr>) {
        let url = url.into();
        let mut state = self.lock();
        if state.link.is_none() || !state.requested_watermarks.insert(url.clone()) {
            return;
        }
        state.send(RendererMsg::LoadWatermark {
            key: key.into(),
            url,
        });
    }

    /// Hidden cancels a scheduled flush, suppresses new ones and stops the
    /// renderer's passes. Visible resumes both and schedules one catch-up
    /// flush if any card has state.
    pub fn set_visibility(&self, visibility: Visibility) {
        let mut state = self.lock();
        match visibility {
            Visibility::Hidden => {
                state.flush_scheduled = false;
                if state.paused {
                    return;
                }
                tracing::debug!("scheduler paused");
                state.paused = true;
                state.send(RendererMsg::SetPaused { paused: true });
            }
            Visibility::Visible => {
                if !state.paused {
                    return;
                }
                state.paused = false;
                state.send(RendererMsg::SetPaused { paused: false });
                state.flush_scheduled = !state.known_states.is_empty();
                tracing::debug!(catch_up = state.flush_scheduled, "scheduler resumed");
            }
        }
    }

    /// Drains renderer events without flushing. Returns how many were seen.
    pub fn poll_events(&self) -> usize {
        let mut state = self.lock();
        let events = state.pump_events();
        state.deliver_clip_mask();
        events
    }

    /// Animation-frame callback: drains events, delivers the clip mask when
    /// due, and runs the scheduled flush unless paused.
    pub fn on_animation_frame(&self) -> FlushReport {
        let mut state = self.lock();
        let mut report = FlushReport {
            events: state.pump_events(),
            ..FlushReport::default()
        };
        state.deliver_clip_mask();
        if state.flush_scheduled && !state.paused {
            state.flush_scheduled = false;
            report.flushed = true;
            report.states_sent = state.flush();
        }
        report
    }

    pub fn rendered_count(&self, card_id: &CardId) -> u64 {
        self.lock()
            .rendered_counts
            .get(card_id)
            .copied()
            .unwrap_or(0)
    }

    /// Takes the `Rendered` acknowledgements collected so far, oldest first.
    pub fn drain_rendered(&self) -> Vec<RenderedAck> {
        self.lock().rendered_log.drain(..).collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = state.link.take() {
            let _ = link.command_sender.send(RendererMsg::Shutdown);
        }
        if let Some(handle) = self.renderer_thread.take() {
            if handle.join().is_err() {
                tracing::error!("background renderer thread panicked");
            }
        }
    }
}

fn start_clip_mask(spec: ClipMaskSpec, device_pixel_ratio: f32) -> ClipMaskDelivery {
    let (sender, receiver) = bounded(1);
    let spawned = thread::Builder::new()
        .name("hologram-clip-mask".into())
        .spawn(move || {
            let _ = sender.send(synthesize_clip_mask(spec, device_pixel_ratio));
        });
    match spawned {
        Ok(_) => ClipMaskDelivery::Pending(receiver),
        Err(error) => {
            tracing::warn!(%error, "clip mask thread unavailable, synthesizing inline");
            ClipMaskDelivery::Ready(synthesize_clip_mask(spec, device_pixel_ratio))
        }
    }
}

/// Handle returned by [`Scheduler::register`].
///
/// Dropping it does nothing; the renderer keeps the card's resources until
/// `unregister` is called.
pub struct Registration {
    card_id: CardId,
    scheduler: Weak<Scheduler>,
}

impl Registration {
    fn inert(card_id: CardId) -> Self {
        Self {
            card_id,
            scheduler: Weak::new(),
        }
    }

    pub fn card_id(&self) -> &CardId {
        &self.card_id
    }

    /// Removes the card's bookkeeping and asks the renderer to release its
    /// resources.
    pub fn unregister(self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.unregister(&self.card_id);
        }
    }
}
