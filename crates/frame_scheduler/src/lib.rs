use render_protocol::Priority;

/// Per-priority frame budget: how often each class is eligible to paint and
/// at what resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBudgetConfig {
    pub high_divisor: u64,
    pub medium_divisor: u64,
    pub low_divisor: u64,
    pub medium_dpr: f32,
    pub low_dpr: f32,
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            high_divisor: 1,
            medium_divisor: 2,
            low_divisor: 4,
            medium_dpr: 1.0,
            low_dpr: 0.5,
        }
    }
}

impl FrameBudgetConfig {
    pub fn divisor(&self, priority: Priority) -> u64 {
        let divisor = match priority {
            Priority::High => self.high_divisor,
            Priority::Medium => self.medium_divisor,
            Priority::Low => self.low_divisor,
        };
        divisor.max(1)
    }

    /// `high` keeps the requested dpr; lower classes render at a fixed,
    /// reduced resolution whatever the host asked for.
    pub fn effective_dpr(&self, priority: Priority, requested_dpr: f32) -> f32 {
        match priority {
            Priority::High => requested_dpr,
            Priority::Medium => self.medium_dpr,
            Priority::Low => self.low_dpr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub sequence: u64,
}

impl FrameTick {
    pub fn admits(&self, priority: Priority, config: &FrameBudgetConfig) -> bool {
        self.sequence % config.divisor(priority) == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    /// Some visited card's current state has `active` set.
    pub any_active: bool,
    /// Some card with an unpainted state was skipped by its tick phase.
    pub deferred_cards: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerUpdateReason {
    ActiveCards,
    DeferredCards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchedulerDecision {
    pub frame_sequence_id: u64,
    pub render_requested: bool,
    pub update_reason: Option<SchedulerUpdateReason>,
}

/// Tick counter plus the single "render requested" flag of the frame loop.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    config: FrameBudgetConfig,
    next_sequence: u64,
    render_requested: bool,
}

impl FrameScheduler {
    pub fn new(config: FrameBudgetConfig) -> Self {
        Self {
            config,
            next_sequence: 0,
            render_requested: false,
        }
    }

    pub fn config(&self) -> FrameBudgetConfig {
        self.config
    }

    pub fn is_render_requested(&self) -> bool {
        self.render_requested
    }

    /// Returns `false` when a request was already pending.
    pub fn request_render(&mut self) -> bool {
        let newly_requested = !self.render_requested;
        self.render_requested = true;
        newly_requested
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.next_sequence
    }

    /// Consumes the pending request and hands out the next tick.
    pub fn begin_frame(&mut self) -> Option<FrameTick> {
        if !self.render_requested {
            return None;
        }
        self.render_requested = false;
        let tick = FrameTick {
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        Some(tick)
    }

    pub fn finish_frame(&mut self, tick: FrameTick, outcome: FrameOutcome) -> FrameSchedulerDecision {
        let update_reason = if outcome.any_active {
            Some(SchedulerUpdateReason::ActiveCards)
        } else if outcome.deferred_cards {
            Some(SchedulerUpdateReason::DeferredCards)
        } else {
            None
        };
        if update_reason.is_some() {
            self.render_requested = true;
        }
        FrameSchedulerDecision {
            frame_sequence_id: tick.sequence,
            render_requested: self.render_requested,
            update_reason,
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(FrameBudgetConfig::default())
    }
}
