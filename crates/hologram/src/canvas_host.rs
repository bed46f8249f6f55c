//! Per-card bridge between UI props and the scheduler.
//!
//! A host owns one surface until it hands it over, tracks its container
//! size, and republishes a `RenderState` whenever props or size change.
//! Changes are batched: `commit` is the end-of-tick boundary and publishes
//! at most once.

use std::sync::Arc;

use render_protocol::{CardId, Pointer, Priority, RenderMode, RenderState, Surface, WatermarkConfig};

use crate::scheduler::{Registration, Scheduler};

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasProps {
    pub priority: Priority,
    pub enabled_pattern: bool,
    pub enabled_watermark: bool,
    pub mode: RenderMode,
    pub pointer_x: f32,
    pub pointer_y: f32,
    pub active: bool,
    pub theme_hue: f32,
    pub watermark: WatermarkConfig,
}

impl Default for CanvasProps {
    fn default() -> Self {
        Self {
            priority: Priority::High,
            enabled_pattern: true,
            enabled_watermark: false,
            mode: RenderMode::Dynamic,
            pointer_x: 0.0,
            pointer_y: 0.0,
            active: false,
            theme_hue: 0.0,
            watermark: WatermarkConfig::default(),
        }
    }
}

/// Observed container box, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
    pub device_pixel_ratio: f32,
}

impl ContainerSize {
    pub fn new(width: f32, height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio,
        }
    }

    fn logical_size(&self) -> (u32, u32) {
        (logical_dimension(self.width), logical_dimension(self.height))
    }
}

fn logical_dimension(value: f32) -> u32 {
    if value.is_finite() && value >= 1.0 {
        value.round() as u32
    } else {
        1
    }
}

pub struct CanvasHost {
    scheduler: Arc<Scheduler>,
    card_id: CardId,
    props: CanvasProps,
    size: Option<ContainerSize>,
    registration: Option<Registration>,
    dirty: bool,
    mounted: bool,
    last_published: Option<RenderState>,
}

impl CanvasHost {
    pub fn new(scheduler: Arc<Scheduler>, card_id: impl Into<CardId>, props: CanvasProps) -> Self {
        Self {
            scheduler,
            card_id: card_id.into(),
            props,
            size: None,
            registration: None,
            dirty: true,
            mounted: true,
            last_published: None,
        }
    }

    pub fn card_id(&self) -> &CardId {
        &self.card_id
    }

    pub fn props(&self) -> &CanvasProps {
        &self.props
    }

    pub fn is_transferred(&self) -> bool {
        self.registration.is_some()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Hands `surface` to the scheduler. Only the first call transfers; later
    /// calls drop their surface and return `false`.
    pub fn attach_surface(&mut self, surface: Surface) -> bool {
        if self.registration.is_some() || !self.mounted {
            return false;
        }
        self.registration = Some(self.scheduler.register(self.card_id.clone(), surface));
        self.dirty = true;
        true
    }

    pub fn set_props(&mut self, props: CanvasProps) {
        if props != self.props {
            self.props = props;
            self.dirty = true;
        }
    }

    pub fn on_resize(&mut self, size: ContainerSize) {
        if self.size != Some(size) {
            self.size = Some(size);
            self.dirty = true;
        }
    }

    /// Publishes the batched changes. Returns whether a state was sent.
    ///
    /// Nothing is published before the first size is known, after unmount,
    /// or when the resulting state equals the last published one.
    pub fn commit(&mut self) -> bool {
        if !self.mounted || !self.dirty {
            return false;
        }
        let Some(state) = self.render_state() else {
            return false;
        };
        self.dirty = false;
        if self.last_published.as_ref() == Some(&state) {
            return false;
        }

        if state.enabled_watermark {
            if let Some(url) = &state.watermark.mask_url {
                self.scheduler.load_watermark(url.clone(), url.clone());
            }
        }
        self.scheduler.update(state.clone());
        self.last_published = Some(state);
        true
    }

    /// Stops publishing. The card stays registered with the renderer, which
    /// keeps its resources idle.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.dirty = false;
    }

    /// Current visual attributes, for inspection.
    pub fn attributes(&self) -> [(&'static str, &'static str); 4] {
        [
            ("data-pattern", on_off(self.props.enabled_pattern)),
            ("data-watermark", on_off(self.props.enabled_watermark)),
            ("data-mode", self.props.mode.as_str()),
            ("data-priority", self.props.priority.as_str()),
        ]
    }

    fn render_state(&self) -> Option<RenderState> {
        let size = self.size?;
        let (width, height) = size.logical_size();
        let props = &self.props;
        let state = RenderState {
            card_id: self.card_id.clone(),
            priority: props.priority,
            mode: props.mode,
            width,
            height,
            dpr: size.device_pixel_ratio,
            pointer: Pointer::new(props.pointer_x, props.pointer_y),
            active: props.active,
            theme_hue: props.theme_hue,
            enabled_pattern: props.enabled_pattern,
            enabled_watermark: props.enabled_watermark,
            watermark: props.watermark.clone(),
        };
        Some(state.normalized())
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Harness;

    fn size() -> ContainerSize {
        ContainerSize::new(340.4, 213.6, 2.0)
    }

    fn host(harness: &Harness, props: CanvasProps) -> CanvasHost {
        CanvasHost::new(Arc::clone(&harness.scheduler), "card-1", props)
    }

    #[test]
    fn surface_is_transferred_once() {
        let mut harness = Harness::started();
        let mut host = host(&harness, CanvasProps::default());

        assert!(host.attach_surface(Surface::new(4, 4)));
        assert!(!host.attach_surface(Surface::new(8, 8)));

        let registers = harness
            .take_sent()
            .iter()
            .filter(|message| matches!(message, render_protocol::RendererMsg::Register { .. }))
            .count();
        assert_eq!(registers, 1);
        assert!(host.is_transferred());
    }

    #[test]
    fn nothing_is_published_before_the_first_resize() {
        let harness = Harness::started();
        let mut host = host(&harness, CanvasProps::default());

        assert!(!host.commit());

        host.on_resize(size());
        assert!(host.commit());
        let state = harness
            .scheduler
            .known_state(host.card_id())
            .expect("published");
        assert_eq!((state.width, state.height, state.dpr), (340, 214, 2.0));
    }

    #[test]
    fn same_tick_changes_are_published_once() {
        let harness = Harness::started();
        let mut host = host(&harness, CanvasProps::default());
        host.on_resize(size());
        host.set_props(CanvasProps {
            pointer_x: 0.3,
            ..CanvasProps::default()
        });
        host.set_props(CanvasProps {
            pointer_x: 0.6,
            theme_hue: 200.0,
            ..CanvasProps::default()
        });

        assert!(host.commit());
        assert!(!host.commit());

        let report = harness.scheduler.on_animation_frame();
        assert_eq!(report.states_sent, 1);
        let state = harness.scheduler.known_state(host.card_id()).expect("published");
        assert_eq!(state.pointer, Pointer::new(0.6, 0.0));
        assert_eq!(state.theme_hue, 200.0);
    }

    #[test]
    fn pointer_is_clamped_and_static_mode_is_idle() {
        let harness = Harness::started();
        let mut host = host(
            &harness,
            CanvasProps {
                pointer_x: 3.0,
                pointer_y: -7.5,
                active: true,
                ..CanvasProps::default()
            },
        );
        host.on_resize(size());
        host.commit();
        let state = harness.scheduler.known_state(host.card_id()).expect("published");
        assert_eq!(state.pointer, Pointer::new(1.0, -1.0));
        assert!(state.active);

        host.set_props(CanvasProps {
            mode: RenderMode::Static,
            ..host.props().clone()
        });
        host.commit();
        let state = harness.scheduler.known_state(host.card_id()).expect("published");
        assert_eq!(state.pointer, Pointer::CENTER);
        assert!(!state.active);
    }

    #[test]
    fn unchanged_state_is_not_republished() {
        let harness = Harness::started();
        let mut host = host(&harness, CanvasProps::default());
        host.on_resize(size());
        assert!(host.commit());

        // Different props, same normalized state.
        host.set_props(CanvasProps {
            pointer_x: 1.0,
            ..CanvasProps::default()
        });
        assert!(host.commit());
        host.set_props(CanvasProps {
            pointer_x: 5.0,
            ..CanvasProps::default()
        });
        assert!(!host.commit());
    }

    #[test]
    fn enabled_watermark_requests_its_image() {
        let mut harness = Harness::started();
        let mut host = host(
            &harness,
            CanvasProps {
                enabled_watermark: true,
                watermark: WatermarkConfig {
                    mask_url: Some("icons/star.png".into()),
                    ..WatermarkConfig::default()
                },
                ..CanvasProps::default()
            },
        );
        host.on_resize(size());
        host.commit();

        let loads: Vec<_> = harness
            .take_sent()
            .into_iter()
            .filter_map(|message| match message {
                render_protocol::RendererMsg::LoadWatermark { key, url } => Some((key, url)),
                _ => None,
            })
            .collect();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].0, loads[0].1);
        assert_eq!(loads[0].1.as_str(), "icons/star.png");
    }

    #[test]
    fn loaded_watermark_reaches_the_renderer() {
        let mut harness = Harness::started();
        let mut host = host(
            &harness,
            CanvasProps {
                enabled_watermark: true,
                watermark: WatermarkConfig {
                    mask_url: Some("icons/star.png".into()),
                    ..WatermarkConfig::default()
                },
                ..CanvasProps::default()
            },
        );
        host.attach_surface(Surface::new(1, 1));
        host.on_resize(size());
        host.commit();
        harness.tick();
        assert!(harness.wait_for_watermarks(1));

        harness.tick();

        assert!(harness.painter.paints_for("card-1") >= 1);
        assert_eq!(harness.painter.last_had_watermark(), Some(true));
        assert_eq!(harness.fetches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn unmount_stops_publishing_but_keeps_the_registration() {
        let mut harness = Harness::started();
        let mut host = host(&harness, CanvasProps::default());
        host.attach_surface(Surface::new(1, 1));
        host.on_resize(size());
        host.commit();
        harness.tick();

        host.unmount();
        host.set_props(CanvasProps {
            theme_hue: 90.0,
            ..CanvasProps::default()
        });
        assert!(!host.commit());
        drop(host);
        harness.tick();

        assert!(!harness.sent_kinds().contains(&"unregister"));
        assert!(harness.worker.has_resources(&CardId::new("card-1")));
        assert_eq!(harness.scheduler.registered_count(), 1);
    }

    #[test]
    fn attributes_mirror_visual_props() {
        let harness = Harness::started();
        let host = host(
            &harness,
            CanvasProps {
                priority: Priority::Low,
                mode: RenderMode::Static,
                enabled_pattern: false,
                enabled_watermark: true,
                ..CanvasProps::default()
            },
        );

        assert_eq!(
            host.attributes(),
            [
                ("data-pattern", "off"),
                ("data-watermark", "on"),
                ("data-mode", "static"),
                ("data-priority", "low"),
            ]
        );
    }
}
