//! Offline demo: animates a few cards for a second of frames and writes the
//! last presented frame of each card to PNG.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use hologram::{
    CanvasHost, CanvasProps, CardId, ContainerSize, HologramPainter, PresentTarget, Priority,
    RenderMode, Scheduler, SchedulerConfig, Surface, WatermarkConfig,
};
use image::RgbaImage;

const FRAMES: u32 = 60;
const FRAME_DURATION: Duration = Duration::from_millis(16);
const DEFAULT_OUTPUT_DIR: &str = "hologram-out";

type Snapshots = Arc<Mutex<HashMap<CardId, RgbaImage>>>;

/// Keeps the latest presented pixels per card.
struct SnapshotTarget(Snapshots);

impl PresentTarget for SnapshotTarget {
    fn present(&mut self, card_id: &CardId, pixels: &RgbaImage) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(card_id.clone(), pixels.clone());
    }
}

#[derive(Parser)]
#[command(author, version, about = "Render a few hologram cards offline and save them as PNG")]
struct DemoArgs {
    /// Directory the card images are written to.
    #[arg(long = "out", short = 'o', value_parser, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Watermark icon applied to every card.
    #[arg(long)]
    watermark: Option<String>,
    /// Log at debug level; `RUST_LOG` may override it.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<(), image::ImageError> {
    let args = DemoArgs::parse();
    hologram::logging::init(args.debug);

    let snapshots: Snapshots = Arc::default();
    let scheduler = Scheduler::new(
        SchedulerConfig {
            device_pixel_ratio: 2.0,
            ..SchedulerConfig::default()
        },
        HologramPainter,
    );

    let cards = [
        ("featured", Priority::High, RenderMode::Dynamic, 300.0),
        ("grid-1", Priority::Medium, RenderMode::Dynamic, 200.0),
        ("grid-2", Priority::Low, RenderMode::Dynamic, 40.0),
        ("archived", Priority::Low, RenderMode::Static, 120.0),
    ];
    let watermark = WatermarkConfig {
        mask_url: args.watermark.as_deref().map(Into::into),
        ..WatermarkConfig::default()
    };
    let mut hosts: Vec<CanvasHost> = cards
        .iter()
        .map(|&(name, priority, mode, theme_hue)| {
            let mut host = CanvasHost::new(
                Arc::clone(&scheduler),
                name,
                CanvasProps {
                    priority,
                    mode,
                    theme_hue,
                    active: true,
                    enabled_watermark: watermark.mask_url.is_some(),
                    watermark: watermark.clone(),
                    ..CanvasProps::default()
                },
            );
            host.attach_surface(Surface::with_target(
                1,
                1,
                SnapshotTarget(Arc::clone(&snapshots)),
            ));
            host.on_resize(ContainerSize::new(340.0, 214.0, 2.0));
            host
        })
        .collect();

    for frame in 0..FRAMES {
        let phase = frame as f32 / FRAMES as f32 * std::f32::consts::TAU;
        for host in &mut hosts {
            let props = CanvasProps {
                pointer_x: phase.cos() * 0.8,
                pointer_y: phase.sin() * 0.5,
                ..host.props().clone()
            };
            host.set_props(props);
            host.commit();
        }
        let report = scheduler.on_animation_frame();
        tracing::debug!(frame, states = report.states_sent, "animation frame");
        thread::sleep(FRAME_DURATION);
    }

    for host in &mut hosts {
        host.set_props(CanvasProps {
            active: false,
            ..host.props().clone()
        });
        host.commit();
    }
    scheduler.on_animation_frame();
    thread::sleep(FRAME_DURATION * 8);
    scheduler.poll_events();

    for host in &hosts {
        tracing::info!(
            card_id = %host.card_id(),
            rendered = scheduler.rendered_count(host.card_id()),
            "card finished"
        );
    }
    drop(hosts);
    drop(scheduler);

    std::fs::create_dir_all(&args.output_dir)?;
    let snapshots = snapshots.lock().unwrap_or_else(PoisonError::into_inner);
    for (card_id, pixels) in snapshots.iter() {
        let path = args.output_dir.join(format!("{card_id}.png"));
        pixels.save(&path)?;
        tracing::info!(path = %path.display(), "wrote card");
    }
    Ok(())
}
