use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use arena_view::config::{RunnerConfig, ViewConfig};
use arena_view::metrics::{self, Metrics};
use arena_view::net::event_buffer::{EventBuffer, EventSender};
use arena_view::net::feed::{load_replay, SyntheticFeed};
use arena_view::net::protocol::ViewEvent;
use arena_view::render::camera::{HeadlessViewport, ScreenSize, Viewport};
use arena_view::render::resources::{Layer, ResourceContext};
use arena_view::util::vec2::Vec2;
use arena_view::visualization::Visualization;

/// Seconds between status log lines
const STATUS_INTERVAL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Arena View v{}", env!("CARGO_PKG_VERSION"));

    let view_config = ViewConfig::load_or_default();
    view_config.validate().map_err(anyhow::Error::msg)?;
    let runner = RunnerConfig::load_or_default();
    runner.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} fps, decay rows={}, visibility every {} frames, grid {}x{}",
        runner.frame_rate,
        view_config.decay_rows,
        view_config.visibility_refresh_frames,
        view_config.grid_columns,
        view_config.grid_rows
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = runner.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut resources = ResourceContext::headless();
    resources.prewarm(view_config.pool_prewarm);

    let viewport = HeadlessViewport::new(ScreenSize {
        width: runner.screen_width,
        height: runner.screen_height,
    });
    let mut viz = Visualization::new(view_config, resources, viewport);

    let buffer = EventBuffer::new(runner.event_buffer_capacity);
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(runner.frame_rate));
    spawn_producer(&runner, buffer.sender(), frame_period, metrics.clone())?;

    let mut interval = tokio::time::interval(frame_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let status_every = u64::from(runner.frame_rate) * STATUS_INTERVAL_SECS;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_frame(&mut viz, &buffer, &metrics);
                if viz.stats().frames % status_every == 0 {
                    let stats = viz.stats();
                    info!(
                        "{} snakes, {} food ({} visible), {} sweeps, {} events",
                        viz.registry().snake_count(),
                        viz.registry().food_count(),
                        stats.visible_food,
                        stats.sweeps,
                        stats.events_handled
                    );
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Unblocks a producer waiting on a full buffer
    drop(buffer);
    let resources = viz.into_resources()?;
    info!(
        "Stopped; sprite pools hold {} food, {} head, {} segment sprites",
        resources.pool(Layer::Food).constructed(),
        resources.pool(Layer::SnakeHeads).constructed(),
        resources.pool(Layer::SnakeSegments).constructed()
    );

    Ok(())
}

/// Drain pending events, apply them, then render one frame
fn run_frame<V: Viewport>(viz: &mut Visualization<V>, buffer: &EventBuffer, metrics: &Metrics) {
    let start = Instant::now();

    for event in buffer.drain() {
        let kind = event.kind();
        if let Err(e) = viz.handle(event) {
            metrics.event_errors.fetch_add(1, Ordering::Relaxed);
            error!("Failed to apply {} event: {}", kind, e);
        }
    }
    viz.frame();

    metrics.record_frame_time(start.elapsed());
    metrics.observe(viz);
}

/// Start the event source: a replay file if configured, else the synthetic feed.
///
/// Both run on a blocking thread and wait on a full buffer, so no event is lost.
fn spawn_producer(
    runner: &RunnerConfig,
    sender: EventSender,
    frame_period: Duration,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    if let Some(path) = &runner.replay_path {
        let events = load_replay(path)?;
        info!("Replaying {} events from {}", events.len(), path.display());
        tokio::task::spawn_blocking(move || play_replay(events, sender, frame_period, metrics));
        return Ok(());
    }

    let size = runner.feed_world_size;
    let feed = SyntheticFeed::new(runner.feed_seed, runner.feed_bots, runner.feed_food, Vec2::new(size, size));
    info!(
        "Synthetic feed: seed {}, {} bots, {} food, world {}x{}",
        runner.feed_seed, runner.feed_bots, runner.feed_food, size, size
    );

    tokio::task::spawn_blocking(move || run_feed(feed, sender, frame_period, metrics));
    Ok(())
}

/// Push one event, counting stalls. Returns false once the frame loop is gone.
fn deliver(sender: &EventSender, event: ViewEvent, metrics: &Metrics) -> bool {
    match sender.send(event) {
        Ok(waited) => {
            if waited {
                metrics.producer_stalls.fetch_add(1, Ordering::Relaxed);
            }
            true
        }
        Err(_) => false,
    }
}

/// Generate synthetic arena events, one batch per frame
fn run_feed(mut feed: SyntheticFeed, sender: EventSender, frame_period: Duration, metrics: Arc<Metrics>) {
    let mut batch = feed.initial_events();
    loop {
        for event in batch {
            if !deliver(&sender, event, &metrics) {
                debug!("Frame loop stopped, synthetic feed exiting");
                return;
            }
        }
        std::thread::sleep(frame_period);
        batch = feed.next_tick();
    }
}

/// Push replay events in order, pacing one frame per recorded tick
fn play_replay(events: Vec<ViewEvent>, sender: EventSender, frame_period: Duration, metrics: Arc<Metrics>) {
    for event in events {
        let is_tick = matches!(event, ViewEvent::Tick { .. });
        if !deliver(&sender, event, &metrics) {
            return;
        }
        if is_tick {
            std::thread::sleep(frame_period);
        }
    }
    info!("Replay finished");
}
