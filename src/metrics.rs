//! Prometheus-compatible metrics endpoint
//!
//! Exposes visualization metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::render::camera::Viewport;
use crate::render::resources::Layer;
use crate::visualization::Visualization;

/// Frame time samples kept for percentiles
const FRAME_HISTORY: usize = 1000;

/// Metrics registry for the visualization
#[derive(Debug)]
pub struct Metrics {
    // Entity counts
    pub snakes: AtomicU64,
    pub food: AtomicU64,
    pub visible_food: AtomicU64,

    // Sprite pools
    pub food_sprites_constructed: AtomicU64,
    pub food_sprites_in_use: AtomicU64,
    pub head_sprites_constructed: AtomicU64,
    pub head_sprites_in_use: AtomicU64,
    pub segment_sprites_constructed: AtomicU64,
    pub segment_sprites_in_use: AtomicU64,

    // Event flow
    pub events_handled: AtomicU64,
    pub producer_stalls: AtomicU64,
    pub event_errors: AtomicU64,
    pub ticks: AtomicU64,
    pub world_resets: AtomicU64,

    // Decay and eviction
    pub decay_sweeps: AtomicU64,
    pub food_evicted: AtomicU64,
    pub snakes_removed: AtomicU64,

    // Frame timing (microseconds)
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_p99_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,
    pub frame_count: AtomicU64,

    start_time: Instant,

    // Rolling frame times for percentile calculation
    frame_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            snakes: AtomicU64::new(0),
            food: AtomicU64::new(0),
            visible_food: AtomicU64::new(0),
            food_sprites_constructed: AtomicU64::new(0),
            food_sprites_in_use: AtomicU64::new(0),
            head_sprites_constructed: AtomicU64::new(0),
            head_sprites_in_use: AtomicU64::new(0),
            segment_sprites_constructed: AtomicU64::new(0),
            segment_sprites_in_use: AtomicU64::new(0),
            events_handled: AtomicU64::new(0),
            producer_stalls: AtomicU64::new(0),
            event_errors: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            world_resets: AtomicU64::new(0),
            decay_sweeps: AtomicU64::new(0),
            food_evicted: AtomicU64::new(0),
            snakes_removed: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_p99_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(FRAME_HISTORY)),
        }
    }

    /// Record a frame time and update percentiles
    pub fn record_frame_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > FRAME_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.frame_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Copy gauges and counters out of a visualization
    pub fn observe<V: Viewport>(&self, viz: &Visualization<V>) {
        let stats = viz.stats();
        let registry = viz.registry();
        let resources = viz.resources();

        self.snakes.store(registry.snake_count() as u64, Ordering::Relaxed);
        self.food.store(registry.food_count() as u64, Ordering::Relaxed);
        self.visible_food.store(stats.visible_food as u64, Ordering::Relaxed);

        let pools = [
            (Layer::Food, &self.food_sprites_constructed, &self.food_sprites_in_use),
            (Layer::SnakeHeads, &self.head_sprites_constructed, &self.head_sprites_in_use),
            (Layer::SnakeSegments, &self.segment_sprites_constructed, &self.segment_sprites_in_use),
        ];
        for (layer, constructed, in_use) in pools {
            let pool = resources.pool(layer);
            constructed.store(pool.constructed() as u64, Ordering::Relaxed);
            in_use.store(pool.in_use() as u64, Ordering::Relaxed);
        }

        self.events_handled.store(stats.events_handled, Ordering::Relaxed);
        self.ticks.store(stats.ticks, Ordering::Relaxed);
        self.world_resets.store(stats.world_resets, Ordering::Relaxed);
        self.decay_sweeps.store(stats.sweeps, Ordering::Relaxed);
        self.food_evicted.store(stats.food_evicted, Ordering::Relaxed);
        self.snakes_removed.store(stats.snakes_removed, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Entities
        metric!("arena_view_snakes", "Number of tracked snakes", "gauge",
            self.snakes.load(Ordering::Relaxed));
        metric!("arena_view_food", "Number of tracked food particles", "gauge",
            self.food.load(Ordering::Relaxed));
        metric!("arena_view_visible_food", "Food shown by the last visibility refresh", "gauge",
            self.visible_food.load(Ordering::Relaxed));

        // Pools
        output.push_str("# HELP arena_view_sprites_constructed Sprites constructed per pool\n# TYPE arena_view_sprites_constructed gauge\n");
        output.push_str("# HELP arena_view_sprites_in_use Sprites bound to an entity per pool\n# TYPE arena_view_sprites_in_use gauge\n");
        for (layer, constructed, in_use) in [
            ("food", &self.food_sprites_constructed, &self.food_sprites_in_use),
            ("heads", &self.head_sprites_constructed, &self.head_sprites_in_use),
            ("segments", &self.segment_sprites_constructed, &self.segment_sprites_in_use),
        ] {
            output.push_str(&format!(
                "arena_view_sprites_constructed{{layer=\"{}\"}} {}\narena_view_sprites_in_use{{layer=\"{}\"}} {}\n",
                layer,
                constructed.load(Ordering::Relaxed),
                layer,
                in_use.load(Ordering::Relaxed)
            ));
        }

        // Events
        metric!("arena_view_events_handled_total", "Events applied", "counter",
            self.events_handled.load(Ordering::Relaxed));
        metric!("arena_view_producer_stalls_total", "Producer sends that waited on a full buffer", "counter",
            self.producer_stalls.load(Ordering::Relaxed));
        metric!("arena_view_event_errors_total", "Events whose handler returned an error", "counter",
            self.event_errors.load(Ordering::Relaxed));
        metric!("arena_view_ticks_total", "Simulation ticks received", "counter",
            self.ticks.load(Ordering::Relaxed));
        metric!("arena_view_world_resets_total", "World info resets", "counter",
            self.world_resets.load(Ordering::Relaxed));

        // Decay
        metric!("arena_view_decay_sweeps_total", "Batched decay sweeps", "counter",
            self.decay_sweeps.load(Ordering::Relaxed));
        metric!("arena_view_food_evicted_total", "Food evicted by decay sweeps", "counter",
            self.food_evicted.load(Ordering::Relaxed));
        metric!("arena_view_snakes_removed_total", "Snakes removed by kills and snapshots", "counter",
            self.snakes_removed.load(Ordering::Relaxed));

        // Frame timing
        metric!("arena_view_frame_time_microseconds", "Current frame time in microseconds", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));
        metric!("arena_view_frame_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.frame_time_p95_us.load(Ordering::Relaxed));
        metric!("arena_view_frame_time_p99_microseconds", "99th percentile frame time", "gauge",
            self.frame_time_p99_us.load(Ordering::Relaxed));
        metric!("arena_view_frame_time_max_microseconds", "Maximum frame time", "gauge",
            self.frame_time_max_us.load(Ordering::Relaxed));
        metric!("arena_view_frame_count", "Total frames rendered", "counter",
            self.frame_count.load(Ordering::Relaxed));
        metric!("arena_view_uptime_seconds", "Uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "entities": {
                "snakes": self.snakes.load(Ordering::Relaxed),
                "food": self.food.load(Ordering::Relaxed),
                "visible_food": self.visible_food.load(Ordering::Relaxed),
            },
            "pools": {
                "food": {
                    "constructed": self.food_sprites_constructed.load(Ordering::Relaxed),
                    "in_use": self.food_sprites_in_use.load(Ordering::Relaxed),
                },
                "heads": {
                    "constructed": self.head_sprites_constructed.load(Ordering::Relaxed),
                    "in_use": self.head_sprites_in_use.load(Ordering::Relaxed),
                },
                "segments": {
                    "constructed": self.segment_sprites_constructed.load(Ordering::Relaxed),
                    "in_use": self.segment_sprites_in_use.load(Ordering::Relaxed),
                },
            },
            "events": {
                "handled": self.events_handled.load(Ordering::Relaxed),
                "producer_stalls": self.producer_stalls.load(Ordering::Relaxed),
                "errors": self.event_errors.load(Ordering::Relaxed),
                "ticks": self.ticks.load(Ordering::Relaxed),
                "world_resets": self.world_resets.load(Ordering::Relaxed),
            },
            "decay": {
                "sweeps": self.decay_sweeps.load(Ordering::Relaxed),
                "food_evicted": self.food_evicted.load(Ordering::Relaxed),
                "snakes_removed": self.snakes_removed.load(Ordering::Relaxed),
            },
            "performance": {
                "frame_time_us": self.frame_time_us.load(Ordering::Relaxed),
                "frame_time_p95_us": self.frame_time_p95_us.load(Ordering::Relaxed),
                "frame_time_p99_us": self.frame_time_p99_us.load(Ordering::Relaxed),
                "frame_time_max_us": self.frame_time_max_us.load(Ordering::Relaxed),
                "frame_count": self.frame_count.load(Ordering::Relaxed),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&request, &metrics);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

/// Build the HTTP response for a raw request
fn route(request: &str, metrics: &Metrics) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::net::protocol::{BotDescriptor, FoodSpawn, ViewEvent};
    use crate::render::camera::HeadlessViewport;
    use crate::render::resources::ResourceContext;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snakes.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.frame_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_frame_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_frame_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.frame_count.load(Ordering::Relaxed), 100);
        assert!(metrics.frame_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.frame_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_observe_visualization() {
        let mut viz = Visualization::new(ViewConfig::default(), ResourceContext::headless(), HeadlessViewport::default());
        let mut bot = BotDescriptor::new(1, "viper");
        bot.segments = vec![Vec2::new(10.0, 10.0), Vec2::new(6.0, 10.0), Vec2::new(2.0, 10.0)];
        viz.handle(ViewEvent::BotSpawn(bot)).unwrap();
        viz.handle(ViewEvent::FoodSpawn(FoodSpawn::new(1, 5.0, 5.0, 1.0))).unwrap();

        let metrics = Metrics::new();
        metrics.observe(&viz);

        assert_eq!(metrics.snakes.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.food.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.segment_sprites_in_use.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.events_handled.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.snakes.store(12, Ordering::Relaxed);
        metrics.food_sprites_in_use.store(300, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("arena_view_snakes 12"));
        assert!(output.contains("arena_view_sprites_in_use{layer=\"food\"} 300"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.food.store(100, Ordering::Relaxed);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["entities"]["food"], 100);
        assert!(parsed["performance"].is_object());
    }

    #[test]
    fn test_route() {
        let metrics = Metrics::new();
        assert!(route("GET /metrics HTTP/1.1\r\n", &metrics).contains("arena_view_snakes"));
        assert!(route("GET /json HTTP/1.1\r\n", &metrics).contains("application/json"));
        assert!(route("GET /health HTTP/1.1\r\n", &metrics).ends_with("OK"));
        assert!(route("POST /metrics HTTP/1.1\r\n", &metrics).starts_with("HTTP/1.1 404"));
    }
}
