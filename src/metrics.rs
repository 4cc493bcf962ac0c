//! Prometheus-compatible metrics endpoint
//!
//! Counters shared by every client session in the process.
//! Default endpoint: http://localhost:<METRICS_PORT>/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for sync sessions
#[derive(Debug)]
pub struct Metrics {
    // Sessions
    pub sessions_active: AtomicU64,
    pub snapshots_applied: AtomicU64,
    pub forced_leaves: AtomicU64,

    // Store traffic
    pub store_writes: AtomicU64,
    pub store_write_failures: AtomicU64,

    // Peer traffic
    pub peers_connected: AtomicU64,
    pub peer_messages_sent: AtomicU64,
    pub peer_messages_received: AtomicU64,
    pub peer_messages_dropped: AtomicU64,

    // Gameplay
    pub noise_events: AtomicU64,
    pub hunts_started: AtomicU64,
    pub captures: AtomicU64,
    pub matches_finished: AtomicU64,

    // Frame timing (microseconds)
    pub frame_time_us: AtomicU64,
    pub frame_time_p95_us: AtomicU64,
    pub frame_time_max_us: AtomicU64,
    pub frame_count: AtomicU64,

    start_time: Instant,

    // Rolling frame times for percentile calculation
    frame_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
            forced_leaves: AtomicU64::new(0),
            store_writes: AtomicU64::new(0),
            store_write_failures: AtomicU64::new(0),
            peers_connected: AtomicU64::new(0),
            peer_messages_sent: AtomicU64::new(0),
            peer_messages_received: AtomicU64::new(0),
            peer_messages_dropped: AtomicU64::new(0),
            noise_events: AtomicU64::new(0),
            hunts_started: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            matches_finished: AtomicU64::new(0),
            frame_time_us: AtomicU64::new(0),
            frame_time_p95_us: AtomicU64::new(0),
            frame_time_max_us: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            start_time: Instant::now(),
            frame_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record the outcome of one store write
    pub fn record_write<T, E>(&self, result: &Result<T, E>) {
        match result {
            Ok(_) => Self::incr(&self.store_writes),
            Err(_) => Self::incr(&self.store_write_failures),
        }
    }

    /// Record a frame time and update percentiles
    pub fn record_frame_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.frame_time_us.store(us, Ordering::Relaxed);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.frame_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.frame_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.frame_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("hush_sessions_active", "Client sessions currently in a room", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("hush_snapshots_applied_total", "Room snapshots derived", "counter",
            self.snapshots_applied.load(Ordering::Relaxed));
        metric!("hush_forced_leaves_total", "Sessions returned to the lobby by a finished or missing room", "counter",
            self.forced_leaves.load(Ordering::Relaxed));

        metric!("hush_store_writes_total", "Store writes that succeeded", "counter",
            self.store_writes.load(Ordering::Relaxed));
        metric!("hush_store_write_failures_total", "Store writes that failed", "counter",
            self.store_write_failures.load(Ordering::Relaxed));

        metric!("hush_peers_connected", "Open peer data channels", "gauge",
            self.peers_connected.load(Ordering::Relaxed));
        metric!("hush_peer_messages_sent_total", "Peer messages sent", "counter",
            self.peer_messages_sent.load(Ordering::Relaxed));
        metric!("hush_peer_messages_received_total", "Peer messages received", "counter",
            self.peer_messages_received.load(Ordering::Relaxed));
        metric!("hush_peer_messages_dropped_total", "Peer messages undecodable or unsent", "counter",
            self.peer_messages_dropped.load(Ordering::Relaxed));

        metric!("hush_noise_events_total", "Noise events handled by a host", "counter",
            self.noise_events.load(Ordering::Relaxed));
        metric!("hush_hunts_started_total", "Dormant to hunting transitions written", "counter",
            self.hunts_started.load(Ordering::Relaxed));
        metric!("hush_captures_total", "Players added to caughtPlayers", "counter",
            self.captures.load(Ordering::Relaxed));
        metric!("hush_matches_finished_total", "Matches ended by the host", "counter",
            self.matches_finished.load(Ordering::Relaxed));

        metric!("hush_frame_time_microseconds", "Last frame time in microseconds", "gauge",
            self.frame_time_us.load(Ordering::Relaxed));
        metric!("hush_frame_time_p95_microseconds", "95th percentile frame time", "gauge",
            self.frame_time_p95_us.load(Ordering::Relaxed));
        metric!("hush_frame_time_max_microseconds", "Maximum frame time", "gauge",
            self.frame_time_max_us.load(Ordering::Relaxed));
        metric!("hush_frame_count", "Frames simulated", "counter",
            self.frame_count.load(Ordering::Relaxed));
        metric!("hush_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON form of the same counters
    pub fn to_json(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "sessions": {
                "active": load(&self.sessions_active),
                "snapshots_applied": load(&self.snapshots_applied),
                "forced_leaves": load(&self.forced_leaves),
            },
            "store": {
                "writes": load(&self.store_writes),
                "write_failures": load(&self.store_write_failures),
            },
            "peers": {
                "connected": load(&self.peers_connected),
                "messages_sent": load(&self.peer_messages_sent),
                "messages_received": load(&self.peer_messages_received),
                "messages_dropped": load(&self.peer_messages_dropped),
            },
            "game": {
                "noise_events": load(&self.noise_events),
                "hunts_started": load(&self.hunts_started),
                "captures": load(&self.captures),
                "matches_finished": load(&self.matches_finished),
            },
            "performance": {
                "frame_time_us": load(&self.frame_time_us),
                "frame_time_p95_us": load(&self.frame_time_p95_us),
                "frame_time_max_us": load(&self.frame_time_max_us),
                "frame_count": load(&self.frame_count),
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

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
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

                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

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
