//! HTTP handlers for API endpoints.

use crate::error::SystemError;
use crate::metrics::SamplerHealth;
use crate::web::router::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

/// Error wrapper that renders a JSON body with a fitting status code.
#[derive(Debug)]
pub struct ApiError(pub SystemError);

impl From<SystemError> for ApiError {
    fn from(err: SystemError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            SystemError::NoSnapshotYet => (StatusCode::SERVICE_UNAVAILABLE, "no_snapshot_yet"),
            SystemError::SamplerStopped => (StatusCode::SERVICE_UNAVAILABLE, "sampler_stopped"),
            SystemError::RefreshTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "refresh_timeout"),
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        (
            status,
            Json(json!({ "error": code, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Json<serde_json::Value>, ApiError> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| ApiError(SystemError::system_error(format!("Failed to serialize: {}", e))))
}

/// Latest cached snapshot. Never samples.
pub async fn get_snapshot(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.presenter.latest()?;
    to_json(snapshot.as_ref())
}

/// CPU trend buffer, oldest first.
pub async fn get_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "capacity": state.presenter.history_capacity(),
        "cpu_percent": state.presenter.history(),
    }))
}

/// Force an out-of-band sample and return it.
pub async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.presenter.trigger_refresh().await.map_err(|e| {
        warn!("Manual refresh failed: {}", e);
        ApiError(e)
    })?;
    to_json(snapshot.as_ref())
}

/// What this binary was compiled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            profile: if cfg!(debug_assertions) { "debug" } else { "release" },
        }
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.presenter.health();
    let (status, label) = match health {
        SamplerHealth::Healthy => (StatusCode::OK, "ok"),
        SamplerHealth::Starting => (StatusCode::OK, "starting"),
        SamplerHealth::Degraded { .. } => (StatusCode::OK, "degraded"),
        SamplerHealth::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
    };
    let latest_sequence = state.presenter.latest().ok().map(|s| s.sequence());

    (
        status,
        Json(json!({
            "status": label,
            "service": "sysdash",
            "version": env!("CARGO_PKG_VERSION"),
            "build": BuildInfo::current(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "sampler": health,
            "latest_sequence": latest_sequence,
            "websocket_clients": state.clients.count().await,
        })),
    )
}

/// Serve the dashboard page from the configured static directory.
pub async fn serve_index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let Some(index) = state.config.dashboard_index() else {
        return Ok(Html(DEFAULT_INDEX_HTML.to_string()));
    };
    match tokio::fs::read_to_string(&index).await {
        Ok(content) => Ok(Html(content)),
        Err(e) => {
            error!("Failed to read {:?}: {}", index, e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

/// Serve the built-in dashboard page.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

/// Built-in dashboard used when no static directory is configured.
const DEFAULT_INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>System Information Dashboard</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Ubuntu, sans-serif;
            background: #f4f6fa;
            color: #333;
            padding: 24px;
        }

        .container { max-width: 1200px; margin: 0 auto; }

        .header {
            display: flex;
            justify-content: space-between;
            align-items: center;
            margin-bottom: 24px;
        }

        .header h1 { font-size: 2rem; }

        button {
            border: none;
            border-radius: 8px;
            padding: 8px 16px;
            background: #4c6ef5;
            color: white;
            font-weight: 600;
            cursor: pointer;
        }

        button:disabled { opacity: 0.6; cursor: wait; }

        .dashboard {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
            gap: 20px;
            margin-bottom: 24px;
        }

        .card {
            background: white;
            border-radius: 12px;
            padding: 20px;
            box-shadow: 0 4px 16px rgba(0,0,0,0.06);
        }

        .card h3 { color: #4c6ef5; margin-bottom: 12px; }

        .metric {
            display: flex;
            justify-content: space-between;
            padding: 8px 0;
            border-bottom: 1px solid #eee;
        }

        .metric:last-child { border-bottom: none; }
        .metric-label { font-weight: 600; color: #666; }
        .metric-value { font-weight: bold; }
        .unavailable { color: #e03131; font-weight: normal; font-style: italic; }
        .clock { font-size: 2.4rem; font-weight: bold; margin: 8px 0; }

        .status {
            padding: 12px 16px;
            border-radius: 8px;
            background: #e7f5ff;
        }

        .status.degraded, .status.error { background: #fff0f0; color: #c92a2a; }
        svg { width: 100%; height: 120px; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>System Information Dashboard</h1>
            <button id="refresh">Refresh All Data</button>
        </div>

        <div class="dashboard">
            <div class="card">
                <h3>Time &amp; Date</h3>
                <div class="clock" id="clock">--:--:--</div>
                <div id="date"></div>
                <div class="metric">
                    <span class="metric-label">Captured</span>
                    <span class="metric-value" id="captured">-</span>
                </div>
                <button id="live-clock">Start Live Clock</button>
            </div>

            <div class="card">
                <h3>System Information</h3>
                <div id="host"></div>
            </div>

            <div class="card">
                <h3>System Resources</h3>
                <div id="resources"></div>
            </div>

            <div class="card">
                <h3>Network Information</h3>
                <div id="network"></div>
            </div>

            <div class="card">
                <h3>About</h3>
                <div id="about"></div>
            </div>

            <div class="card">
                <h3>CPU Usage Trend</h3>
                <svg viewBox="0 0 100 100" preserveAspectRatio="none">
                    <polyline id="trend" fill="none" stroke="#4c6ef5" stroke-width="2" points=""></polyline>
                </svg>
                <div class="metric">
                    <span class="metric-label">Samples</span>
                    <span class="metric-value" id="trend-count">0</span>
                </div>
            </div>
        </div>

        <div class="status" id="status">Waiting for first sample...</div>
    </div>

    <script>
        let liveClock = null;

        function escapeHtml(value) {
            return String(value)
                .replace(/&/g, '&amp;')
                .replace(/</g, '&lt;')
                .replace(/>/g, '&gt;')
                .replace(/"/g, '&quot;')
                .replace(/'/g, '&#39;');
        }

        // Values are escaped unless they come pre-rendered from unavailable().
        function row(label, value) {
            const rendered = value && value.html !== undefined ? value.html : escapeHtml(value);
            return `<div class="metric"><span class="metric-label">${escapeHtml(label)}</span>` +
                   `<span class="metric-value">${rendered}</span></div>`;
        }

        function unavailable(slot) {
            const message = slot && slot.error ? slot.error.message : 'not sampled';
            return { html: `<span class="unavailable" title="${escapeHtml(message)}">unavailable</span>` };
        }

        function reading(snapshot, kind) {
            const slot = snapshot.slots[kind];
            return slot && slot.reading ? slot.reading.value : null;
        }

        function gb(bytes) {
            return (bytes / Math.pow(1024, 3)).toFixed(2) + ' GB';
        }

        function render(snapshot) {
            const host = reading(snapshot, 'host');
            document.getElementById('host').innerHTML = host
                ? row('System', host.os) + row('Version', host.version) +
                  row('Release', host.release) + row('Architecture', host.arch) +
                  row('Processor', host.processor) + row('Hostname', host.hostname)
                : row('Host', unavailable(snapshot.slots.host));

            const cpu = reading(snapshot, 'cpu');
            const memory = reading(snapshot, 'memory');
            const disk = reading(snapshot, 'disk');
            document.getElementById('resources').innerHTML =
                row('CPU Usage', cpu !== null ? cpu.toFixed(1) + '%' : unavailable(snapshot.slots.cpu)) +
                row('Memory Usage', memory
                    ? `${memory.percent.toFixed(1)}% (${gb(memory.used_bytes)} / ${gb(memory.total_bytes)})`
                    : unavailable(snapshot.slots.memory)) +
                row('Disk Usage', disk
                    ? `${disk.percent.toFixed(1)}% of ${disk.path} (${gb(disk.used_bytes)} / ${gb(disk.total_bytes)})`
                    : unavailable(snapshot.slots.disk));

            const network = reading(snapshot, 'network');
            document.getElementById('network').innerHTML = network
                ? row('Network Interfaces', network.interface_count) +
                  row('Active Connections', network.active_connections)
                : row('Network', unavailable(snapshot.slots.network));

            document.getElementById('captured').textContent =
                new Date(snapshot.timestamp).toLocaleTimeString();
            if (!liveClock) {
                showTime(new Date(snapshot.timestamp));
            }
            loadHistory();
        }

        function showTime(now) {
            document.getElementById('clock').textContent = now.toLocaleTimeString();
            document.getElementById('date').textContent = now.toLocaleDateString(undefined, {
                weekday: 'long', year: 'numeric', month: 'long', day: 'numeric'
            });
        }

        function loadHistory() {
            fetch('/api/history')
                .then(response => response.json())
                .then(history => {
                    const values = history.cpu_percent;
                    const step = values.length > 1 ? 100 / (values.length - 1) : 0;
                    document.getElementById('trend').setAttribute('points',
                        values.map((v, i) => `${(i * step).toFixed(2)},${(100 - v).toFixed(2)}`).join(' '));
                    document.getElementById('trend-count').textContent =
                        `${values.length} / ${history.capacity}`;
                })
                .catch(error => console.error('Failed to fetch history:', error));
        }

        function loadHealth() {
            fetch('/api/health')
                .then(response => response.json())
                .then(health => {
                    const status = document.getElementById('status');
                    status.className = 'status ' + health.status;
                    const build = health.build;
                    document.getElementById('about').innerHTML =
                        row('Service', `${health.service} ${health.version}`) +
                        row('Built For', `${build.os}/${build.arch}`) +
                        row('Profile', build.profile) +
                        row('WebSocket Clients', health.websocket_clients);
                    status.textContent = health.status === 'degraded'
                        ? `Sampler degraded: no metric readable for ${health.sampler.failed_ticks} ticks`
                        : `Sampler ${health.status}`;
                })
                .catch(() => {
                    document.getElementById('status').className = 'status error';
                });
        }

        function connectWebSocket() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            const ws = new WebSocket(`${protocol}//${window.location.host}/ws`);
            ws.onmessage = event => {
                try {
                    render(JSON.parse(event.data));
                } catch (e) {
                    console.error('Failed to parse snapshot:', e);
                }
            };
            ws.onclose = () => setTimeout(connectWebSocket, 2000);
        }

        document.getElementById('refresh').onclick = event => {
            const button = event.target;
            button.disabled = true;
            fetch('/api/refresh', { method: 'POST' })
                .then(response => response.json())
                .then(snapshot => { if (snapshot.slots) render(snapshot); })
                .finally(() => { button.disabled = false; });
        };

        document.getElementById('live-clock').onclick = event => {
            if (liveClock) {
                clearInterval(liveClock);
                liveClock = null;
                event.target.textContent = 'Start Live Clock';
            } else {
                showTime(new Date());
                liveClock = setInterval(() => showTime(new Date()), 1000);
                event.target.textContent = 'Stop Live Clock';
            }
        };

        fetch('/api/snapshot')
            .then(response => response.ok ? response.json() : null)
            .then(snapshot => { if (snapshot) render(snapshot); })
            .catch(error => console.error('Failed to fetch initial data:', error));

        connectWebSocket();
        loadHealth();
        setInterval(loadHealth, 5000);
    </script>
</body>
</html>"##;
