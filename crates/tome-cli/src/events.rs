use serde::Serialize;
use std::io::Write;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub id: String,
    pub role: String,
    pub secret: String,
}

impl EventStarted {
    pub fn new(id: &str, role: &str, secret: &str) -> Self {
        Self {
            event: "started",
            id: id.to_string(),
            role: role.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct EventAdmitted {
    pub event: &'static str,
    pub spokes: usize,
    pub elapsed_s: f64,
}

// ── Ping events ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventPing {
    pub event: &'static str,
    pub from: String,
    pub to: String,
    pub seq: u32,
    pub rtt_ms: f64,
}

#[derive(Serialize)]
pub struct EventPingSummary {
    pub event: &'static str,
    pub to: String,
    pub count: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl EventPingSummary {
    /// `None` when there are no samples.
    pub fn from_rtts(to: &str, rtts: &[f64]) -> Option<Self> {
        if rtts.is_empty() {
            return None;
        }
        let min_ms = rtts.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_ms = rtts.iter().sum::<f64>() / rtts.len() as f64;
        Some(Self {
            event: "ping_summary",
            to: to.to_string(),
            count: rtts.len(),
            min_ms,
            avg_ms,
            max_ms,
        })
    }
}

// ── Membership events ───────────────────────────────────────────

#[derive(Serialize)]
pub struct EventMembers {
    pub event: &'static str,
    pub id: String,
    pub role: String,
    pub hub: Option<String>,
    pub members: Vec<String>,
}

#[derive(Serialize)]
pub struct EventFinished {
    pub event: &'static str,
    pub sessions: usize,
    pub elapsed_s: f64,
}
