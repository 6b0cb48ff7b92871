use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pagebridge_core::Result;
use pagebridge_tools::performance::{PerformanceParams, NAME};
use pagebridge_tools::Params;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::debug;

use super::Handler;
use crate::env::{subsystem, NavigationTiming, PageEnv, PerformanceEntry, PerformanceHost};

pub const DEFAULT_VITALS_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct PerformanceHandler {
    env: Arc<dyn PageEnv>,
    vitals_timeout: Duration,
}

fn round(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// `good` / `needs-improvement` / `poor` per the published web-vitals thresholds.
fn rate(value: f64, good: f64, poor: f64) -> &'static str {
    if value <= good {
        "good"
    } else if value <= poor {
        "needs-improvement"
    } else {
        "poor"
    }
}

fn metric(value: Option<f64>, good: f64, poor: f64) -> Value {
    match value {
        Some(v) => json!({"value": round(v), "rating": rate(v, good, poor)}),
        None => Value::Null,
    }
}

fn navigation_summary(nav: &NavigationTiming) -> Value {
    json!({
        "url": nav.name,
        "type": nav.kind,
        "dns": round(nav.domain_lookup_end - nav.domain_lookup_start),
        "tcp": round(nav.connect_end - nav.connect_start),
        "ttfb": round(nav.response_start - nav.request_start),
        "download": round(nav.response_end - nav.response_start),
        "domInteractive": round(nav.dom_interactive),
        "domContentLoaded": round(nav.dom_content_loaded_event_end),
        "loadComplete": round(nav.load_event_end),
        "transferSize": nav.transfer_size,
    })
}

fn resource_summary(mut resources: Vec<PerformanceEntry>, limit: Option<u32>) -> Value {
    let total = resources.len();
    let total_transfer: f64 = resources.iter().filter_map(|r| r.number("transferSize")).sum();
    resources.sort_by(|a, b| b.duration.total_cmp(&a.duration));
    if let Some(limit) = limit {
        resources.truncate(limit as usize);
    }
    let items: Vec<Value> = resources
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "initiatorType": r.detail.get("initiatorType").cloned().unwrap_or(Value::Null),
                "startTime": round(r.start_time),
                "duration": round(r.duration),
                "transferSize": r.number("transferSize").unwrap_or(0.0),
            })
        })
        .collect();
    json!({
        "count": total,
        "totalTransferSize": total_transfer,
        "slowest": items,
    })
}

/// Entries of `entry_type` observed before `deadline`. Stops early once
/// `done` accepts an entry or the host ends the stream.
async fn observe_until(
    host: &dyn PerformanceHost,
    entry_type: &str,
    deadline: Instant,
    done: impl Fn(&PerformanceEntry) -> bool,
) -> Vec<PerformanceEntry> {
    let mut rx = host.observe(entry_type);
    let mut seen = Vec::new();
    while let Ok(Some(entry)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        let stop = done(&entry);
        seen.push(entry);
        if stop {
            break;
        }
    }
    seen
}

/// Every vital is gathered concurrently against one deadline.
async fn collect_vitals(host: &dyn PerformanceHost, timeout: Duration) -> Value {
    let deadline = Instant::now() + timeout;

    let (lcp, paint, shifts, input) = futures::join!(
        observe_until(host, "largest-contentful-paint", deadline, |_| false),
        observe_until(host, "paint", deadline, |e| e.name == "first-contentful-paint"),
        observe_until(host, "layout-shift", deadline, |_| false),
        observe_until(host, "first-input", deadline, |_| true),
    );

    let lcp = lcp.last().map(|e| e.start_time);
    let fcp = paint
        .iter()
        .find(|e| e.name == "first-contentful-paint")
        .map(|e| e.start_time);
    let cls = if shifts.is_empty() {
        None
    } else {
        Some(
            shifts
                .iter()
                .filter(|e| !e.flag("hadRecentInput"))
                .filter_map(|e| e.number("value"))
                .sum::<f64>(),
        )
    };
    let fid = input
        .first()
        .and_then(|e| e.number("processingStart").map(|p| p - e.start_time));
    let ttfb = host.navigation().map(|n| n.response_start);

    json!({
        "lcp": metric(lcp, 2500.0, 4000.0),
        "fcp": metric(fcp, 1800.0, 3000.0),
        "cls": match cls {
            Some(v) => json!({"value": (v * 10000.0).round() / 10000.0, "rating": rate(v, 0.1, 0.25)}),
            None => Value::Null,
        },
        "fid": metric(fid, 100.0, 300.0),
        "ttfb": metric(ttfb, 800.0, 1800.0),
    })
}

impl PerformanceHandler {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self {
            env,
            vitals_timeout: DEFAULT_VITALS_TIMEOUT,
        }
    }

    /// Deadline used when a call does not pass `vitalsTimeoutMs`.
    pub fn with_vitals_timeout(mut self, timeout: Duration) -> Self {
        self.vitals_timeout = timeout;
        self
    }
}

#[async_trait]
impl Handler for PerformanceHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = PerformanceParams::parse(&params)?;
        let host = subsystem(self.env.performance(), "performance")?;

        let mut out = Map::new();
        out.insert("timestamp".to_string(), json!(Utc::now().timestamp_millis()));

        if params.include_navigation {
            let nav = host.navigation().map(|n| navigation_summary(&n));
            out.insert("navigation".to_string(), nav.unwrap_or(Value::Null));
        }
        if params.include_resources {
            let resources = host.entries_by_type("resource");
            out.insert(
                "resources".to_string(),
                resource_summary(resources, params.resource_limit),
            );
        }
        if params.include_vitals {
            let timeout = params
                .vitals_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.vitals_timeout);
            debug!(timeout_ms = timeout.as_millis() as u64, "Collecting web vitals");
            out.insert("vitals".to_string(), collect_vitals(host, timeout).await);
        }
        if params.include_entries {
            out.insert("entries".to_string(), serde_json::to_value(host.entries())?);
        }

        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPage, MemoryPerformance, Subsystem};

    fn seeded_page() -> MemoryPage {
        let page = MemoryPage::new().unwrap();
        let perf = page.memory_performance().unwrap();
        perf.set_navigation(NavigationTiming {
            name: "http://localhost:5173/".to_string(),
            kind: "navigate".to_string(),
            domain_lookup_start: 1.0,
            domain_lookup_end: 3.0,
            connect_start: 3.0,
            connect_end: 8.0,
            request_start: 10.0,
            response_start: 60.0,
            response_end: 90.0,
            dom_interactive: 300.0,
            dom_content_loaded_event_end: 350.0,
            load_event_end: 500.0,
            transfer_size: 4096,
            ..NavigationTiming::default()
        });
        seed_timeline(perf);
        page
    }

    fn seed_timeline(perf: &MemoryPerformance) {
        perf.record(PerformanceEntry::new("/main.js", "resource", 100.0, 40.0)
            .with("initiatorType", "script")
            .with("transferSize", 1000));
        perf.record(PerformanceEntry::new("/style.css", "resource", 90.0, 120.0)
            .with("initiatorType", "link")
            .with("transferSize", 500));
        perf.record(PerformanceEntry::new("first-contentful-paint", "paint", 400.0, 0.0));
        perf.record(PerformanceEntry::new("", "largest-contentful-paint", 900.0, 0.0));
        perf.record(PerformanceEntry::new("", "largest-contentful-paint", 2700.0, 0.0));
        perf.record(PerformanceEntry::new("", "layout-shift", 1000.0, 0.0).with("value", 0.05));
        perf.record(PerformanceEntry::new("", "layout-shift", 1100.0, 0.0)
            .with("value", 0.5)
            .with("hadRecentInput", true));
        perf.record(PerformanceEntry::new("", "layout-shift", 1200.0, 0.0).with("value", 0.02));
        perf.record(PerformanceEntry::new("click", "first-input", 1500.0, 8.0)
            .with("processingStart", 1540.0));
    }

    #[tokio::test]
    async fn test_full_snapshot_of_sealed_timeline() {
        let page = seeded_page();
        page.memory_performance().unwrap().seal();
        let h = PerformanceHandler::new(Arc::new(page));

        let out = h.execute(json!({"includeEntries": true})).await.unwrap();
        assert!(out["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(out["navigation"]["ttfb"], 50.0);
        assert_eq!(out["navigation"]["dns"], 2.0);
        assert_eq!(out["resources"]["count"], 2);
        assert_eq!(out["resources"]["totalTransferSize"], 1500.0);
        assert_eq!(out["resources"]["slowest"][0]["name"], "/style.css");

        let vitals = &out["vitals"];
        assert_eq!(vitals["lcp"]["value"], 2700.0);
        assert_eq!(vitals["lcp"]["rating"], "needs-improvement");
        assert_eq!(vitals["fcp"]["value"], 400.0);
        assert_eq!(vitals["fcp"]["rating"], "good");
        assert_eq!(vitals["cls"]["value"], 0.07);
        assert_eq!(vitals["fid"]["value"], 40.0);
        assert_eq!(vitals["ttfb"]["value"], 60.0);
        assert_eq!(out["entries"].as_array().unwrap().len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vitals_share_one_deadline() {
        // Nothing is sealed, so the open-ended observers run to the deadline.
        let page = seeded_page();
        let h = PerformanceHandler::new(Arc::new(page));

        let start = Instant::now();
        let out = h
            .execute(json!({"includeNavigation": false, "includeResources": false, "vitalsTimeoutMs": 500}))
            .await
            .unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500));
        assert!(waited < Duration::from_millis(1000));
        assert_eq!(out["vitals"]["lcp"]["value"], 2700.0);
        assert!(out.get("navigation").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_vitals_are_null() {
        let page = MemoryPage::new().unwrap();
        let h = PerformanceHandler::new(Arc::new(page)).with_vitals_timeout(Duration::from_millis(100));
        let out = h.execute(json!({})).await.unwrap();
        assert_eq!(out["navigation"], Value::Null);
        assert_eq!(out["vitals"]["lcp"], Value::Null);
        assert_eq!(out["vitals"]["cls"], Value::Null);
        assert_eq!(out["resources"]["count"], 0);
    }

    #[tokio::test]
    async fn test_resource_limit_and_flags() {
        let page = seeded_page();
        let h = PerformanceHandler::new(Arc::new(page));
        let out = h
            .execute(json!({"includeVitals": false, "resourceLimit": 1}))
            .await
            .unwrap();
        assert_eq!(out["resources"]["count"], 2);
        assert_eq!(out["resources"]["slowest"].as_array().unwrap().len(), 1);
        assert!(out.get("vitals").is_none());
        assert!(out.get("entries").is_none());
    }

    #[tokio::test]
    async fn test_no_performance_api() {
        let page = MemoryPage::builder().without(Subsystem::Performance).build().unwrap();
        let h = PerformanceHandler::new(Arc::new(page));
        let err = h.execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "performance is not available in this environment");
    }
}
