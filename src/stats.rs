//! HTTP statistics collectors fed by the mux on request completion.

use std::collections::HashMap;
use std::time::Duration;

use hyper::StatusCode;
use parking_lot::Mutex;

/// One finished request, as reported to the collectors.
#[derive(Debug, Clone)]
pub struct StatRecord {
    pub host: String,
    pub method: String,
    pub path: String,
    pub status: StatusCode,
    pub duration: Duration,
}

/// Aggregate counters over all requests.
#[derive(Default)]
pub struct HttpStat {
    inner: Mutex<Counters>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    requests: u64,
    // Indexed by status class: [1xx, 2xx, 3xx, 4xx, 5xx].
    status_classes: [u64; 5],
    total_duration: Duration,
    max_duration: Duration,
}

/// Point-in-time view of the collected counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSnapshot {
    pub requests: u64,
    pub status_classes: [u64; 5],
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl HttpStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stat(&self, record: &StatRecord) {
        let mut counters = self.inner.lock();

        counters.requests += 1;
        let class = (record.status.as_u16() / 100) as usize;
        if (1..=5).contains(&class) {
            counters.status_classes[class - 1] += 1;
        }
        counters.total_duration += record.duration;
        if record.duration > counters.max_duration {
            counters.max_duration = record.duration;
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        let counters = self.inner.lock();
        StatSnapshot {
            requests: counters.requests,
            status_classes: counters.status_classes,
            total_duration: counters.total_duration,
            max_duration: counters.max_duration,
        }
    }
}

/// Per-path hit counter reporting the N most requested paths.
pub struct TopN {
    n: usize,
    hits: Mutex<HashMap<String, u64>>,
}

impl TopN {
    pub fn new(n: usize) -> Self {
        TopN {
            n,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn stat(&self, record: &StatRecord) {
        let key = format!("{} {}", record.method, record.path);
        *self.hits.lock().entry(key).or_insert(0) += 1;
    }

    /// The top entries sorted by hit count, most requested first.
    pub fn top(&self) -> Vec<(String, u64)> {
        let hits = self.hits.lock();
        let mut entries: Vec<(String, u64)> =
            hits.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(self.n);
        entries
    }
}
