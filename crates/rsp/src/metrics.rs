//! Protocol and target metrics, with an in-process recorder for the CLI.
//!
//! The engine and the machine record through the `metrics` facade; when
//! `--metrics` is given, [`CliRecorder`] collects everything in memory and
//! [`MetricsSummary::print_summary`] prints it when the server exits.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit, describe_counter, describe_histogram,
};
use parking_lot::RwLock;

/// Register descriptions for every metric the server records.
pub fn init() {
    describe_counter!(
        "rsp_bytes_received_total",
        Unit::Bytes,
        "Bytes received from the debugger"
    );
    describe_counter!(
        "rsp_packets_received_total",
        Unit::Count,
        "Command packets accepted with a valid checksum"
    );
    describe_counter!(
        "rsp_naks_sent_total",
        Unit::Count,
        "Packets rejected for a bad checksum"
    );
    describe_counter!(
        "rsp_replies_sent_total",
        Unit::Count,
        "Reply packets sent"
    );
    describe_counter!(
        "rsp_retransmits_total",
        Unit::Count,
        "Replies resent after a NAK"
    );
    describe_counter!(
        "rsp_interrupts_total",
        Unit::Count,
        "Running target interrupted by the debugger"
    );
    describe_counter!("rsp_sessions_total", Unit::Count, "Debugger connections");
    describe_counter!(
        "rsp_target_instructions_total",
        Unit::Count,
        "Instructions retired by the simulated target"
    );
    describe_histogram!(
        "rsp_reply_bytes",
        Unit::Bytes,
        "Reply payload size distribution"
    );
}

#[derive(Default)]
struct Store {
    counters: RwLock<HashMap<String, u64>>,
    histograms: RwLock<HashMap<String, Vec<f64>>>,
}

/// One registered metric; the same handle serves counters and histograms.
struct Slot {
    key: String,
    store: Arc<Store>,
}

impl CounterFn for Slot {
    fn increment(&self, value: u64) {
        *self.store.counters.write().entry(self.key.clone()).or_default() += value;
    }

    fn absolute(&self, value: u64) {
        self.store.counters.write().insert(self.key.clone(), value);
    }
}

impl HistogramFn for Slot {
    fn record(&self, value: f64) {
        self.store
            .histograms
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

/// `name` or `name{k=v,...}`.
fn render_key(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

/// In-memory recorder for terminal output.
#[derive(Default)]
pub struct CliRecorder {
    store: Arc<Store>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    #[must_use]
    pub fn install(self) -> Option<MetricsSummary> {
        let store = Arc::clone(&self.store);
        metrics::set_global_recorder(self).ok()?;
        Some(MetricsSummary { store })
    }

    fn slot(&self, key: &Key) -> Arc<Slot> {
        Arc::new(Slot {
            key: render_key(key),
            store: Arc::clone(&self.store),
        })
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.slot(key))
    }

    // Nothing in the server records gauges.
    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.slot(key))
    }
}

/// Read side of an installed [`CliRecorder`].
pub struct MetricsSummary {
    store: Arc<Store>,
}

impl MetricsSummary {
    pub fn print_summary(&self) {
        let counters = self.store.counters.read();
        let histograms = self.store.histograms.read();

        if counters.is_empty() && histograms.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");

        if !counters.is_empty() {
            println!();
            println!("### Counters");
            for (key, value) in sorted(&counters) {
                println!("  {key}: {value}");
            }
        }

        if !histograms.is_empty() {
            println!();
            println!("### Histograms");
            for (key, values) in sorted(&histograms) {
                if let Some(stats) = Stats::of(values) {
                    println!(
                        "  {key}: count={}, min={:.0}, p50={:.0}, max={:.0}, avg={:.1}",
                        stats.count, stats.min, stats.p50, stats.max, stats.avg
                    );
                }
            }
        }
        println!();
    }
}

fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

struct Stats {
    count: usize,
    min: f64,
    p50: f64,
    max: f64,
    avg: f64,
}

impl Stats {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut ordered = values.to_vec();
        ordered.sort_by(f64::total_cmp);
        #[allow(clippy::cast_precision_loss)]
        let avg = ordered.iter().sum::<f64>() / ordered.len() as f64;
        Some(Self {
            count: ordered.len(),
            min: ordered[0],
            p50: ordered[ordered.len() / 2],
            max: ordered[ordered.len() - 1],
            avg,
        })
    }
}
