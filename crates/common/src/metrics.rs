use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_in: CounterVec,
    operator_rows_out: CounterVec,
    operator_batches: CounterVec,
    operator_time_seconds: HistogramVec,
    engine_selected: CounterVec,
    table_bytes_written: CounterVec,
    table_files_scanned: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_operator(&self, operator: &str, rows_in: u64, rows_out: u64, secs: f64) {
        let labels = [operator];
        self.inner
            .operator_rows_in
            .with_label_values(&labels)
            .inc_by(rows_in as f64);
        self.inner
            .operator_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .operator_batches
            .with_label_values(&labels)
            .inc();
        self.inner
            .operator_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn inc_engine_selected(&self, engine: &str) {
        self.inner
            .engine_selected
            .with_label_values(&[engine])
            .inc();
    }

    pub fn record_table_write(&self, table: &str, bytes: u64) {
        self.inner
            .table_bytes_written
            .with_label_values(&[table])
            .inc_by(bytes as f64);
    }

    pub fn record_files_scanned(&self, table: &str, files: u64) {
        self.inner
            .table_files_scanned
            .with_label_values(&[table])
            .inc_by(files as f64);
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let operator_rows_in = counter_vec(
            &registry,
            "traj_operator_rows_in_total",
            "Input rows processed per operator",
            &["operator"],
        );
        let operator_rows_out = counter_vec(
            &registry,
            "traj_operator_rows_out_total",
            "Output rows produced per operator",
            &["operator"],
        );
        let operator_batches = counter_vec(
            &registry,
            "traj_operator_batches_total",
            "Batch invocations per operator",
            &["operator"],
        );
        let operator_time_seconds = histogram_vec(
            &registry,
            "traj_operator_time_seconds",
            "Time spent in each operator invocation",
            &["operator"],
        );
        let engine_selected = counter_vec(
            &registry,
            "traj_engine_selected_total",
            "Units of work routed per engine kind",
            &["engine"],
        );
        let table_bytes_written = counter_vec(
            &registry,
            "traj_table_bytes_written_total",
            "Parquet bytes written per table",
            &["table"],
        );
        let table_files_scanned = counter_vec(
            &registry,
            "traj_table_files_scanned_total",
            "Parquet files scanned per table",
            &["table"],
        );

        Self {
            registry,
            operator_rows_in,
            operator_rows_out,
            operator_batches,
            operator_time_seconds,
            engine_selected,
            table_bytes_written,
            table_files_scanned,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
