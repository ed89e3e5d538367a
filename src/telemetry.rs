/// Progress events emitted by the loader as a run advances
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// The destination table was (re)created
    TableCreated { columns: usize },
    /// A batch was appended and committed
    BatchLoaded {
        batch_number: usize,
        records_loaded: u64,
        duration_ms: u64,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub table_columns: usize,
    pub batches_loaded: usize,
    /// Number of the most recently committed batch
    pub last_batch: usize,
    pub records_loaded: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::TableCreated { columns } => {
                self.table_columns = *columns;
            }
            TelemetryEvent::BatchLoaded {
                batch_number,
                records_loaded,
                duration_ms,
            } => {
                self.last_batch = *batch_number;
                self.batches_loaded += 1;
                self.records_loaded += records_loaded;
                self.batch_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
