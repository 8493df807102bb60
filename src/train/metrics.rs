//! Metric reporting seam.

use crate::loss::LossBreakdown;

/// Receives the per-iteration loss breakdown. Transport beyond this
/// trait is the caller's concern.
pub trait MetricsSink {
    fn report(&mut self, iteration: u64, lr: f32, breakdown: &LossBreakdown);
}

/// Prints one progress line per report.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl MetricsSink for ConsoleSink {
    fn report(&mut self, iteration: u64, lr: f32, breakdown: &LossBreakdown) {
        println!(
            "iter {:>7} | lr {:.3e} | total {:.4} | content {:.4} | patch {:.4} | dir {:.4} | tv {:.4}",
            iteration + 1,
            lr,
            breakdown.total,
            breakdown.content,
            breakdown.patch,
            breakdown.global,
            breakdown.variation,
        );
    }
}

/// Records every report; used by tests to assert on the loop's cadence.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub reports: Vec<(u64, f32, LossBreakdown)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for MemorySink {
    fn report(&mut self, iteration: u64, lr: f32, breakdown: &LossBreakdown) {
        self.reports.push((iteration, lr, *breakdown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let breakdown = LossBreakdown {
            content: 1.0,
            patch: 2.0,
            global: 3.0,
            variation: 4.0,
            total: 10.0,
        };
        let mut sink = MemorySink::new();
        sink.report(0, 5e-5, &breakdown);
        sink.report(49, 5.1e-5, &breakdown);
        assert_eq!(sink.reports.len(), 2);
        assert_eq!(sink.reports[0].0, 0);
        assert_eq!(sink.reports[1].0, 49);
        assert_eq!(sink.reports[1].2.total, 10.0);
    }
}
