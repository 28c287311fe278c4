//! Stage reporting side channel
//!
//! Diagnostic reporting (figures, HTML summaries) is injected into the
//! stage functions as a [`StageReporter`] collaborator so the numerical
//! core carries no rendering dependency. The default [`NullReporter`]
//! discards everything; stages call [`StageReporter::record_stage`] at
//! the first processed index only, or at every index when the reporter
//! asks for that via [`StageReporter::report_all`].

/// Collaborator notified once per reported stage index.
pub trait StageReporter {
    /// Record one processed index of a stage. `details` is a short
    /// free-text parameter summary.
    fn record_stage(&mut self, method: &str, index: &[usize], details: &str);

    /// Report every index instead of the first one only.
    fn report_all(&self) -> bool {
        false
    }
}

/// Default reporter: discards all stage records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl StageReporter for NullReporter {
    fn record_stage(&mut self, _method: &str, _index: &[usize], _details: &str) {}
}

/// Test/debug reporter collecting every record it receives.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub records: Vec<(String, Vec<usize>, String)>,
    pub all_indices: bool,
}

impl StageReporter for CollectingReporter {
    fn record_stage(&mut self, method: &str, index: &[usize], details: &str) {
        self.records
            .push((method.to_string(), index.to_vec(), details.to_string()));
    }

    fn report_all(&self) -> bool {
        self.all_indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reporter_discards() {
        let mut reporter = NullReporter;
        reporter.record_stage("Phasing", &[0, 0, 0], "p0=90.");
        assert!(!reporter.report_all());
    }

    #[test]
    fn test_collecting_reporter() {
        let mut reporter = CollectingReporter {
            all_indices: true,
            ..Default::default()
        };
        reporter.record_stage("Apodization", &[0, 0, 0, 1], "amount=10.");
        assert!(reporter.report_all());
        assert_eq!(reporter.records.len(), 1);
        assert_eq!(reporter.records[0].0, "Apodization");
    }
}
