//! Outcome counting and the final threshold verdict
//!
//! Each probe category records one outcome per request in a Prometheus
//! counter vector partitioned by result and HTTP status. Once the category's
//! loop has stopped, the counters are folded into a [`Tally`] and judged
//! against the configured success [`Threshold`].

use prometheus::core::Collector;
use prometheus::IntCounterVec;
use thiserror::Error;
use tracing::{error, info};

/// Result label value for successful requests
pub const LABEL_SUCCESS: &str = "success";
/// Result label value for failed requests
pub const LABEL_ERROR: &str = "error";
/// `http_code` label value when no response was received
pub const NO_RESPONSE_CODE: &str = "0";

/// Why a category failed its verdict
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerdictError {
    #[error("failed with less than {required} success ratio - actual {actual}")]
    BelowThreshold { required: String, actual: String },

    #[error("no requests completed")]
    NoRequests,
}

/// Success and failure counts for one probe category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub success: f64,
    pub errors: f64,
}

impl Tally {
    pub fn new(success: f64, errors: f64) -> Self {
        Self { success, errors }
    }

    pub fn total(&self) -> f64 {
        self.success + self.errors
    }

    /// `success / total`, or `None` when nothing was recorded
    pub fn ratio(&self) -> Option<f64> {
        let total = self.total();
        (total > 0.0).then(|| self.success / total)
    }
}

/// Minimum accepted success ratio, within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("threshold must be within [0, 1], got {value}"));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(0.9)
    }
}

/// Judge a tally against a threshold
///
/// A tally with no requests fails, unless the threshold is zero in which case
/// it passes vacuously.
pub fn evaluate(tally: Tally, threshold: Threshold) -> Result<(), VerdictError> {
    let ratio = match tally.ratio() {
        Some(ratio) => ratio,
        None if threshold.value() == 0.0 => return Ok(()),
        None => return Err(VerdictError::NoRequests),
    };

    if ratio < threshold.value() {
        return Err(VerdictError::BelowThreshold {
            required: format_percent(threshold.value()),
            actual: format_percent(ratio),
        });
    }
    Ok(())
}

/// Log the counts and the verdict for a category
pub fn report(component: &str, tally: Tally, threshold: Threshold) -> Result<(), VerdictError> {
    info!(
        component,
        success = tally.success,
        errors = tally.errors,
        "number of requests"
    );
    let verdict = evaluate(tally, threshold);
    if let Err(err) = &verdict {
        error!(component, err = %err, "ratio is below threshold");
    }
    verdict
}

/// Render a ratio as a percentage with at most two decimals
pub fn format_percent(ratio: f64) -> String {
    let formatted = format!("{:.2}", ratio * 100.0);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}%")
}

/// Anything that can be folded into a tally once its producer has stopped
pub trait TallySource: Send + Sync {
    fn tally(&self) -> Tally;
}

/// Outcome counters labelled by `result` and `http_code`
#[derive(Clone)]
pub struct OutcomeCounter {
    inner: IntCounterVec,
}

impl OutcomeCounter {
    pub fn new(inner: IntCounterVec) -> Self {
        Self { inner }
    }

    pub fn success(&self, status: Option<u16>) {
        self.record(LABEL_SUCCESS, status);
    }

    pub fn failure(&self, status: Option<u16>) {
        self.record(LABEL_ERROR, status);
    }

    fn record(&self, result: &str, status: Option<u16>) {
        let code = status_label(status);
        self.inner.with_label_values(&[result, code.as_str()]).inc();
    }
}

impl TallySource for OutcomeCounter {
    fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for family in self.inner.collect() {
            for metric in family.get_metric() {
                let value = metric.get_counter().get_value();
                let result = metric
                    .get_label()
                    .iter()
                    .find(|l| l.get_name() == "result")
                    .map(|l| l.get_value());
                match result {
                    Some(LABEL_SUCCESS) => tally.success += value,
                    Some(LABEL_ERROR) => tally.errors += value,
                    _ => {}
                }
            }
        }
        tally
    }
}

/// Custom-query counters: every execution counts, errors are a subset
#[derive(Clone)]
pub struct QueryCounter {
    executed: IntCounterVec,
    errors: IntCounterVec,
}

impl QueryCounter {
    pub fn new(executed: IntCounterVec, errors: IntCounterVec) -> Self {
        Self { executed, errors }
    }

    pub fn record(&self, kind: &str, query: &str, status: Option<u16>, failed: bool) {
        let code = status_label(status);
        let labels = [kind, query, code.as_str()];
        self.executed.with_label_values(&labels).inc();
        if failed {
            self.errors.with_label_values(&labels).inc();
        }
    }
}

impl TallySource for QueryCounter {
    fn tally(&self) -> Tally {
        let executed = sum_counters(&self.executed);
        let errors = sum_counters(&self.errors);
        Tally::new((executed - errors).max(0.0), errors)
    }
}

fn sum_counters(vec: &IntCounterVec) -> f64 {
    // Integer sum: a float sum over no series is -0.0
    vec.collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum::<u64>() as f64
}

/// Label value for an optional HTTP status
pub fn status_label(status: Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| NO_RESPONSE_CODE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Opts;

    fn outcome_counter() -> OutcomeCounter {
        OutcomeCounter::new(
            IntCounterVec::new(Opts::new("test_total", "test"), &["result", "http_code"]).unwrap(),
        )
    }

    #[test]
    fn test_ratio_at_threshold_passes() {
        let threshold = Threshold::new(0.9).unwrap();
        assert!(evaluate(Tally::new(9.0, 1.0), threshold).is_ok());
    }

    #[test]
    fn test_ratio_below_threshold_fails() {
        let threshold = Threshold::new(0.91).unwrap();
        let err = evaluate(Tally::new(9.0, 1.0), threshold).unwrap_err();
        assert_eq!(
            err,
            VerdictError::BelowThreshold {
                required: "91%".to_string(),
                actual: "90%".to_string(),
            }
        );
        assert!(err.to_string().contains("actual 90%"));
    }

    #[test]
    fn test_no_requests() {
        assert_eq!(
            evaluate(Tally::default(), Threshold::default()),
            Err(VerdictError::NoRequests)
        );
        assert!(evaluate(Tally::default(), Threshold::new(0.0).unwrap()).is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert!(Threshold::new(1.0).is_ok());
        assert!(Threshold::new(0.0).is_ok());
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.9), "90%");
        assert_eq!(format_percent(1.0 / 3.0), "33.33%");
        assert_eq!(format_percent(0.125), "12.5%");
        assert_eq!(format_percent(0.0), "0%");
        assert_eq!(format_percent(1.0), "100%");
    }

    #[test]
    fn test_outcome_counter_sums_status_codes() {
        let counter = outcome_counter();
        counter.success(Some(200));
        counter.success(Some(200));
        counter.success(Some(204));
        counter.failure(Some(500));
        counter.failure(None);

        let tally = counter.tally();
        assert_eq!(tally, Tally::new(3.0, 2.0));
    }

    #[test]
    fn test_query_counter_tally() {
        let executed =
            IntCounterVec::new(Opts::new("exec_total", "x"), &["type", "query", "http_code"])
                .unwrap();
        let errors =
            IntCounterVec::new(Opts::new("err_total", "x"), &["type", "query", "http_code"])
                .unwrap();
        let counter = QueryCounter::new(executed.clone(), errors);

        counter.record("query", "a", Some(200), false);
        counter.record("query", "a", Some(200), false);
        counter.record("series", "b", None, true);

        assert_eq!(counter.tally(), Tally::new(2.0, 1.0));
        assert_eq!(
            executed.with_label_values(&["series", "b", "0"]).get(),
            1
        );
    }

    #[test]
    fn test_clean_query_counter_has_positive_zero_errors() {
        let labels = &["type", "query", "http_code"];
        let counter = QueryCounter::new(
            IntCounterVec::new(Opts::new("clean_exec_total", "x"), labels).unwrap(),
            IntCounterVec::new(Opts::new("clean_err_total", "x"), labels).unwrap(),
        );
        counter.record("query", "a", Some(200), false);

        let tally = counter.tally();
        assert!(tally.errors.is_sign_positive());
        assert_eq!(format!("{}", tally.errors), "0");
        assert_eq!(tally.success, 1.0);
    }
}
