//! Traits for host metric acquisition.

use crate::error::Result;
use crate::metrics::data::Sample;
use futures_util::stream::BoxStream;

/// Trait for producing host samples.
///
/// Implementations hide how raw readings are obtained. Whatever they fetch
/// concurrently must be joined into one [`Sample`] before it is returned.
pub trait MetricsProvider {
    /// Collect a single sample.
    fn collect_sample(&mut self) -> impl std::future::Future<Output = Result<Sample>> + Send;

    /// Start continuous collection.
    ///
    /// Returns a stream of samples collected at the specified interval.
    fn start_stream(
        &mut self,
        interval_ms: u64,
    ) -> impl std::future::Future<Output = Result<BoxStream<'static, Sample>>> + Send;
}
