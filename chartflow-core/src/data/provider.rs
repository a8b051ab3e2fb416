//! Chart API abstraction.
//!
//! The fetcher only needs "give me the raw body for this symbol and range", so
//! the HTTP client sits behind a trait and tests substitute canned responses.

use crate::error::Result;
use crate::range::ChartRange;

/// Raw response from the chart API, kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A source of raw chart data.
pub trait ChartApi: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Request daily chart data for `symbol` over `range`.
    ///
    /// A non-success HTTP status is still `Ok`: the caller decides what to do
    /// with an error payload. `Err` means no response was received at all.
    fn chart(&self, symbol: &str, range: ChartRange) -> Result<ApiResponse>;
}
