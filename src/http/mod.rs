//! HTTP fetching with retries, redirects and per-origin connection reuse.

mod fetcher;
mod pool;
mod retry;

pub use fetcher::{FetchOptions, FetchResponse, Fetcher};
pub use pool::{ConnectionPool, Origin};
pub use retry::{MAX_REDIRECTS, MAX_ATTEMPTS, RETRY_DELAY_MS, StatusAction, TransportFailure};
