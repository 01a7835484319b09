//! Bounded HTTP client: connection reuse via a single Agent, capped
//! concurrency, bounded retries with backoff.

use std::io::Read;
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::Duration;

const REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONCURRENCY: usize = 16;
const MAX_CONCURRENCY_CAP: usize = 64;
const DEFAULT_RETRY_COUNT: usize = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

fn concurrency_from_env() -> usize {
    std::env::var("LIMAN_NETWORK_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_CONCURRENCY_CAP))
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| (n.get() * 2).clamp(4, MAX_CONCURRENCY_CAP))
                .unwrap_or(DEFAULT_CONCURRENCY)
        })
}

fn retry_count_from_env() -> usize {
    std::env::var("LIMAN_HTTP_RETRIES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RETRY_COUNT)
}

fn retry_backoff_ms_from_env() -> u64 {
    std::env::var("LIMAN_HTTP_RETRY_BACKOFF_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_BACKOFF_MS)
}

/// Semaphore-style limit: wait until a slot is free, then hold until the
/// guard is dropped.
struct ConcurrencyLimit {
    mutex: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl ConcurrencyLimit {
    fn new(max: usize) -> Self {
        Self { mutex: Mutex::new(0), condvar: Condvar::new(), max }
    }

    fn acquire(&self) -> ConcurrencyGuard<'_> {
        let mut guard = self.mutex.lock().unwrap();
        while *guard >= self.max {
            guard = self.condvar.wait(guard).unwrap();
        }
        *guard += 1;
        ConcurrencyGuard(self)
    }
}

struct ConcurrencyGuard<'a>(&'a ConcurrencyLimit);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.0.mutex.lock().unwrap();
        *guard = guard.saturating_sub(1);
        self.0.condvar.notify_one();
    }
}

struct HttpClient {
    agent: ureq::Agent,
    limit: ConcurrencyLimit,
}

impl HttpClient {
    fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build();
        Self { agent, limit: ConcurrencyLimit::new(concurrency_from_env()) }
    }

    /// GET with retries on transport errors and 5xx. 4xx is final immediately.
    fn get_with_retry(&self, url: &str) -> Result<ureq::Response, String> {
        let _slot = self.limit.acquire();
        let retries = retry_count_from_env();
        let backoff = retry_backoff_ms_from_env();
        let mut attempt = 0usize;
        loop {
            match self.agent.get(url).call() {
                Ok(resp) => return Ok(resp),
                Err(ureq::Error::Status(code, _)) if code >= 500 && attempt < retries => {}
                Err(ureq::Error::Status(code, _)) => {
                    return Err(format!("HTTP {} for {}", code, url));
                }
                Err(_) if attempt < retries => {}
                Err(e) => return Err(format!("request failed for {}: {}", url, e)),
            }
            attempt += 1;
            std::thread::sleep(Duration::from_millis(backoff * attempt as u64));
        }
    }
}

fn client() -> &'static HttpClient {
    static CLIENT: OnceLock<HttpClient> = OnceLock::new();
    CLIENT.get_or_init(HttpClient::new)
}

/// Drain a response body, failing when it exceeds the cap. Truncating would
/// hand corrupt bytes to the caller (and the cache would persist them), so an
/// oversize body is an error, never a partial read.
fn read_capped<R: Read>(reader: R, cap: u64) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    reader
        .take(cap + 1)
        .read_to_end(&mut buf)
        .map_err(|e| e.to_string())?;
    if buf.len() as u64 > cap {
        return Err(format!("response body exceeds the {} byte limit", cap));
    }
    Ok(buf)
}

/// Fetch a URL into memory (capped body size).
pub fn get_bytes(url: &str) -> Result<Vec<u8>, String> {
    let resp = client().get_with_retry(url)?;
    read_capped(resp.into_reader(), MAX_BODY_BYTES).map_err(|e| format!("{} for {}", e, url))
}
