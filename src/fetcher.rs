//! fetcher.rs - Rate-limited paged fetcher for the price API
//!
//! Pages are requested strictly one after another. Every call waits until at
//! least `min_delay` has passed since the previous call completed, and is
//! bounded by its own timeout. The first error ends the whole fetch; the pages
//! collected up to that point are still returned.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use crate::error::{PricerError, PricerResult};
use crate::models::{PricedItem, ScoutPage};

pub const REQUEST_DELAY: Duration = Duration::from_millis(750);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const PER_PAGE: u32 = 250;
pub const MAX_PAGES: u32 = 500;

/// Raw page transport; the HTTP client in production, scripted in tests
#[async_trait]
pub trait PageTransport: Send + Sync {
    /// Fetch the body of one page of `category` for `league`
    async fn get_page(&self, league: &str, category: &str, page: u32) -> PricerResult<String>;
}

// ============================================================================
// HttpTransport - reqwest-backed transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> PricerResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("essence-pricer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PricerError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn build_url(&self, league: &str, category: &str, page: u32) -> PricerResult<Url> {
        let mut url = Url::parse(&format!("{}/items/currency/{}", self.base_url, category))
            .map_err(|e| PricerError::Configuration(format!("invalid API base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("league", league)
            .append_pair("page", &page.to_string())
            .append_pair("perPage", &PER_PAGE.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn get_page(&self, league: &str, category: &str, page: u32) -> PricerResult<String> {
        let url = self.build_url(league, category, page)?;
        debug!("Fetching from: {}", url);

        let transient = |e: reqwest::Error| PricerError::TransientFetch {
            page,
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transient)?;
        let response = response.error_for_status().map_err(transient)?;
        response.text().await.map_err(transient)
    }
}

// ============================================================================
// RateLimiter
// ============================================================================

/// Enforces a minimum gap between the end of one call and the start of the next
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_completed: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        RateLimiter {
            min_delay,
            last_completed: None,
        }
    }

    /// Sleep for whatever remains of the delay window
    pub async fn wait(&self) {
        if let Some(last) = self.last_completed {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                time::sleep(self.min_delay - elapsed).await;
            }
        }
    }

    pub fn mark_completed(&mut self) {
        self.last_completed = Some(Instant::now());
    }
}

// ============================================================================
// PagedFetcher
// ============================================================================

/// Result of one paged fetch
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<PricedItem>,
    pub pages_fetched: u32,
    /// The error that ended the fetch early, if any
    pub halted: Option<PricerError>,
}

pub struct PagedFetcher {
    transport: Arc<dyn PageTransport>,
    limiter: Mutex<RateLimiter>,
    timeout: Duration,
}

impl PagedFetcher {
    pub fn new(transport: Arc<dyn PageTransport>) -> Self {
        PagedFetcher::with_limits(transport, REQUEST_DELAY, REQUEST_TIMEOUT)
    }

    pub fn with_limits(transport: Arc<dyn PageTransport>, min_delay: Duration, timeout: Duration) -> Self {
        PagedFetcher {
            transport,
            limiter: Mutex::new(RateLimiter::new(min_delay)),
            timeout,
        }
    }

    /// Download every page of `category`, stopping at the first failure
    pub async fn fetch(&self, league: &str, category: &str) -> FetchOutcome {
        // Held for the whole fetch so concurrent fetches share one request sequence
        let mut limiter = self.limiter.lock().await;
        let mut outcome = FetchOutcome::default();
        let mut page = 1;

        info!("Starting {} data download...", category);

        while page <= MAX_PAGES {
            limiter.wait().await;
            let result = time::timeout(self.timeout, self.transport.get_page(league, category, page)).await;
            limiter.mark_completed();

            let body = match result {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    error!("HTTP error for page {} in {}: {}", page, category, e);
                    outcome.halted = Some(e);
                    break;
                }
                Err(_) => {
                    error!("API call for page {} timed out after {:?}", page, self.timeout);
                    outcome.halted = Some(PricerError::Timeout { page, timeout: self.timeout });
                    break;
                }
            };

            let container = match parse_page(&body, page) {
                Ok(container) => container,
                Err(e) => {
                    error!("{}", e);
                    outcome.halted = Some(e);
                    break;
                }
            };

            if container.items.is_empty() {
                if page == 1 {
                    info!("Page {} returned no items", page);
                }
                break;
            }

            let is_last = container.is_last();
            log_progress(page, &container);
            outcome.pages_fetched += 1;
            outcome.items.extend(container.items.into_iter().map(PricedItem::from));

            if is_last {
                break;
            }
            page += 1;
        }

        info!("Finished downloading {}: {} total items", category, outcome.items.len());
        outcome
    }
}

fn parse_page(body: &str, page: u32) -> PricerResult<ScoutPage> {
    if body.trim().is_empty() {
        return Err(PricerError::malformed(format!("page {}", page), "empty response"));
    }
    if page == 1 {
        info!("Received JSON response ({} chars)", body.len());
    }

    let container: ScoutPage =
        serde_json::from_str(body).map_err(|e| PricerError::malformed(format!("page {}", page), e))?;

    if page == 1 {
        info!(
            "API response: {} pages total, {} items on page 1",
            container.pages,
            container.items.len()
        );
    }
    Ok(container)
}

// Only the first page, every fifth page and the final page are logged
fn is_progress_page(page: u32, container: &ScoutPage) -> bool {
    page == 1 || page % 5 == 0 || container.is_last()
}

fn log_progress(page: u32, container: &ScoutPage) {
    if is_progress_page(page, container) {
        info!(
            "Downloaded page {}/{} with {} items",
            page,
            container.pages,
            container.items.len()
        );
    }
}
