//! Wiktionary extractor (MediaWiki Action API)
//!
//! Lists page titles for a lemma range via `list=allpages`, then fetches
//! and parses each page's wikitext. Honors a minimum inter-request delay
//! and a concurrent-request cap; 429 and 5xx responses are retried with
//! exponential backoff before the page is skipped as a soft error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use aqea_common::api::WorkError;
use aqea_common::config::WorkerConfig;
use aqea_common::model::RawRecord;
use aqea_common::{Error, Result};

use super::wikitext::{is_valid_entry_title, parse_wikitext};
use super::{ExtractorEvent, SourceExtractor};

/// Required by the MediaWiki API etiquette.
const USER_AGENT: &str = concat!(
    "aqea-worker/",
    env!("CARGO_PKG_VERSION"),
    " (lexical extraction; contact: ops@aqea.dev)"
);

/// Page-list batch size per `allpages` request.
const LIST_PAGE_LIMIT: &str = "500";

/// Upstream retry schedule: 500 ms base, doubling, 30 s cap, 5 attempts.
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 5;

/// Wiktionary subdomains by ISO 639-3 code. Editions without a dedicated
/// subdomain here fall back to English Wiktionary, which carries entries
/// for every language.
fn subdomain_for(iso3: &str) -> &'static str {
    match iso3 {
        "deu" => "de",
        "eng" => "en",
        "nld" => "nl",
        "swe" => "sv",
        "dan" => "da",
        "fra" => "fr",
        "spa" => "es",
        "ita" => "it",
        "por" => "pt",
        "rus" => "ru",
        "pol" => "pl",
        "ces" => "cs",
        _ => "en",
    }
}

/// The clonable fetch context shared with per-page tasks: HTTP client,
/// endpoint, and the rate gate.
#[derive(Clone)]
struct Fetcher {
    http: Client,
    api_url: String,
    request_delay: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl Fetcher {
    /// Enforce the minimum inter-request delay across all tasks.
    async fn enforce_rate_limit(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                sleep(self.request_delay - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    /// GET the API with retry on throttling and server errors.
    async fn fetch_json(&self, params: &[(&str, &str)]) -> Result<Value> {
        let mut delay = RETRY_BASE;
        for attempt in 1..=RETRY_ATTEMPTS {
            self.enforce_rate_limit().await;
            let outcome = self.http.get(&self.api_url).query(params).send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .map_err(|e| Error::UpstreamFetch(format!("bad API response: {e}")));
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        return Err(Error::UpstreamFetch(format!("upstream returned {status}")));
                    }
                    if attempt == RETRY_ATTEMPTS {
                        return Err(Error::UpstreamFetch(format!(
                            "upstream kept returning {status} after {RETRY_ATTEMPTS} attempts"
                        )));
                    }
                    warn!(%status, attempt, delay_ms = delay.as_millis() as u64, "upstream throttled, backing off");
                }
                Err(e) => {
                    if attempt == RETRY_ATTEMPTS {
                        return Err(Error::UpstreamFetch(format!("upstream unreachable: {e}")));
                    }
                    warn!(error = %e, attempt, "upstream request failed, backing off");
                }
            }
            sleep(delay).await;
            delay = (delay * 2).min(RETRY_CAP);
        }
        unreachable!("retry loop returns before exhausting attempts")
    }

    /// All valid page titles in `[start, end]`, following continuation
    /// tokens until the range is drained.
    async fn list_pages(&self, start: &str, end: &str) -> Result<Vec<String>> {
        let upper = format!("{end}zzz");
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("action", "query"),
                ("format", "json"),
                ("list", "allpages"),
                ("apfrom", start),
                ("apto", upper.as_str()),
                ("aplimit", LIST_PAGE_LIMIT),
                ("apnamespace", "0"),
            ];
            if let Some(token) = continue_token.as_deref() {
                params.push(("apcontinue", token));
            }
            let value = self.fetch_json(&params).await?;

            if let Some(pages) = value["query"]["allpages"].as_array() {
                for page in pages {
                    if let Some(title) = page["title"].as_str() {
                        if is_valid_entry_title(title) {
                            titles.push(title.to_string());
                        }
                    }
                }
            }
            match value["continue"]["apcontinue"].as_str() {
                Some(token) => continue_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(titles)
    }

    /// Fetch one page's wikitext and reduce it to a record. `Ok(None)`
    /// means the page exists but carries nothing usable.
    async fn fetch_entry(&self, title: &str, language: &str) -> Result<Option<RawRecord>> {
        let params = [
            ("action", "query"),
            ("format", "json"),
            ("titles", title),
            ("prop", "revisions"),
            ("rvprop", "content"),
            ("rvslots", "main"),
        ];
        let value = self.fetch_json(&params).await?;
        let Some(pages) = value["query"]["pages"].as_object() else {
            return Ok(None);
        };
        let Some((page_id, page)) = pages.iter().next() else {
            return Ok(None);
        };
        if page_id == "-1" {
            return Ok(None);
        }
        let Some(content) = page["revisions"][0]["slots"]["main"]["*"].as_str() else {
            return Ok(None);
        };
        Ok(parse_wikitext(title, content, language))
    }
}

pub struct WiktionaryExtractor {
    fetcher_template: Fetcher,
    max_concurrent: usize,
}

impl WiktionaryExtractor {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        let http = Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            fetcher_template: Fetcher {
                http,
                api_url: String::new(),
                request_delay: Duration::from_millis(config.request_delay_ms),
                last_request: Arc::new(Mutex::new(None)),
            },
            max_concurrent: config.max_concurrent_requests.max(1),
        })
    }

    fn fetcher_for(&self, language: &str) -> Fetcher {
        let mut fetcher = self.fetcher_template.clone();
        fetcher.api_url = format!(
            "https://{}.wiktionary.org/w/api.php",
            subdomain_for(language)
        );
        fetcher
    }
}

#[async_trait]
impl SourceExtractor for WiktionaryExtractor {
    fn name(&self) -> &'static str {
        "wiktionary"
    }

    async fn extract_range(
        &self,
        language: &str,
        range_start: &str,
        range_end: &str,
        tx: mpsc::Sender<ExtractorEvent>,
    ) -> Result<()> {
        let fetcher = self.fetcher_for(language);
        let titles = fetcher.list_pages(range_start, range_end).await?;
        info!(
            language,
            range_start,
            range_end,
            pages = titles.len(),
            "page listing complete"
        );
        if titles.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for title in titles {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            let fetcher = fetcher.clone();
            let tx = tx.clone();
            let language = language.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                let event = match fetcher.fetch_entry(&title, &language).await {
                    Ok(Some(record)) => Some(ExtractorEvent::Record(record)),
                    Ok(None) => {
                        debug!(%title, "page carries no usable entry");
                        None
                    }
                    Err(e) => Some(ExtractorEvent::SoftError(WorkError {
                        kind: "upstream_fetch".into(),
                        detail: format!("{title}: {e}"),
                    })),
                };
                if let Some(event) = event {
                    let _ = tx.send(event).await;
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "page fetch task panicked");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::routing::get;
    use serde_json::json;

    use super::*;

    /// Answers 429 twice, then 200 with a well-formed API body.
    async fn throttled_api(
        State(hits): State<Arc<AtomicUsize>>,
    ) -> (axum::http::StatusCode, axum::Json<serde_json::Value>) {
        let n = hits.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            (
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                axum::Json(json!({ "error": "rate limited" })),
            )
        } else {
            (
                axum::http::StatusCode::OK,
                axum::Json(json!({ "query": { "allpages": [] } })),
            )
        }
    }

    #[test]
    fn subdomains_cover_main_editions() {
        assert_eq!(subdomain_for("deu"), "de");
        assert_eq!(subdomain_for("eng"), "en");
        // languages without a listed edition fall back to English
        assert_eq!(subdomain_for("khm"), "en");
    }

    #[tokio::test]
    async fn throttled_requests_are_retried_with_backoff() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = axum::Router::new()
            .route("/w/api.php", get(throttled_api))
            .with_state(Arc::clone(&hits));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetcher = Fetcher {
            http: Client::new(),
            api_url: format!("http://{addr}/w/api.php"),
            request_delay: Duration::ZERO,
            last_request: Arc::new(Mutex::new(None)),
        };

        let started = Instant::now();
        let value = fetcher
            .fetch_json(&[("action", "query"), ("format", "json")])
            .await
            .unwrap();

        // the request was not lost: the third attempt's body comes back
        assert!(value["query"]["allpages"].as_array().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 3, "two 429s then a 200");
        // the backoff path was taken: 500 ms then 1 s between attempts
        assert!(
            started.elapsed() >= Duration::from_millis(1400),
            "expected backoff sleeps, elapsed {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn rate_gate_spaces_requests() {
        let fetcher = Fetcher {
            http: Client::new(),
            api_url: String::new(),
            request_delay: Duration::from_millis(50),
            last_request: Arc::new(Mutex::new(None)),
        };
        let start = Instant::now();
        fetcher.enforce_rate_limit().await;
        assert!(start.elapsed() < Duration::from_millis(20));
        fetcher.enforce_rate_limit().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
