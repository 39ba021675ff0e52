pub mod urls;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

/// The portal rejects unadorned client user-agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:97.0) Gecko/20100101 Firefox/97.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything that can go wrong talking to the portal, split so the per-unit
/// guards can tell a flaky network from a changed page layout.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("unexpected page structure: {0}")]
    Structure(String),
    #[error("too many search results, narrow the date range")]
    TooManyResults,
    #[error("writing {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScrapeError {
    pub fn structure(msg: impl Into<String>) -> Self {
        ScrapeError::Structure(msg.into())
    }

    /// Structural failures mean the portal markup changed and retrying the
    /// same unit will fail again until the extractor is updated.
    pub fn is_structural(&self) -> bool {
        matches!(self, ScrapeError::Structure(_))
    }
}

/// The blocking fetch seam. Stages depend on this trait so the paginator and
/// the per-lot extractors can be driven from canned pages in tests.
pub trait Fetch {
    /// GET `url` with the given query pairs and return the body text.
    fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ScrapeError>;

    /// GET `url` and return the raw body bytes.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError>;
}

/// Production fetcher: one blocking client, fixed user-agent, 60 s ceiling
/// per request.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Fetcher { client })
    }
}

impl Fetch for Fetcher {
    fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|source| ScrapeError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status,
            });
        }
        resp.text().map_err(|source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|source| ScrapeError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status,
            });
        }
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|source| ScrapeError::Transport {
                url: url.to_string(),
                source,
            })
    }
}
