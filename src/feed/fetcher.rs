use futures::stream::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::config::FetchConfig;
use crate::feed::parser::{parse_entries, ParseError, RawEntry};

/// Errors that can occur while fetching a feed.
///
/// Every variant names the offending URL. None of them is retried here;
/// retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, truncated body)
    #[error("An error occurred while requesting {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP response with non-2xx status code
    #[error("Error response {status} while requesting {url}")]
    HttpStatus { url: String, status: u16 },
    /// Body is not RSS/Atom, or it is a feed without entries
    #[error("URL {url} can not be parsed as feed or feed is empty: {detail}")]
    EmptyFeed { url: String, detail: String },
    /// Response body exceeded the configured size limit
    #[error("Response from {url} exceeds {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::HttpStatus { url, .. }
            | FetchError::EmptyFeed { url, .. }
            | FetchError::ResponseTooLarge { url, .. } => url,
        }
    }
}

/// Build the HTTP client used for feed fetches.
///
/// No request timeout is set unless `timeout_secs` is configured.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(redirect_policy(config.max_redirects))
        .pool_idle_timeout(Duration::from_secs(30));
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

fn redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_redirects {
            return attempt.error(format!("Too many redirects (max {})", max_redirects));
        }

        // Detect loops
        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Fetch `url` with a single GET and parse the body into entries.
///
/// # Errors
///
/// - [`FetchError::Transport`] - connection failed or the body could not be read
/// - [`FetchError::HttpStatus`] - non-2xx response
/// - [`FetchError::ResponseTooLarge`] - body larger than `max_bytes`
/// - [`FetchError::EmptyFeed`] - body is not a feed or has no entries
pub async fn fetch_entries(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<Vec<RawEntry>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = read_limited_bytes(response, url, max_bytes).await?;
    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed body");

    parse_entries(&bytes).map_err(|e| {
        let detail = match e {
            ParseError::NoEntries => "feed contains no entries".to_string(),
            ParseError::Feed(inner) => format!("not a feed ({})", inner),
        };
        FetchError::EmptyFeed {
            url: url.to_string(),
            detail,
        }
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let too_large = || FetchError::ResponseTooLarge {
        url: url.to_string(),
        limit,
    };

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(too_large());
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
