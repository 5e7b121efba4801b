use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result, status_error};
use crate::util::redact_url;

/// One blocking GET returning the body of a successful answer.
///
/// Non-success statuses are errors. Retrying is left to the caller.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(timeout: Duration, verify: bool) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("meteofr-wcs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("meteofr-wcs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %redact_url(url), "GET");
        // reqwest errors carry the full url, token and password included.
        let resp = self.http.get(url).send().map_err(|e| Error::Transport(e.without_url()))?;
        let status = resp.status();
        let body = resp.bytes().map_err(|e| Error::Transport(e.without_url()))?;
        if !status.is_success() {
            return Err(status_error(status, url, &String::from_utf8_lossy(&body)));
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_do_not_echo_the_url() {
        let transport = HttpTransport::new(Duration::from_secs(2), true).unwrap();
        let err = transport
            .get("http://127.0.0.1:9/api/__TOKEN__/services/GetAPIKey?username=jdoe&password=S3CRETPW")
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        let msg = err.to_string();
        assert!(!msg.contains("S3CRETPW"), "{msg}");
        assert!(!msg.contains("__TOKEN__"), "{msg}");
    }
}
