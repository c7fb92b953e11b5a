use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::blocking::Client;
use url::Url;

use xmlrecord_core::{Error as CoreError, FetchResponse, Transport};

use crate::error::Error;

/// A [`Transport`] backed by a blocking reqwest client.
///
/// The query layer hands over fully-resolved URLs, so there is no base
/// URL here; this client just executes GETs with the merged header set.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use xmlrecord_core::QueryManager;
/// use xmlrecord_http::HttpTransport;
///
/// let transport = Arc::new(HttpTransport::new().with_default_header("Accept", "application/xml"));
/// let manager = QueryManager::new(schema, transport)?;
/// let muppet = manager.get(&[("name", "Gonzo")])?;
/// ```
pub struct HttpTransport {
    client: Client,
    default_headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Use a custom reqwest client (timeouts, proxies, and so on).
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            default_headers: HashMap::new(),
        }
    }

    /// Add a header sent with every request, below any per-fetch headers.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    fn header_map(&self, extra: &HashMap<String, String>) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::new();
        for (name, value) in self.default_headers.iter().chain(extra.iter()) {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(value)?;
            map.insert(name, value);
        }
        Ok(map)
    }

    fn execute(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse, Error> {
        let url = Url::parse(url)?;
        let headers = self.header_map(headers)?;
        let response = self.client.get(url).headers(headers).send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?;
        Ok(FetchResponse::new(status, body))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse, CoreError> {
        self.execute(url, headers).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_url_is_a_transport_error() {
        let transport = HttpTransport::new();
        let result = transport.fetch("not a url", &HashMap::new());
        assert!(matches!(result, Err(CoreError::Transport { .. })));
    }

    #[test]
    fn bad_header_name_is_rejected() {
        let transport = HttpTransport::new();
        let mut headers = HashMap::new();
        headers.insert("bad header\n".to_string(), "x".to_string());
        let result = transport.fetch("http://localhost/", &headers);
        assert!(matches!(result, Err(CoreError::Transport { .. })));
    }

    #[test]
    fn default_headers_accumulate() {
        let transport = HttpTransport::new()
            .with_default_header("Accept", "application/xml")
            .with_default_header("X-Custom", "value");
        assert_eq!(transport.default_headers.len(), 2);
    }
}
