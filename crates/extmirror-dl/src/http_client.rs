use std::time::Duration;

use ureq::{
    http::{self, HeaderMap, HeaderName, HeaderValue, Uri},
    typestate::WithoutBody,
    Agent, Proxy, RequestBuilder,
};

use crate::error::{DownloadError, Result};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub headers: Option<HeaderMap>,
    pub proxy: Option<Proxy>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(format!("extmirror/{}", env!("CARGO_PKG_VERSION"))),
            headers: None,
            proxy: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an [`HttpClient`] from this configuration.
    ///
    /// Error statuses are handed back as ordinary responses so callers can
    /// classify them; redirects are followed.
    ///
    /// # Examples
    ///
    /// ```
    /// use extmirror_dl::http_client::ClientConfig;
    ///
    /// let client = ClientConfig::default().build();
    /// let _req = client.get("http://example.com");
    /// ```
    pub fn build(&self) -> HttpClient {
        let mut config = Agent::config_builder()
            .proxy(self.proxy.clone())
            .timeout_global(self.timeout)
            .http_status_as_error(false);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        HttpClient {
            agent: config.build().into(),
            headers: self.headers.clone(),
        }
    }

    /// Sets the proxy from a URL such as `socks5://127.0.0.1:1080`.
    pub fn with_proxy(mut self, proxy: &str) -> Result<Self> {
        let parsed = Proxy::new(proxy).map_err(|err| {
            DownloadError::InvalidProxy {
                proxy: proxy.to_string(),
                source: Box::new(err),
            }
        })?;
        self.proxy = Some(parsed);
        Ok(self)
    }

    /// Adds a header given as `Name: value`.
    pub fn with_header(mut self, header: &str) -> Result<Self> {
        let (name, value) = parse_header(header)?;
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        Ok(self)
    }
}

fn parse_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| DownloadError::InvalidHeader(header.to_string()))?;

    let name = HeaderName::try_from(name.trim())
        .map_err(|_| DownloadError::InvalidHeader(header.to_string()))?;
    let value = HeaderValue::try_from(value.trim())
        .map_err(|_| DownloadError::InvalidHeader(header.to_string()))?;

    Ok((name, value))
}

/// HTTP client shared by every worker of a run.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct HttpClient {
    agent: Agent,
    headers: Option<HeaderMap>,
}

impl HttpClient {
    pub fn get<T>(&self, uri: T) -> RequestBuilder<WithoutBody>
    where
        Uri: TryFrom<T>,
        <Uri as TryFrom<T>>::Error: Into<http::Error>,
    {
        let req = self.agent.get(uri);
        apply_headers(req, &self.headers)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        ClientConfig::default().build()
    }
}

fn apply_headers<B>(mut req: RequestBuilder<B>, headers: &Option<HeaderMap>) -> RequestBuilder<B> {
    if let Some(headers) = headers {
        for (key, value) in headers.iter() {
            req = req.header(key, value);
        }
    }
    req
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("extmirror/")));
        assert!(config.proxy.is_none());
        assert!(config.headers.is_none());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("X-Api-Key:  secret ").unwrap();
        assert_eq!(name.as_str(), "x-api-key");
        assert_eq!(value.to_str().unwrap(), "secret");

        assert!(matches!(
            parse_header("no separator"),
            Err(DownloadError::InvalidHeader(_))
        ));
        assert!(matches!(
            parse_header("bad name: v"),
            Err(DownloadError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_with_header_accumulates() {
        let config = ClientConfig::default()
            .with_header("A: 1")
            .unwrap()
            .with_header("B: 2")
            .unwrap();
        let headers = config.headers.unwrap();
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_headers_and_user_agent_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header("x-token", "abc")
                .header("user-agent", "extmirror-test");
            then.status(200).body("pong");
        });

        let client = ClientConfig {
            user_agent: Some("extmirror-test".into()),
            ..ClientConfig::default()
        }
        .with_header("X-Token: abc")
        .unwrap()
        .build();

        let mut resp = client.get(server.url("/ping")).call().unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.body_mut().read_to_string().unwrap(), "pong");
        mock.assert();
    }

    #[test]
    fn test_error_status_is_not_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let client = HttpClient::default();
        let resp = client.get(server.url("/gone")).call().unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }
}
