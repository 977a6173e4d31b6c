use std::io::Read;

use serde::de::DeserializeOwned;
use ureq::{http::Response, Body};

use crate::{
    error::{DownloadError, Result},
    http_client::HttpClient,
    pool::Attempt,
};

/// Upper bound for a JSON response body.
const JSON_BODY_LIMIT: u64 = 64 * 1024 * 1024;

impl<T> From<Result<T>> for Attempt<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(err) if err.is_retriable() => Attempt::Retry(err.to_string()),
            Err(err) => Attempt::Fatal(err.to_string()),
        }
    }
}

/// Issues a GET and fails on any status outside 200..400.
///
/// Redirects have already been followed by the agent, so `url` is the
/// originally requested address.
pub fn fetch(client: &HttpClient, url: &str) -> Result<Response<Body>> {
    let resp = client.get(url).call()?;
    let status = resp.status().as_u16();
    if (200..400).contains(&status) {
        Ok(resp)
    } else {
        Err(DownloadError::HttpError {
            status,
            url: url.to_string(),
        })
    }
}

/// Reads the whole body, then decodes it.
///
/// A body that cannot be read is a [`DownloadError::InvalidResponse`]; one
/// that was read but does not decode is [`DownloadError::MalformedJson`].
pub fn fetch_json<T: DeserializeOwned>(client: &HttpClient, url: &str) -> Result<T> {
    let body = fetch(client, url)?
        .body_mut()
        .with_config()
        .limit(JSON_BODY_LIMIT)
        .read_to_string()
        .map_err(|err| {
            DownloadError::InvalidResponse {
                url: url.to_string(),
                reason: err.to_string(),
            }
        })?;

    serde_json::from_str(&body).map_err(|source| {
        DownloadError::MalformedJson {
            url: url.to_string(),
            source,
        }
    })
}

/// Opens the response body as a stream, without a size limit.
pub fn fetch_reader(client: &HttpClient, url: &str) -> Result<Box<dyn Read + Send>> {
    let resp = fetch(client, url)?;
    Ok(Box::new(resp.into_body().into_reader()))
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Page {
        count: u64,
    }

    #[test]
    fn test_fetch_json_success() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search").query_param("page", "1");
            then.status(200).json_body(json!({ "count": 3 }));
        });

        let client = HttpClient::default();
        let attempt: Attempt<Page> = fetch_json(&client, &server.url("/search?page=1")).into();
        assert!(matches!(attempt, Attempt::Done(Page { count: 3 })));
    }

    #[test]
    fn test_client_error_is_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let client = HttpClient::default();
        let attempt: Attempt<Page> = fetch_json(&client, &server.url("/missing")).into();
        assert!(matches!(attempt, Attempt::Fatal(_)));
    }

    #[test]
    fn test_server_error_is_retried() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let client = HttpClient::default();
        let attempt: Attempt<Page> = fetch_json(&client, &server.url("/flaky")).into();
        assert!(matches!(attempt, Attempt::Retry(_)));
    }

    #[test]
    fn test_malformed_body_is_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/broken");
            then.status(200).body("{ not json");
        });

        let client = HttpClient::default();
        let attempt: Attempt<Page> = fetch_json(&client, &server.url("/broken")).into();
        assert!(matches!(attempt, Attempt::Fatal(_)));
    }

    #[test]
    fn test_connection_refused_is_retried() {
        let client = HttpClient::default();
        let attempt: Attempt<Page> = fetch_json(&client, "http://127.0.0.1:1/").into();
        assert!(matches!(attempt, Attempt::Retry(_)));
    }

    #[test]
    fn test_redirect_is_followed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(302).header("Location", server.url("/new"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("payload");
        });

        let client = HttpClient::default();
        let mut reader = fetch_reader(&client, &server.url("/old")).unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        assert_eq!(body, "payload");
    }
}
