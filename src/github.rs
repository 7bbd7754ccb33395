use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::DEFAULT_API_HOST;
use crate::error::{SyncError, SyncOutcome};

/// Where raw items and gist file contents come from
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every page of `endpoint` until an empty page is returned.
    ///
    /// There is no page cap: an endpoint that never returns an empty page
    /// keeps this looping.
    async fn fetch_all(&self, endpoint: &str, user: &str, auth_token: &str) -> SyncOutcome<Vec<Value>>;

    /// Download the raw bytes behind `url`
    async fn download(&self, url: &str, auth_token: &str) -> SyncOutcome<Vec<u8>>;
}

/// GitHub REST client speaking plain page-numbered pagination
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_host: String,
}

impl GitHubClient {
    /// Create a client against the public GitHub API
    pub fn new() -> Self {
        Self::with_host(DEFAULT_API_HOST)
    }

    /// Create a client against another host (GitHub Enterprise, test servers)
    pub fn with_host(api_host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_host: api_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn get(&self, url: &str, auth_token: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("repomirror/", env!("CARGO_PKG_VERSION")));

        if carries_token(&self.api_host, url) {
            request.header(AUTHORIZATION, format!("token {}", auth_token))
        } else {
            debug!("Not sending credentials to {}", url);
            request
        }
    }

    async fn fetch_page(&self, endpoint: &str, user: &str, auth_token: &str, page: u32) -> SyncOutcome<Vec<Value>> {
        let url = format!("{}{}?page={}", self.api_host, endpoint, page);
        debug!("Fetching {}", url);

        let transport = |source| SyncError::Transport {
            url: url.clone(),
            source,
        };

        let response = self
            .get(&url, auth_token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(SyncError::RemoteFetch {
                endpoint: endpoint.to_string(),
                user: user.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(transport)?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(SyncError::decode(endpoint, &body)),
        }
    }
}

/// Hosts that serve gist contents and may see the token
const TRUSTED_RAW_HOSTS: [&str; 2] = ["gist.githubusercontent.com", "raw.githubusercontent.com"];

/// Whether `url` points at the API host itself or a GitHub raw content host
fn carries_token(api_host: &str, url: &str) -> bool {
    let Ok(target) = Url::parse(url) else {
        return false;
    };
    let Some(host) = target.host_str() else {
        return false;
    };

    if let Ok(api) = Url::parse(api_host) {
        if api.host_str() == Some(host) && api.port_or_known_default() == target.port_or_known_default() {
            return true;
        }
    }

    target.scheme() == "https" && TRUSTED_RAW_HOSTS.contains(&host)
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn fetch_all(&self, endpoint: &str, user: &str, auth_token: &str) -> SyncOutcome<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let page_items = self.fetch_page(endpoint, user, auth_token, page).await?;
            if page_items.is_empty() {
                break;
            }

            debug!("Page {} of {} returned {} items", page, endpoint, page_items.len());
            items.extend(page_items);
            page += 1;
        }

        debug!("Fetched {} items from {}", items.len(), endpoint);
        Ok(items)
    }

    async fn download(&self, url: &str, auth_token: &str) -> SyncOutcome<Vec<u8>> {
        let transport = |source| SyncError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.get(url, auth_token).send().await.map_err(transport)?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(SyncError::RemoteFetch {
                endpoint: url.to_string(),
                user: String::new(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_page(server: &MockServer, endpoint: &str, page: u32, body: Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("page", page.to_string()))
            .and(header("authorization", "token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_all_concatenates_pages_in_order() {
        let server = MockServer::start().await;
        mount_page(&server, "/user/repos", 1, json!([{"name": "a"}, {"name": "b"}])).await;
        mount_page(&server, "/user/repos", 2, json!([{"name": "c"}])).await;
        mount_page(&server, "/user/repos", 3, json!([])).await;

        let client = GitHubClient::with_host(server.uri());
        let items = client.fetch_all("/user/repos", "alice", "secret").await.unwrap();

        let names: Vec<_> = items.iter().map(|i| i["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_all_with_empty_first_page() {
        let server = MockServer::start().await;
        mount_page(&server, "/gists", 1, json!([])).await;

        let client = GitHubClient::with_host(server.uri());
        let items = client.fetch_all("/gists", "alice", "secret").await.unwrap();

        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_fails_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .mount(&server)
            .await;

        let client = GitHubClient::with_host(server.uri());
        let err = client.fetch_all("/user/repos", "alice", "secret").await.unwrap_err();

        assert_matches!(
            err,
            SyncError::RemoteFetch { ref endpoint, ref user, status: 401 }
                if endpoint == "/user/repos" && user == "alice"
        );
    }

    #[tokio::test]
    async fn test_non_array_payload_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "not a list"})))
            .mount(&server)
            .await;

        let client = GitHubClient::with_host(server.uri());
        let err = client.fetch_all("/gists", "alice", "secret").await.unwrap_err();

        assert_matches!(err, SyncError::RemoteDecode { ref payload, .. } if payload.contains("not a list"));
    }

    #[tokio::test]
    async fn test_download_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw/notes.md"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"# notes\n".to_vec()))
            .mount(&server)
            .await;

        let client = GitHubClient::with_host(server.uri());
        let url = format!("{}/raw/notes.md", server.uri());
        let bytes = client.download(&url, "secret").await.unwrap();

        assert_eq!(bytes, b"# notes\n");
    }

    #[tokio::test]
    async fn test_download_from_foreign_host_omits_token() {
        let api = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw/notes.md"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&elsewhere)
            .await;

        let client = GitHubClient::with_host(api.uri());
        let url = format!("{}/raw/notes.md", elsewhere.uri());
        client.download(&url, "secret").await.unwrap();

        let requests = elsewhere.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0]
            .headers
            .keys()
            .any(|name| name.as_str().eq_ignore_ascii_case("authorization")));
    }

    #[test]
    fn test_token_only_goes_to_trusted_hosts() {
        let api = "https://api.github.com";

        assert!(carries_token(api, "https://api.github.com/gists"));
        assert!(carries_token(api, "https://gist.githubusercontent.com/alice/abc/raw/a.txt"));
        assert!(carries_token("http://127.0.0.1:8080", "http://127.0.0.1:8080/raw/a"));

        assert!(!carries_token(api, "https://evil.example.com/raw/a.txt"));
        assert!(!carries_token(api, "http://gist.githubusercontent.com/alice/abc/raw/a.txt"));
        assert!(!carries_token("http://127.0.0.1:8080", "http://127.0.0.1:9090/raw/a"));
        assert!(!carries_token(api, "not a url"));
    }

    #[test]
    fn test_trailing_slash_is_trimmed_from_host() {
        let client = GitHubClient::with_host("http://localhost:8080/");
        assert_eq!(client.api_host(), "http://localhost:8080");
    }
}
