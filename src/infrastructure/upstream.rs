//! 上游HTTP客户端：带超时/重试的最小实现
//!
//! 所有第三方服务（链浏览器、RPC、价格源）都视为不可信、会限流、间歇不可用。
//! 超时与其它失败一样返回 `AdapterError`，由调用方降级处理。

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::{config::HttpConfig, error::AdapterError};

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    pub timeout: Duration,
    pub retries: usize,
}

impl UpstreamClient {
    pub fn new(config: &HttpConfig) -> Self {
        Self::with_timeout(Duration::from_secs(config.timeout_secs), &config.user_agent)
    }

    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            timeout,
            retries: 1,
        }
    }

    /// GET 请求并解析 JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AdapterError> {
        self.send_with_retry(|| {
            self.client
                .get(url)
                .query(query)
                .header("Accept", "application/json")
        })
        .await
    }

    /// POST JSON 请求并解析 JSON
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, AdapterError> {
        self.send_with_retry(|| self.client.post(url).json(body)).await
    }

    async fn send_with_retry<T, F>(&self, build: F) -> Result<T, AdapterError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let err = match build().timeout(self.timeout).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| AdapterError::Parse(e.to_string()));
                }
                Ok(resp) => AdapterError::Status(resp.status().as_u16()),
                Err(e) => AdapterError::from(e),
            };

            // 4xx（含 429 限流）不重试，避免加剧限流
            let retryable = match &err {
                AdapterError::Status(code) => *code >= 500,
                AdapterError::Http(_) | AdapterError::Timeout => true,
                _ => false,
            };
            attempt += 1;
            if !retryable || attempt > self.retries {
                return Err(err);
            }

            let backoff = 50 * (1u64 << attempt.min(5)); // 简单指数回退，最大 ~1600ms
            tracing::debug!(attempt, backoff_ms = backoff, error = %err, "Retrying upstream request");
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

#[derive(Serialize)]
pub struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'a str,
    method: &'a str,
    params: P,
    id: u64,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::{json, Value};

    fn client() -> UpstreamClient {
        UpstreamClient::with_timeout(Duration::from_secs(2), "test")
    }

    #[tokio::test]
    async fn test_get_json_with_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api").query_param("module", "account");
            then.status(200).json_body(json!({ "status": "1", "result": "42" }));
        });

        let v: Value = client()
            .get_json(&server.url("/api"), &[("module", "account")])
            .await
            .unwrap();
        mock.assert();
        assert_eq!(v["result"], "42");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(429);
        });

        let err = client()
            .get_json::<Value>(&server.url("/limited"), &[])
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Status(429));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/rpc");
            then.status(503);
        });

        let err = client()
            .post_json::<_, Value>(&server.url("/rpc"), &JsonRpcRequest::new("getBalance", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Status(503));
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body("<html>oops</html>");
        });

        let err = client()
            .get_json::<Value>(&server.url("/html"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({}));
        });

        let mut client = UpstreamClient::with_timeout(Duration::from_millis(100), "test");
        client.retries = 0;
        let err = client
            .get_json::<Value>(&server.url("/slow"), &[])
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Timeout);
    }
}
