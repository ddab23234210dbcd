mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, anyhow};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Builds a request carrying `body` as JSON.
pub fn json_request(method: Method, url: &str, body: &impl Serialize) -> Result<Request> {
    let mut req = Request::new(method, url.parse().with_context(|| format!("bad URL {url}"))?);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    Ok(req)
}

/// Sends `req` and decodes a JSON response, turning non-2xx statuses into
/// errors that carry the response body.
pub async fn send_json<C, T>(client: &C, req: Request) -> Result<T>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let url = req.url().clone();
    let response = client
        .execute(req)
        .await
        .map_err(|e| anyhow!("Failed to send request to {}: {}", url.path(), e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("API returned status {}: {}", status, body));
    }

    response
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse response: {}", e))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::HttpClient;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What a [`RecordingClient`] saw of one request.
    pub(crate) struct SeenRequest {
        pub method: reqwest::Method,
        pub url: reqwest::Url,
        pub headers: HeaderMap,
        pub body: Vec<u8>,
    }

    impl SeenRequest {
        pub fn header(&self, name: &str) -> Option<String> {
            self.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        }

        pub fn query(&self, name: &str) -> Option<String> {
            self.url
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Answers every request from a script of `(status, body)` pairs; the
    /// last entry repeats once the script runs out.
    pub(crate) struct RecordingClient {
        script: Mutex<VecDeque<(u16, String)>>,
        seen: Mutex<Vec<SeenRequest>>,
    }

    impl RecordingClient {
        pub fn ok(body: &str) -> Self {
            Self::scripted(&[(200, body)])
        }

        pub fn scripted(script: &[(u16, &str)]) -> Self {
            Self {
                script: Mutex::new(script.iter().map(|(s, b)| (*s, b.to_string())).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn last(&self) -> SeenRequest {
            self.seen.lock().unwrap().pop().expect("no request was sent")
        }

        pub fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let body = req
                .body()
                .and_then(|b| b.as_bytes())
                .map(<[u8]>::to_vec)
                .unwrap_or_default();
            self.seen.lock().unwrap().push(SeenRequest {
                method: req.method().clone(),
                url: req.url().clone(),
                headers: req.headers().clone(),
                body,
            });

            let (status, body) = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap_or((200, String::new()))
                }
            };
            let response = http::Response::builder().status(status).body(body).unwrap();
            Ok(reqwest::Response::from(response))
        }
    }
}
