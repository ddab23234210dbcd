use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a prepared request. Provider clients are generic over this so
/// auth wrappers can be layered on and tests can answer without a network.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
