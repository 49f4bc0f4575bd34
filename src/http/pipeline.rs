use super::Interceptor;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::sync::Arc;

/// Shared client plus an ordered interceptor chain.
#[derive(Clone)]
pub struct HttpPipeline {
    client: Client,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl HttpPipeline {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor; interceptors run in insertion order.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Build the request and run it through every interceptor.
    pub fn prepare(&self, builder: RequestBuilder) -> reqwest::Result<reqwest::Request> {
        let mut request = builder.build()?;
        for interceptor in &self.interceptors {
            interceptor.intercept(&mut request);
        }
        Ok(request)
    }

    pub async fn execute(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let request = self.prepare(builder)?;
        tracing::debug!(method = %request.method(), url = %request.url(), "Dispatching request");
        self.client.execute(request).await
    }
}
