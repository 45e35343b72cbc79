use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::app::{EstuaryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One call against a remote feed service.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url.into())
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url.into())
    }

    fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            form: Vec::new(),
            json: None,
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn form(mut self, key: &str, value: impl ToString) -> Self {
        self.form.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Map HTTP failures onto the error taxonomy.
    pub fn check(self) -> Result<Self> {
        match self.status {
            200..=299 => Ok(self),
            401 | 403 => Err(EstuaryError::Auth(format!(
                "HTTP {}: {}",
                self.status,
                self.text()
            ))),
            404 => Err(EstuaryError::NotFound(format!("HTTP 404: {}", self.text()))),
            status => Err(EstuaryError::Network(format!(
                "HTTP {}: {}",
                status,
                self.text()
            ))),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| EstuaryError::Parse(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes API requests; swapped for a scripted fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        } else if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        tracing::debug!("{:?} {} -> {}", request.method, request.url, status);
        Ok(ApiResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_maps_status() {
        assert!(ApiResponse::ok("{}").check().is_ok());
        assert!(matches!(
            ApiResponse::with_status(401, "").check(),
            Err(EstuaryError::Auth(_))
        ));
        assert!(matches!(
            ApiResponse::with_status(404, "").check(),
            Err(EstuaryError::NotFound(_))
        ));
        assert!(matches!(
            ApiResponse::with_status(503, "down").check(),
            Err(EstuaryError::Network(_))
        ));
    }

    #[test]
    fn test_json_error_is_parse() {
        let response = ApiResponse::ok("not json");
        let parsed: Result<serde_json::Value> = response.json();
        assert!(matches!(parsed, Err(EstuaryError::Parse(_))));
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::post("https://example.com/api")
            .query("n", 100)
            .form("i", "item-1");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.query_value("n"), Some("100"));
        assert_eq!(request.form_value("i"), Some("item-1"));
        assert_eq!(request.form_value("missing"), None);
    }
}
