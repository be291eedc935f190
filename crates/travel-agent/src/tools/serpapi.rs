use reqwest::{Client, Url};
use serde_json::Value;
use travel_agent_core::tool::Error as ToolError;

const DEFAULT_BASE_URL: &str = "https://serpapi.com/search.json";

/// A minimal client of the SerpApi search endpoint.
///
/// Cloning is cheap, clones share the connection pool.
#[derive(Clone)]
pub struct SerpApiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl SerpApiClient {
    /// Creates a client. Searches fail with an explanation when `api_key`
    /// is `None`, so the model can tell the user.
    #[inline]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Sets a custom endpoint.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Runs a search and returns the decoded response.
    pub async fn search(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<Value, ToolError> {
        let Some(api_key) = &self.api_key else {
            return Err(ToolError::execution_error()
                .with_reason("SERPAPI_API_KEY is not set"));
        };
        let engine = params
            .iter()
            .find(|(k, _)| *k == "engine")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let url = Url::parse_with_params(
            &self.base_url,
            params
                .iter()
                .map(|(k, v)| (*k, v.as_str()))
                .chain([("api_key", api_key.as_str())]),
        )
        .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;

        debug!("serpapi search: {engine}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| ToolError::execution_error().with_reason(err.to_string()))?;
        parse_response(status.as_u16(), &body)
    }
}

fn parse_response(status: u16, body: &str) -> Result<Value, ToolError> {
    let value = serde_json::from_str::<Value>(body).ok();
    if let Some(error) = value
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
    {
        return Err(ToolError::execution_error().with_reason(error));
    }
    if !(200..300).contains(&status) {
        return Err(ToolError::execution_error()
            .with_reason(format!("SerpApi returned HTTP {status}")));
    }
    value.ok_or_else(|| {
        ToolError::execution_error().with_reason("SerpApi returned malformed JSON")
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_response() {
        let value = parse_response(200, r#"{"properties":[]}"#).unwrap();
        assert_eq!(value, json!({ "properties": [] }));

        let err = parse_response(401, r#"{"error":"Invalid API key."}"#)
            .unwrap_err();
        assert_eq!(err.reason(), "Invalid API key.");

        let err = parse_response(200, r#"{"error":"Google hasn't returned any results."}"#)
            .unwrap_err();
        assert!(err.reason().starts_with("Google hasn't"));

        let err = parse_response(502, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.reason(), "SerpApi returned HTTP 502");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let err = SerpApiClient::new(None)
            .search(vec![("engine", "google_hotels".to_owned())])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "SERPAPI_API_KEY is not set");
    }
}
