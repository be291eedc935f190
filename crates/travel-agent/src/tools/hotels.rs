use chrono::{Local, NaiveDate};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use travel_agent_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{MAX_RESULTS, SerpApiClient, de_loose_string, de_loose_u32, parse_date};

/// Sort by highest rating.
const DEFAULT_SORT_BY: u32 = 8;

/// Search parameters of [`HotelsTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HotelsParams {
    #[schemars(description = "Location of the hotel.")]
    q: String,
    #[schemars(
        description = "Check-in date. The format is YYYY-MM-DD, e.g. 2024-06-22."
    )]
    check_in_date: String,
    #[schemars(
        description = "Check-out date. The format is YYYY-MM-DD, e.g. 2024-06-28."
    )]
    check_out_date: String,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(
        with = "Option<u32>",
        description = "Sort order of the results. Default is 8, highest rating first."
    )]
    sort_by: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of adults. Default to 1.")]
    adults: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of children. Default to 0.")]
    children: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of rooms. Default to 1.")]
    rooms: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_string")]
    #[schemars(
        with = "Option<String>",
        description = "Only include these hotel classes, for example `2,3,4`."
    )]
    hotel_class: Option<String>,
}

/// Arguments of [`HotelsTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HotelsInput {
    params: HotelsParams,
}

impl HotelsParams {
    fn validate(&self, today: NaiveDate) -> Result<(), ToolError> {
        if self.q.trim().is_empty()
            || self.check_in_date.trim().is_empty()
            || self.check_out_date.trim().is_empty()
        {
            return Err(ToolError::invalid_input().with_reason(
                "Missing required parameters: q, check_in_date, check_out_date",
            ));
        }
        let (Some(check_in), Some(check_out)) = (
            parse_date(&self.check_in_date),
            parse_date(&self.check_out_date),
        ) else {
            return Err(ToolError::invalid_input()
                .with_reason("Dates must be in YYYY-MM-DD format"));
        };
        if check_in < today {
            return Err(ToolError::invalid_input()
                .with_reason("`check_in_date` cannot be in the past."));
        }
        if check_out <= check_in {
            return Err(ToolError::invalid_input().with_reason(
                "`check_out_date` must be after `check_in_date`.",
            ));
        }
        Ok(())
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("engine", "google_hotels".to_owned()),
            ("hl", "en".to_owned()),
            ("gl", "us".to_owned()),
            ("currency", "USD".to_owned()),
            ("q", self.q.trim().to_owned()),
            ("check_in_date", self.check_in_date.trim().to_owned()),
            ("check_out_date", self.check_out_date.trim().to_owned()),
            ("adults", self.adults.unwrap_or(1).to_string()),
            ("children", self.children.unwrap_or(0).to_string()),
            ("rooms", self.rooms.unwrap_or(1).to_string()),
            (
                "sort_by",
                self.sort_by.unwrap_or(DEFAULT_SORT_BY).to_string(),
            ),
        ];
        if let Some(hotel_class) = &self.hotel_class {
            query.push(("hotel_class", hotel_class.clone()));
        }
        query
    }
}

/// Finds hotels with the Google Hotels engine.
pub struct HotelsTool {
    serpapi: SerpApiClient,
    parameter_schema: Value,
}

impl HotelsTool {
    /// Creates a hotel search tool.
    #[inline]
    pub fn new(serpapi: SerpApiClient) -> Self {
        Self {
            serpapi,
            parameter_schema: schema_for!(HotelsInput).to_value(),
        }
    }
}

impl Tool for HotelsTool {
    type Input = HotelsInput;

    fn name(&self) -> &str {
        "hotels_finder"
    }

    fn description(&self) -> &str {
        "Find hotels using the Google Hotels engine. Returns up to 5 properties \
with prices, ratings and links."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: HotelsInput,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let serpapi = self.serpapi.clone();
        async move {
            let params = input.params;
            params.validate(Local::now().date_naive())?;
            let results = serpapi.search(params.query()).await?;
            Ok(first_properties(&results).to_string())
        }
    }
}

fn first_properties(results: &Value) -> Value {
    let properties = results
        .get("properties")
        .and_then(Value::as_array)
        .map(|p| p.iter().take(MAX_RESULTS).cloned().collect())
        .unwrap_or_default();
    Value::Array(properties)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(q: &str, check_in: &str, check_out: &str) -> HotelsParams {
        serde_json::from_value(json!({
            "q": q,
            "check_in_date": check_in,
            "check_out_date": check_out,
        }))
        .unwrap()
    }

    fn reason(result: Result<(), ToolError>) -> String {
        result.unwrap_err().reason().into_owned()
    }

    #[test]
    fn test_validate() {
        let today = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();

        assert!(params("Paris", "2030-06-01", "2030-06-03").validate(today).is_ok());
        assert_eq!(
            reason(params("", "2030-06-01", "2030-06-03").validate(today)),
            "Missing required parameters: q, check_in_date, check_out_date"
        );
        assert_eq!(
            reason(params("Paris", "06/01/2030", "2030-06-03").validate(today)),
            "Dates must be in YYYY-MM-DD format"
        );
        assert_eq!(
            reason(params("Paris", "2030-05-31", "2030-06-03").validate(today)),
            "`check_in_date` cannot be in the past."
        );
        assert_eq!(
            reason(params("Paris", "2030-06-03", "2030-06-03").validate(today)),
            "`check_out_date` must be after `check_in_date`."
        );
    }

    #[test]
    fn test_query() {
        let params: HotelsParams = serde_json::from_value(json!({
            "q": "Bali",
            "check_in_date": "2030-06-01",
            "check_out_date": "2030-06-04",
            "adults": "2",
            "hotel_class": 4,
        }))
        .unwrap();
        let query = params.query();
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("engine"), Some("google_hotels"));
        assert_eq!(get("currency"), Some("USD"));
        assert_eq!(get("adults"), Some("2"));
        assert_eq!(get("children"), Some("0"));
        assert_eq!(get("rooms"), Some("1"));
        assert_eq!(get("sort_by"), Some("8"));
        assert_eq!(get("hotel_class"), Some("4"));
    }

    #[test]
    fn test_first_properties() {
        let results = json!({
            "properties": (0..8).map(|i| json!({ "name": i })).collect::<Vec<_>>()
        });
        let properties = first_properties(&results);
        assert_eq!(properties.as_array().unwrap().len(), 5);
        assert_eq!(first_properties(&json!({})), json!([]));
    }

    #[test]
    fn test_schema() {
        let tool = HotelsTool::new(SerpApiClient::new(None));
        let schema = tool.parameter_schema();
        assert!(schema["$defs"]["HotelsParams"]["properties"]["q"].is_object());
        let required = schema["$defs"]["HotelsParams"]["required"]
            .as_array()
            .unwrap();
        assert!(required.contains(&json!("check_in_date")));
        assert!(!required.contains(&json!("adults")));
    }
}
