use chrono::{Local, NaiveDate};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use travel_agent_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{MAX_RESULTS, SerpApiClient, de_loose_u32, parse_date};

const ROUND_TRIP: &str = "1";
const ONE_WAY: &str = "2";

/// Search parameters of [`FlightsTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FlightsParams {
    #[schemars(
        description = "Departure airport code (IATA), or a comma separated list of codes."
    )]
    departure_airport: String,
    #[schemars(
        description = "Arrival airport code (IATA), or a comma separated list of codes."
    )]
    arrival_airport: String,
    #[schemars(
        description = "Outbound date. The format is YYYY-MM-DD, e.g. 2024-06-22."
    )]
    outbound_date: String,
    #[serde(default)]
    #[schemars(
        description = "Return date. The format is YYYY-MM-DD. Leave empty for a one way trip."
    )]
    return_date: Option<String>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of adults. Default to 1.")]
    adults: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of children. Default to 0.")]
    children: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(
        with = "Option<u32>",
        description = "Number of infants in seat. Default to 0."
    )]
    infants_in_seat: Option<u32>,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(
        with = "Option<u32>",
        description = "Number of infants on lap. Default to 0."
    )]
    infants_on_lap: Option<u32>,
}

/// Arguments of [`FlightsTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FlightsInput {
    params: FlightsParams,
}

impl FlightsParams {
    fn return_date(&self) -> Option<&str> {
        self.return_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    fn validate(&self, today: NaiveDate) -> Result<(), ToolError> {
        if self.departure_airport.trim().is_empty()
            || self.arrival_airport.trim().is_empty()
            || self.outbound_date.trim().is_empty()
        {
            return Err(ToolError::invalid_input().with_reason(
                "Missing required parameters: departure_airport, arrival_airport, outbound_date",
            ));
        }
        let Some(outbound) = parse_date(&self.outbound_date) else {
            return Err(ToolError::invalid_input()
                .with_reason("Dates must be in YYYY-MM-DD format"));
        };
        if outbound < today {
            return Err(ToolError::invalid_input()
                .with_reason("`outbound_date` cannot be in the past."));
        }
        if let Some(return_date) = self.return_date() {
            let Some(return_date) = parse_date(return_date) else {
                return Err(ToolError::invalid_input()
                    .with_reason("Dates must be in YYYY-MM-DD format"));
            };
            if return_date < outbound {
                return Err(ToolError::invalid_input().with_reason(
                    "`return_date` cannot be before `outbound_date`.",
                ));
            }
        }
        Ok(())
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("engine", "google_flights".to_owned()),
            ("hl", "en".to_owned()),
            ("gl", "us".to_owned()),
            ("currency", "USD".to_owned()),
            ("departure_id", self.departure_airport.trim().to_owned()),
            ("arrival_id", self.arrival_airport.trim().to_owned()),
            ("outbound_date", self.outbound_date.trim().to_owned()),
            ("adults", self.adults.unwrap_or(1).to_string()),
            ("children", self.children.unwrap_or(0).to_string()),
            (
                "infants_in_seat",
                self.infants_in_seat.unwrap_or(0).to_string(),
            ),
            ("infants_on_lap", self.infants_on_lap.unwrap_or(0).to_string()),
        ];
        match self.return_date() {
            Some(return_date) => {
                query.push(("type", ROUND_TRIP.to_owned()));
                query.push(("return_date", return_date.to_owned()));
            }
            None => query.push(("type", ONE_WAY.to_owned())),
        }
        query
    }
}

/// Finds flights with the Google Flights engine.
pub struct FlightsTool {
    serpapi: SerpApiClient,
    parameter_schema: Value,
}

impl FlightsTool {
    /// Creates a flight search tool.
    #[inline]
    pub fn new(serpapi: SerpApiClient) -> Self {
        Self {
            serpapi,
            parameter_schema: schema_for!(FlightsInput).to_value(),
        }
    }
}

impl Tool for FlightsTool {
    type Input = FlightsInput;

    fn name(&self) -> &str {
        "flights_finder"
    }

    fn description(&self) -> &str {
        "Find flights using the Google Flights engine. Returns the best \
flights, or a few other options when there are no best flights."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: FlightsInput,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let serpapi = self.serpapi.clone();
        async move {
            let params = input.params;
            params.validate(Local::now().date_naive())?;
            let results = serpapi.search(params.query()).await?;
            Ok(pick_flights(&results).to_string())
        }
    }
}

fn pick_flights(results: &Value) -> Value {
    let list = |key: &str| {
        results
            .get(key)
            .and_then(Value::as_array)
            .filter(|flights| !flights.is_empty())
    };
    match (list("best_flights"), list("other_flights")) {
        (Some(best), _) => Value::Array(best.clone()),
        (None, Some(other)) => {
            Value::Array(other.iter().take(MAX_RESULTS).cloned().collect())
        }
        (None, None) => Value::Array(vec![]),
    }
}
