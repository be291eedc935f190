use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use travel_agent_core::ModelClient;
use travel_agent_core::tool::{Tool, ToolResult};
use travel_agent_model::{ModelMessage, ModelRequest};

use super::{de_loose_i64, de_loose_u32};

const SYSTEM_PROMPT: &str = include_str!("../prompts/itinerary_system.md");
const TEMPERATURE: f32 = 0.7;

/// Trip details of [`ItineraryTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ItineraryParams {
    #[schemars(description = "Destination city or region.")]
    destination: String,
    #[serde(deserialize_with = "de_loose_i64")]
    #[schemars(description = "Number of days in the itinerary, at least 1.")]
    days: i64,
    #[serde(default, deserialize_with = "de_loose_u32")]
    #[schemars(with = "Option<u32>", description = "Number of travelers.")]
    travelers: Option<u32>,
    #[serde(default)]
    #[schemars(
        description = "Interests to plan around, e.g. culture, food, nature."
    )]
    interests: Option<Vec<String>>,
}

/// Arguments of [`ItineraryTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ItineraryInput {
    params: ItineraryParams,
}

impl ItineraryParams {
    fn user_prompt(&self) -> String {
        let interests = match &self.interests {
            Some(interests) if !interests.is_empty() => interests.join(", "),
            _ => "none specified".to_owned(),
        };
        let travelers = match self.travelers {
            Some(n) if n > 0 => format!("for {n} travelers"),
            _ => "for the traveler(s)".to_owned(),
        };
        format!(
            "Build a {days}-day itinerary for {destination} {travelers}.\n\
             Interests: {interests}.\n\n\
             Requirements:\n\
             - An hour-by-hour plan for each day.\n\
             - How to get around between stops (metro, bus, taxi or walking).\n\
             - Places to eat close to the attractions.\n\
             - Distance and travel time between places.\n\
             - Opening and closing hours where they matter.\n\
             - Order the stops of each day so the route doesn't double back.\n\
             - Close each day with a short summary and an alternative or two.\n\
             - Format the answer as Markdown with headings, bullet points and time blocks.\n",
            days = self.days,
            destination = self.destination.trim(),
        )
    }
}

/// Writes day-by-day itineraries with the model. No external service is
/// involved.
pub struct ItineraryTool {
    model_client: ModelClient,
    parameter_schema: Value,
}

impl ItineraryTool {
    /// Creates an itinerary tool backed by `model_client`.
    #[inline]
    pub fn new(model_client: ModelClient) -> Self {
        Self {
            model_client,
            parameter_schema: schema_for!(ItineraryInput).to_value(),
        }
    }
}

impl Tool for ItineraryTool {
    type Input = ItineraryInput;

    fn name(&self) -> &str {
        "build_itinerary"
    }

    fn description(&self) -> &str {
        "Generate a detailed travel itinerary as Markdown: a daily schedule \
with transport, food, distances and an optimized route order."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: ItineraryInput,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let model_client = self.model_client.clone();
        async move {
            let params = input.params;
            // Reported as content so the model can correct itself.
            if params.days < 1 {
                return Ok("Error: `days` must be >= 1.".to_owned());
            }
            let req = ModelRequest {
                messages: vec![
                    ModelMessage::System(SYSTEM_PROMPT.to_owned()),
                    ModelMessage::User(params.user_prompt()),
                ],
                tools: vec![],
                temperature: Some(TEMPERATURE),
            };
            match model_client.send_request(req, |_| {}).await {
                Ok(resp) => Ok(resp.transcript),
                Err(err) => {
                    warn!("itinerary generation failed: {err}");
                    Ok(format!("Error generating itinerary: {err}"))
                }
            }
        }
    }
}
