//! The tools the travel planner can call.

mod flights;
mod hotels;
mod itinerary;
mod serpapi;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

pub use flights::{FlightsInput, FlightsParams, FlightsTool};
pub use hotels::{HotelsInput, HotelsParams, HotelsTool};
pub use itinerary::{ItineraryInput, ItineraryParams, ItineraryTool};
pub use serpapi::SerpApiClient;

/// Number of results handed back to the model per search.
const MAX_RESULTS: usize = 5;

/// Models are sloppy about numbers, `"2"` and `2` are both accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(i64),
    Text(String),
}

fn de_loose_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Number(n)) => u32::try_from(n).map(Some).map_err(Error::custom),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s.trim().parse().map(Some).map_err(Error::custom),
    }
}

fn de_loose_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Loose::deserialize(deserializer)? {
        Loose::Number(n) => Ok(n),
        Loose::Text(s) => s.trim().parse().map_err(Error::custom),
    }
}

fn de_loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        None => None,
        Some(Loose::Number(n)) => Some(n.to_string()),
        Some(Loose::Text(s)) => Some(s),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct Counts {
        #[serde(default, deserialize_with = "de_loose_u32")]
        adults: Option<u32>,
        #[serde(default, deserialize_with = "de_loose_string")]
        class: Option<String>,
    }

    #[derive(Deserialize)]
    struct Offset {
        #[serde(deserialize_with = "de_loose_i64")]
        days: i64,
    }

    #[test]
    fn test_loose_numbers() {
        let counts: Counts =
            serde_json::from_value(json!({ "adults": "2", "class": 4 })).unwrap();
        assert_eq!(counts.adults, Some(2));
        assert_eq!(counts.class.as_deref(), Some("4"));

        let counts: Counts = serde_json::from_value(json!({})).unwrap();
        assert_eq!(counts.adults, None);

        assert!(serde_json::from_value::<Counts>(json!({ "adults": "two" })).is_err());
        assert!(serde_json::from_value::<Counts>(json!({ "adults": -1 })).is_err());
    }

    #[test]
    fn test_loose_signed() {
        let offset: Offset = serde_json::from_value(json!({ "days": "3" })).unwrap();
        assert_eq!(offset.days, 3);
        let offset: Offset = serde_json::from_value(json!({ "days": -2 })).unwrap();
        assert_eq!(offset.days, -2);
        let offset: Offset = serde_json::from_value(json!({ "days": " -1 " })).unwrap();
        assert_eq!(offset.days, -1);
        assert!(serde_json::from_value::<Offset>(json!({})).is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2031-02-28"), NaiveDate::from_ymd_opt(2031, 2, 28));
        assert_eq!(parse_date("2031-02-30"), None);
        assert_eq!(parse_date("28/02/2031"), None);
    }
}
