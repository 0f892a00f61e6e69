use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;

/// A concrete postal address, either typed in at checkout or loaded from the
/// customer's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PostalAddress {
    #[validate(length(min = 1))]
    pub street: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 2))]
    pub country: String,
}

impl PostalAddress {
    /// Single-line rendering used for order snapshots and geocoding queries.
    pub fn formatted(&self) -> String {
        let mut line = self.street.clone();
        if let Some(unit) = &self.unit {
            line.push_str(", ");
            line.push_str(unit);
        }
        format!(
            "{}, {}, {} {}, {}",
            line, self.city, self.state, self.postal_code, self.country
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Forward/reverse geocoding against an external provider. Coordinates for
/// billing-relevant distance checks always come from here, never from the
/// client.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &PostalAddress) -> Result<Coordinates, ServiceError>;

    async fn reverse_geocode(&self, coords: &Coordinates) -> Result<PostalAddress, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    address: PostalAddress,
}

/// Geocoder backed by an HTTP provider.
pub struct HttpGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(base_url: String, user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent(user_agent)
                .build()
                .expect("reqwest client"),
            base_url,
        }
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, address: &PostalAddress) -> Result<Coordinates, ServiceError> {
        let url = format!("{}/geocode", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", address.formatted())])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("geocoding request: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "geocoding returned {}",
                response.status()
            )));
        }

        let hits: Vec<GeocodeResponse> = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("geocoding response: {e}")))?;

        let hit = hits.into_iter().next().ok_or_else(|| {
            ServiceError::DeliveryConflict("Delivery address could not be located".to_string())
        })?;

        Ok(Coordinates {
            latitude: hit.lat,
            longitude: hit.lon,
        })
    }

    async fn reverse_geocode(&self, coords: &Coordinates) -> Result<PostalAddress, ServiceError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("geocoding request: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "reverse geocoding returned {}",
                response.status()
            )));
        }

        let body: ReverseGeocodeResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("geocoding response: {e}")))?;

        Ok(body.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_joins_address_parts() {
        let address = PostalAddress {
            street: "500 Mission St".into(),
            unit: Some("Apt 2".into()),
            city: "San Francisco".into(),
            state: "CA".into(),
            postal_code: "94105".into(),
            country: "US".into(),
        };
        assert_eq!(
            address.formatted(),
            "500 Mission St, Apt 2, San Francisco, CA 94105, US"
        );
    }

    #[test]
    fn formatted_skips_missing_unit() {
        let address = PostalAddress {
            street: "1 Market St".into(),
            unit: None,
            city: "San Francisco".into(),
            state: "CA".into(),
            postal_code: "94103".into(),
            country: "US".into(),
        };
        assert_eq!(address.formatted(), "1 Market St, San Francisco, CA 94103, US");
    }
}
