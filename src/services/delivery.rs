use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{customer_address, food_truck};
use crate::errors::ServiceError;
use crate::services::geocoding::{Coordinates, Geocoder, PostalAddress};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(from: &Coordinates, to: &Coordinates) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Destination for a delivery order: a saved address book entry or an
/// address typed at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum DeliveryAddress {
    Saved { saved_address_id: Uuid },
    Inline(PostalAddress),
}

/// The resolver's verdict: a frozen address snapshot for the order row plus
/// the verified coordinates, which are used for the radius check only and
/// never persisted.
#[derive(Debug, Clone)]
pub struct DeliveryQuote {
    pub address: PostalAddress,
    pub snapshot: String,
    pub coordinates: Coordinates,
    pub distance_km: f64,
    pub fee: Decimal,
}

/// Resolves and verifies a delivery destination against a truck's delivery
/// settings.
#[derive(Clone)]
pub struct DeliveryResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl DeliveryResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    #[instrument(skip(self, conn, truck, request), fields(food_truck_id = %truck.id, customer_id = %customer_id))]
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        truck: &food_truck::Model,
        subtotal: Decimal,
        request: &DeliveryAddress,
    ) -> Result<DeliveryQuote, ServiceError> {
        if !truck.delivery_enabled {
            return Err(ServiceError::DeliveryConflict(format!(
                "'{}' does not offer delivery",
                truck.name
            )));
        }

        if subtotal < truck.delivery_minimum {
            return Err(ServiceError::DeliveryConflict(format!(
                "Order subtotal {} is below the delivery minimum of {}",
                subtotal, truck.delivery_minimum
            )));
        }

        let address = self.resolve_address(conn, customer_id, request).await?;

        // Coordinates always come from the geocoder; a client-supplied pair
        // could be forged to pass the radius check.
        let coordinates = self.geocoder.geocode(&address).await?;

        let truck_location = Coordinates {
            latitude: truck.latitude,
            longitude: truck.longitude,
        };
        let distance_km = haversine_km(&truck_location, &coordinates);

        if distance_km > truck.delivery_radius_km {
            return Err(ServiceError::DeliveryConflict(format!(
                "Destination is {distance_km:.1} km away; '{}' delivers within {:.1} km",
                truck.name, truck.delivery_radius_km
            )));
        }

        Ok(DeliveryQuote {
            snapshot: address.formatted(),
            address,
            coordinates,
            distance_km,
            fee: truck.delivery_fee,
        })
    }

    async fn resolve_address<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        request: &DeliveryAddress,
    ) -> Result<PostalAddress, ServiceError> {
        match request {
            DeliveryAddress::Saved { saved_address_id } => {
                let saved = customer_address::Entity::find_by_id(*saved_address_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Address {saved_address_id} not found"))
                    })?;

                if saved.customer_id != customer_id {
                    return Err(ServiceError::Forbidden(
                        "Address belongs to a different customer".to_string(),
                    ));
                }

                Ok(PostalAddress {
                    street: saved.street,
                    unit: saved.unit,
                    city: saved.city,
                    state: saved.state,
                    postal_code: saved.postal_code,
                    country: saved.country,
                })
            }
            DeliveryAddress::Inline(address) => {
                address.validate()?;
                Ok(address.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = Coordinates {
            latitude: 37.7749,
            longitude: -122.4194,
        };
        assert!(haversine_km(&p, &p) < 1e-9);
    }

    #[test]
    fn haversine_one_degree_longitude_at_equator() {
        let a = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        };
        let b = Coordinates {
            latitude: 0.0,
            longitude: 1.0,
        };
        let d = haversine_km(&a, &b);
        // One degree of arc on a 6371 km sphere is ~111.19 km.
        assert!((d - 111.19).abs() < 0.05, "got {d}");
    }

    #[test]
    fn haversine_sf_to_oakland() {
        let sf = Coordinates {
            latitude: 37.7749,
            longitude: -122.4194,
        };
        let oakland = Coordinates {
            latitude: 37.8044,
            longitude: -122.2712,
        };
        let d = haversine_km(&sf, &oakland);
        assert!((13.0..14.5).contains(&d), "got {d}");
    }

    #[test]
    fn delivery_address_deserializes_both_shapes() {
        let saved: DeliveryAddress =
            serde_json::from_value(serde_json::json!({"saved_address_id": Uuid::new_v4()}))
                .unwrap();
        assert!(matches!(saved, DeliveryAddress::Saved { .. }));

        let inline: DeliveryAddress = serde_json::from_value(serde_json::json!({
            "street": "1 Market St",
            "city": "San Francisco",
            "state": "CA",
            "postal_code": "94103",
            "country": "US"
        }))
        .unwrap();
        assert!(matches!(inline, DeliveryAddress::Inline(_)));
    }
}
