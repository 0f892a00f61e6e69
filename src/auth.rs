//! Request identity. Authentication mechanics (tokens, sessions) live at the
//! edge proxy; this service receives an already-authenticated user id and
//! role and enforces ownership on everything it touches.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Operator,
}

/// The authenticated caller, extracted from the identity headers.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }

    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing user identity".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| ServiceError::Unauthorized("Malformed user identity".to_string()))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing user role".to_string()))?;
        let role = role
            .parse::<Role>()
            .map_err(|_| ServiceError::Unauthorized(format!("Unknown role: {role}")))?;

        Ok(AuthUser { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_from_header_values() {
        assert_eq!("customer".parse::<Role>().unwrap(), Role::Customer);
        assert_eq!("operator".parse::<Role>().unwrap(), Role::Operator);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_displays_snake_case() {
        assert_eq!(Role::Customer.to_string(), "customer");
        assert_eq!(Role::Operator.to_string(), "operator");
    }
}
