//! Identity consumption for dashboard connections.
//!
//! Dashboard connections carry a bearer token, previously verified by the
//! edge (the identity provider is an external collaborator). The
//! core never verifies a signature; it only consumes the already-validated
//! claim set the edge attaches to the request. Here that's modeled as a
//! single JSON header (`X-Monti-Claims`) the edge is expected to set after
//! verification — a stand-in for whatever claims-propagation mechanism a
//! real deployment's reverse proxy uses.

use std::collections::HashSet;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::types::Location;

/// The set of locations a dashboard client is permitted to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedLocations {
    /// Administrators: every location, including ones added later.
    All,
    Set(HashSet<Location>),
}

impl AllowedLocations {
    pub fn contains(&self, loc: Location) -> bool {
        match self {
            AllowedLocations::All => true,
            AllowedLocations::Set(set) => set.contains(&loc),
        }
    }
}

/// Verified identity claims as handed to the core by the edge.
#[derive(Debug, Clone)]
pub struct Claims {
    pub principal: String,
    pub locations: AllowedLocations,
}

impl Claims {
    /// A permissive fallback used when no claims header is present —
    /// handy for local development and the admin HTTP surface, which
    /// isn't a dashboard session. Production deployments should reject
    /// connections lacking a claims header before they reach here; that
    /// policy lives at the edge, not in the core.
    pub fn anonymous_all() -> Self {
        Self {
            principal: "anonymous".to_string(),
            locations: AllowedLocations::All,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct RawClaims {
    principal: String,
    #[serde(default)]
    locations: Option<Vec<String>>,
    #[serde(default)]
    all_locations: bool,
}

/// Extract claims from the `X-Monti-Claims` header, falling back to
/// [`Claims::anonymous_all`] if absent or malformed (this is a monitoring
/// dashboard, not an auth boundary — the edge already gated access).
pub fn extract_claims(headers: &HeaderMap) -> Claims {
    let Some(raw) = headers.get("x-monti-claims").and_then(|v| v.to_str().ok()) else {
        return Claims::anonymous_all();
    };

    match serde_json::from_str::<RawClaims>(raw) {
        Ok(parsed) => {
            let locations = if parsed.all_locations {
                AllowedLocations::All
            } else {
                let set: HashSet<Location> = parsed
                    .locations
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|s| parse_location(s))
                    .collect();
                AllowedLocations::Set(set)
            };
            Claims {
                principal: parsed.principal,
                locations,
            }
        }
        Err(_) => Claims::anonymous_all(),
    }
}

fn parse_location(s: &str) -> Option<Location> {
    match s {
        "berlin" => Some(Location::Berlin),
        "munich" => Some(Location::Munich),
        "hamburg" => Some(Location::Hamburg),
        "frankfurt" => Some(Location::Frankfurt),
        "remote" => Some(Location::Remote),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_anonymous_all() {
        let headers = HeaderMap::new();
        let claims = extract_claims(&headers);
        assert_eq!(claims.locations, AllowedLocations::All);
    }

    #[test]
    fn scoped_claims_parse_locations() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-monti-claims",
            r#"{"principal":"alice","locations":["berlin","munich"]}"#
                .parse()
                .unwrap(),
        );
        let claims = extract_claims(&headers);
        match claims.locations {
            AllowedLocations::Set(set) => {
                assert!(set.contains(&Location::Berlin));
                assert!(set.contains(&Location::Munich));
                assert!(!set.contains(&Location::Hamburg));
            }
            AllowedLocations::All => panic!("expected scoped set"),
        }
    }
}
