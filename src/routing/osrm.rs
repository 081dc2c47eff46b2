use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::RoutingError;
use crate::models::coordinate::Coordinate;
use crate::routing::{Route, RouteEngine};

/// Road routing against an OSRM `route/v1` endpoint.
pub struct OsrmEngine {
    client: Client,
    base_url: String,
    profile: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl OsrmEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: "driving".to_string(),
        })
    }

    pub fn request_url(&self, waypoints: &[Coordinate]) -> String {
        let coordinates = waypoints
            .iter()
            .map(|c| {
                let [lng, lat] = c.to_lng_lat();
                format!("{lng},{lat}")
            })
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson&steps=false",
            self.base_url, self.profile, coordinates
        )
    }
}

fn route_from_response(
    waypoints: &[Coordinate],
    response: OsrmResponse,
) -> Result<Route, RoutingError> {
    if response.code != "Ok" {
        return Err(RoutingError::Engine {
            code: response.code,
            message: response.message.unwrap_or_default(),
        });
    }

    let best = response.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
    let path = best
        .geometry
        .coordinates
        .into_iter()
        .map(Coordinate::from_lng_lat)
        .collect::<Result<Vec<_>, _>>()?;

    if path.len() < 2 {
        return Err(RoutingError::NoRoute);
    }

    Ok(Route {
        waypoints: waypoints.to_vec(),
        path,
        distance_km: best.distance / 1000.0,
        duration_s: Some(best.duration),
    })
}

#[async_trait]
impl RouteEngine for OsrmEngine {
    fn name(&self) -> &'static str {
        "osrm"
    }

    async fn route(&self, waypoints: &[Coordinate]) -> Result<Route, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::NotEnoughWaypoints(waypoints.len()));
        }

        let url = self.request_url(waypoints);
        debug!(url = %url, "requesting route");

        // OSRM reports failures such as NoRoute with a JSON body on non-2xx statuses.
        let response: OsrmResponse = self.client.get(&url).send().await?.json().await?;
        route_from_response(waypoints, response)
    }
}
