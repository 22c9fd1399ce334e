use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use geovoice_core::Geocoder;
use geovoice_core::collaborators::GeocodeResult;
use geovoice_core::geo::{BoundingBox, LngLat};
use serde::Deserialize;
use tracing::instrument;

/// Place search against a Nominatim-compatible endpoint.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

/// One search hit. Nominatim sends numbers as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
    /// `[south, north, west, east]`.
    #[serde(default)]
    boundingbox: Option<[String; 4]>,
}

fn to_result(places: Vec<Place>) -> Result<GeocodeResult> {
    let Some(place) = places.into_iter().next() else {
        return Ok(GeocodeResult::not_found());
    };
    let lat: f64 = place.lat.parse().context("invalid latitude")?;
    let lng: f64 = place.lon.parse().context("invalid longitude")?;
    let bbox = match place.boundingbox {
        Some([south, north, west, east]) => Some(BoundingBox {
            west: west.parse().context("invalid bounding box")?,
            south: south.parse().context("invalid bounding box")?,
            east: east.parse().context("invalid bounding box")?,
            north: north.parse().context("invalid bounding box")?,
        }),
        None => None,
    };
    Ok(GeocodeResult {
        found: true,
        coordinates: Some(LngLat::new(lng, lat)),
        bbox,
        place_name: place.display_name,
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, place_name: &str) -> Result<GeocodeResult> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", place_name), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context("geocoder unreachable")?;
        let status = response.status();
        if !status.is_success() {
            bail!("geocoder returned {}", status);
        }
        let places: Vec<Place> = response.json().await.context("malformed geocoder response")?;
        to_result(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_first_hit_is_used() {
        let places: Vec<Place> = serde_json::from_str(
            r#"[{"lat":"48.8566","lon":"2.3522","display_name":"Paris, France",
                 "boundingbox":["48.8156","48.9021","2.2241","2.4699"]},
                {"lat":"33.66","lon":"-95.55","display_name":"Paris, Texas"}]"#,
        )
        .unwrap();
        let result = to_result(places).unwrap();
        assert!(result.found);
        assert_eq!(result.place_name.as_deref(), Some("Paris, France"));
        let center = result.coordinates.unwrap();
        assert_abs_diff_eq!(center.lng, 2.3522);
        assert_abs_diff_eq!(center.lat, 48.8566);
        let bbox = result.bbox.unwrap();
        assert_abs_diff_eq!(bbox.west, 2.2241);
        assert_abs_diff_eq!(bbox.north, 48.9021);
    }

    #[test]
    fn test_no_hits_is_not_found() {
        let result = to_result(Vec::new()).unwrap();
        assert!(!result.found);
        assert!(result.coordinates.is_none());
    }

    #[test]
    fn test_garbage_coordinates_are_an_error() {
        let places: Vec<Place> = serde_json::from_str(r#"[{"lat":"north","lon":"2.0"}]"#).unwrap();
        assert!(to_result(places).is_err());
    }
}
