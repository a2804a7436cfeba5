use log::warn;
use std::collections::HashMap;
use std::sync::Mutex;

/// Placeholder shown when a coordinate cannot be resolved to an address.
pub const UNKNOWN_ADDRESS: &str = "주소 미확인";

/// Reverse geocoding as an injectable capability: the listing handler only
/// depends on this trait, so a deployment can swap the network-backed
/// implementation for a cached or fixed one.
pub trait ReverseGeocoder: Send + Sync {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// Nominatim-backed geocoder with an in-memory address cache so repeated map
/// listings do not re-query the service for the same point.
pub struct NominatimGeocoder {
    url: String,
    user_agent: String,
    cache: Mutex<HashMap<String, String>>,
}

impl NominatimGeocoder {
    pub fn new(url: String, user_agent: String) -> Self {
        Self {
            url,
            user_agent,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(latitude: f64, longitude: f64) -> String {
        format!("{:.5}_{:.5}", latitude, longitude)
    }

    fn request(&self, latitude: f64, longitude: f64) -> Option<serde_json::Value> {
        let response = ureq::get(&self.url)
            .query("lat", &latitude.to_string())
            .query("lon", &longitude.to_string())
            .query("format", "jsonv2")
            .header("User-Agent", &self.user_agent)
            .call();

        match response {
            Ok(mut resp) => match resp.body_mut().read_json::<serde_json::Value>() {
                Ok(json) => Some(json),
                Err(e) => {
                    warn!("Failed to parse reverse geocoding response: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!(
                    "Reverse geocoding request failed for ({}, {}): {}",
                    latitude, longitude, e
                );
                None
            }
        }
    }
}

fn display_name_from(json: &serde_json::Value) -> Option<String> {
    json.get("display_name")?.as_str().map(str::to_string)
}

impl ReverseGeocoder for NominatimGeocoder {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String> {
        let key = Self::cache_key(latitude, longitude);

        if let Ok(cache) = self.cache.lock() {
            if let Some(address) = cache.get(&key) {
                return Some(address.clone());
            }
        }

        let address = self.request(latitude, longitude).and_then(|json| {
            display_name_from(&json)
        })?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, address.clone());
        }
        Some(address)
    }
}

/// Resolves every coordinate to the same address. Useful for tests and for
/// deployments that run without network access to the geocoding service.
pub struct FixedGeocoder(pub Option<String>);

impl ReverseGeocoder for FixedGeocoder {
    fn resolve(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        self.0.clone()
    }
}
