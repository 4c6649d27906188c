//! Optional IP geolocation enrichment.
//!
//! Lookups go to an ip-api.com compatible endpoint with a short timeout.
//! Every failure mode (disabled, timeout, bad status, odd payload) yields
//! `None`; nothing here can affect packet processing.

use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::models::config::GeoConfig;
use crate::utils::error::AppResult;

/// Entries kept before the cache is flushed
const CACHE_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
}

/// Response body of the lookup service
#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    country: Option<String>,
    city: Option<String>,
    isp: Option<String>,
}

impl LookupResponse {
    fn into_info(self) -> Option<GeoInfo> {
        if self.status.as_deref() != Some("success") {
            return None;
        }
        Some(GeoInfo {
            lat: self.lat,
            lon: self.lon,
            country: self.country,
            city: self.city,
            isp: self.isp,
        })
    }
}

pub struct GeoLocator {
    endpoint: String,
    client: Option<reqwest::Client>,
    cache: DashMap<IpAddr, Option<GeoInfo>>,
}

impl GeoLocator {
    pub fn new(config: &GeoConfig) -> AppResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client: Some(client),
            cache: DashMap::new(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            endpoint: String::new(),
            client: None,
            cache: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Look up an address; `None` when disabled or on any failure
    pub async fn lookup(&self, ip: IpAddr) -> Option<GeoInfo> {
        let client = self.client.as_ref()?;

        if let Some(cached) = self.cache.get(&ip) {
            return cached.clone();
        }

        match self.fetch(client, ip).await {
            Ok(info) => {
                if self.cache.len() >= CACHE_LIMIT {
                    self.cache.clear();
                }
                self.cache.insert(ip, info.clone());
                info
            }
            Err(e) => {
                debug!("Geolocation lookup for {} failed: {}", ip, e);
                None
            }
        }
    }

    async fn fetch(&self, client: &reqwest::Client, ip: IpAddr) -> AppResult<Option<GeoInfo>> {
        let response = client.get(format!("{}{}", self.endpoint, ip)).send().await?;
        if !response.status().is_success() {
            debug!("Geolocation service answered {} for {}", response.status(), ip);
            return Ok(None);
        }
        let body: LookupResponse = response.json().await?;
        Ok(body.into_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload() {
        let body: LookupResponse = serde_json::from_str(
            r#"{"status":"success","country":"Germany","city":"Berlin","lat":52.52,"lon":13.4,"isp":"Example GmbH","query":"203.0.113.1"}"#,
        )
        .unwrap();
        let info = body.into_info().unwrap();
        assert_eq!(info.city.as_deref(), Some("Berlin"));
        assert_eq!(info.lat, Some(52.52));
    }

    #[test]
    fn test_failure_payload() {
        let body: LookupResponse =
            serde_json::from_str(r#"{"status":"fail","message":"private range","query":"10.0.0.1"}"#).unwrap();
        assert!(body.into_info().is_none());
    }

    #[actix_rt::test]
    async fn test_disabled_lookup_returns_none() {
        let locator = GeoLocator::new(&GeoConfig::default()).unwrap();
        assert!(!locator.is_enabled());
        assert!(locator.lookup("8.8.8.8".parse().unwrap()).await.is_none());
    }

    #[actix_rt::test]
    async fn test_unreachable_endpoint_returns_none() {
        let config = GeoConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:9/json/".to_string(),
            timeout_secs: 1,
        };
        let locator = GeoLocator::new(&config).unwrap();
        assert!(locator.lookup("8.8.8.8".parse().unwrap()).await.is_none());
    }
}
