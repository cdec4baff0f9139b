// 🌐 Upstream sources - live registry and social insurance lookups
//
// A source makes exactly one attempt per call and honours the timeout it is
// given. Retrying and falling back are the providers' job.

use crate::error::UpstreamUnavailable;
use crate::identifier::TaxIdentifier;
use crate::source::{EnterpriseRecord, InsurancePayload, InsuranceRecordSet};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("mst-integration/", env!("CARGO_PKG_VERSION"));

pub trait EnterpriseSource: Send + Sync {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration)
        -> Result<EnterpriseRecord, UpstreamUnavailable>;
}

pub trait InsuranceSource: Send + Sync {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration)
        -> Result<InsuranceRecordSet, UpstreamUnavailable>;
}

// ============================================================================
// HTTP SOURCES
// ============================================================================

/// Commercial registry: GET {base_url}/api/company/{mst}
pub struct HttpEnterpriseSource {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl HttpEnterpriseSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(HttpEnterpriseSource {
            http: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, id: &TaxIdentifier) -> String {
        format!("{}/api/company/{}", self.base_url, id)
    }
}

impl EnterpriseSource for HttpEnterpriseSource {
    fn fetch(
        &self,
        id: &TaxIdentifier,
        timeout: Duration,
    ) -> Result<EnterpriseRecord, UpstreamUnavailable> {
        get_json(&self.http, &self.url_for(id), timeout)
    }
}

/// Social insurance: GET {base_url}/api/employers/{mst}/insurance
pub struct HttpInsuranceSource {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl HttpInsuranceSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(HttpInsuranceSource {
            http: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, id: &TaxIdentifier) -> String {
        format!("{}/api/employers/{}/insurance", self.base_url, id)
    }
}

impl InsuranceSource for HttpInsuranceSource {
    fn fetch(
        &self,
        id: &TaxIdentifier,
        timeout: Duration,
    ) -> Result<InsuranceRecordSet, UpstreamUnavailable> {
        let payload: InsurancePayload = get_json(&self.http, &self.url_for(id), timeout)?;
        Ok(InsuranceRecordSet::from_payload(
            payload,
            Utc::now().date_naive(),
        ))
    }
}

fn build_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

fn get_json<T: DeserializeOwned>(
    http: &reqwest::blocking::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, UpstreamUnavailable> {
    let response = http.get(url).timeout(timeout).send().map_err(|e| {
        if e.is_timeout() {
            UpstreamUnavailable::Timeout(timeout)
        } else {
            UpstreamUnavailable::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamUnavailable::Status(status.as_u16()));
    }

    response.json::<T>().map_err(|e| {
        if e.is_timeout() {
            UpstreamUnavailable::Timeout(timeout)
        } else {
            UpstreamUnavailable::Malformed(e.to_string())
        }
    })
}

// ============================================================================
// OFFLINE SOURCE
// ============================================================================

/// Live access switched off. Fails immediately without retrying, so the
/// providers go straight to synthetic data.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSource;

impl EnterpriseSource for OfflineSource {
    fn fetch(&self, _: &TaxIdentifier, _: Duration) -> Result<EnterpriseRecord, UpstreamUnavailable> {
        Err(UpstreamUnavailable::Disabled)
    }
}

impl InsuranceSource for OfflineSource {
    fn fetch(&self, _: &TaxIdentifier, _: Duration) -> Result<InsuranceRecordSet, UpstreamUnavailable> {
        Err(UpstreamUnavailable::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_follow_upstream_layout() {
        let id = TaxIdentifier::parse("0101234567").unwrap();

        let enterprise = HttpEnterpriseSource::new("https://thongtindoanhnghiep.co/").unwrap();
        assert_eq!(
            enterprise.url_for(&id),
            "https://thongtindoanhnghiep.co/api/company/0101234567"
        );

        let insurance = HttpInsuranceSource::new("http://vssapp.teca.vn:8088").unwrap();
        assert_eq!(
            insurance.url_for(&id),
            "http://vssapp.teca.vn:8088/api/employers/0101234567/insurance"
        );
    }

    #[test]
    fn test_offline_source_is_not_retryable() {
        let id = TaxIdentifier::parse("0101234567").unwrap();
        let err = EnterpriseSource::fetch(&OfflineSource, &id, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, UpstreamUnavailable::Disabled);
        assert!(!err.is_retryable());
    }
}
