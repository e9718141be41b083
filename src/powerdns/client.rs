use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::error::DnsApiError;
use crate::powerdns::types::*;
use crate::powerdns::DnsApi;
use crate::sync::record::{canonical_name, DnsRecordState, RecordType};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct PowerDnsClient {
    http: Client,
    name: String,      // operator-facing server name
    base_url: String,  // e.g. "http://127.0.0.1:8081/api/v1"
    api_key: String,
    server_id: String, // usually "localhost"
}

impl PowerDnsClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            server_id: server_id.into(),
        }
    }

    fn auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("X-API-Key", &self.api_key)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/servers/{}/{}",
            self.base_url,
            self.server_id,
            path.trim_start_matches('/')
        )
    }

    /// Map a non-success response onto the error taxonomy.
    async fn check(
        &self,
        res: reqwest::Response,
        what: &str,
        zone_name: &str,
    ) -> Result<reqwest::Response, DnsApiError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PdnsError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DnsApiError::Transport(format!(
                "PowerDNS {what} on {} refused credentials ({status})",
                self.name
            )),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                DnsApiError::Transport(format!("PowerDNS {what} on {} unavailable ({status})", self.name))
            }
            StatusCode::NOT_FOUND => DnsApiError::ZoneMissing(zone_name.to_string()),
            _ => DnsApiError::Rejected {
                status: status.as_u16(),
                message: format!("PowerDNS {what} failed: {message}"),
            },
        })
    }

    pub async fn get_zone(&self, name: &str) -> Result<PdnsZone, DnsApiError> {
        let url = self.url(&format!("zones/{}", name));
        let res = self.auth_header(self.http.get(url)).send().await?;
        let res = self.check(res, "get_zone", name).await?;
        Ok(res.json::<PdnsZone>().await?)
    }

    pub async fn patch_rrsets(&self, zone_name: &str, rrsets: &[PdnsRrset]) -> Result<(), DnsApiError> {
        #[derive(Serialize)]
        struct PatchBody<'a> {
            rrsets: &'a [PdnsRrset],
        }

        let url = self.url(&format!("zones/{}", zone_name));
        let body = PatchBody { rrsets };
        let res = self
            .auth_header(self.http.patch(url))
            .json(&body)
            .send()
            .await?;
        self.check(res, "patch_rrsets", zone_name).await?;
        Ok(())
    }
}

fn record_content(record: &DnsRecordState) -> String {
    match record.rtype {
        RecordType::Ptr => canonical_name(&record.value),
        _ => record.value.trim().to_string(),
    }
}

#[async_trait]
impl DnsApi for PowerDnsClient {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecordState>, DnsApiError> {
        let pdns_zone = self.get_zone(zone).await?;
        let mut records = Vec::new();
        for rrset in pdns_zone.rrsets.unwrap_or_default() {
            let Ok(rtype) = rrset.rrtype.parse::<RecordType>() else {
                debug!("skipping record {} because of type {}", rrset.name, rrset.rrtype);
                continue;
            };
            let comments: Vec<String> = rrset.comments.iter().map(|c| c.content.clone()).collect();
            for rec in &rrset.records {
                records.push(DnsRecordState {
                    comments: comments.clone(),
                    ..DnsRecordState::new(
                        zone,
                        self.name.as_str(),
                        rrset.name.as_str(),
                        rtype,
                        rec.content.as_str(),
                        rrset.ttl.unwrap_or_default(),
                    )
                });
            }
        }
        Ok(records)
    }

    async fn upsert_record(&self, zone: &str, record: &DnsRecordState) -> Result<(), DnsApiError> {
        let rrset = PdnsRrset {
            name: canonical_name(&record.name),
            rrtype: record.rtype.to_string(),
            ttl: Some(record.ttl),
            changetype: Some("REPLACE".into()),
            records: vec![PdnsRecord {
                content: record_content(record),
                disabled: false,
            }],
            comments: record
                .comments
                .iter()
                .map(|c| PdnsComment {
                    content: c.clone(),
                    account: String::new(),
                    modified_at: None,
                })
                .collect(),
        };
        self.patch_rrsets(zone, &[rrset]).await
    }

    async fn delete_record(&self, zone: &str, record: &DnsRecordState) -> Result<(), DnsApiError> {
        let rrset = PdnsRrset {
            name: canonical_name(&record.name),
            rrtype: record.rtype.to_string(),
            ttl: None,
            changetype: Some("DELETE".into()),
            records: Vec::new(),
            comments: Vec::new(),
        };
        self.patch_rrsets(zone, &[rrset]).await
    }
}
