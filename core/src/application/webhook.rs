// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Webhook Payloads
//!
//! Builds, serialises and signs outbound webhook requests and decides
//! whether a target URL may be called.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Pure payload construction plus the URL safety policy
//!
//! ## Signing
//!
//! Bodies are compact JSON with object keys sorted at every level. When the
//! form's signing secret is non-blank, `X-SUM-Webhook-Signature` carries
//! `sha256=<hex HMAC-SHA256(secret, body)>`; otherwise no signature header is
//! sent.

use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use url::{Host, Url};

use crate::domain::delivery::WebhookRequest;
use crate::domain::form::FormDefinition;
use crate::domain::lead::{FormData, Lead};
use crate::domain::site::Site;

pub const SIGNATURE_HEADER: &str = "X-SUM-Webhook-Signature";
pub const FORM_SUBMITTED_EVENT: &str = "form.submitted";

/// Apply the allowlist (when non-empty) then the denylist. Deny wins.
pub fn filter_webhook_data(
    data: &FormData,
    allowlist: &BTreeSet<String>,
    denylist: &BTreeSet<String>,
) -> FormData {
    data.iter()
        .filter(|(key, _)| allowlist.is_empty() || allowlist.contains(*key))
        .filter(|(key, _)| !denylist.contains(*key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Envelope for a dynamic form submission.
pub fn build_form_webhook_payload(
    lead: &Lead,
    form: &FormDefinition,
    request_id: Option<&str>,
) -> Value {
    let data = filter_webhook_data(
        &lead.form_data,
        &form.webhook_allowlist(),
        &form.webhook_denylist(),
    );
    let submitted_at = lead.submitted_at.to_rfc3339();
    let mut payload = json!({
        "event": FORM_SUBMITTED_EVENT,
        "timestamp": submitted_at,
        "form": {
            "id": form.id.to_string(),
            "name": form.name,
            "slug": form.slug,
        },
        "submission": {
            "id": lead.id.to_string(),
            "contact": {
                "name": lead.name,
                "email": lead.email,
                "phone": lead.phone,
                "message": lead.message,
            },
            "data": Value::Object(data),
            "created_at": submitted_at,
        },
        "attribution": {
            "source_url": lead.attribution.page_url,
            "landing_page": lead.attribution.landing_page_url,
            "utm_source": lead.attribution.utm_source,
            "utm_medium": lead.attribution.utm_medium,
            "utm_campaign": lead.attribution.utm_campaign,
            "utm_term": lead.attribution.utm_term,
            "utm_content": lead.attribution.utm_content,
        },
    });
    if let (Some(request_id), Some(obj)) = (request_id, payload.as_object_mut()) {
        obj.insert("request_id".into(), Value::from(request_id));
    }
    payload
}

/// Flat lead payload for the global lead webhook.
pub fn build_lead_webhook_payload(lead: &Lead) -> Value {
    json!({
        "lead_id": lead.id.to_string(),
        "name": lead.name,
        "email": lead.email,
        "phone": lead.phone,
        "message": lead.message,
        "form_type": lead.form_type,
        "form_data": Value::Object(lead.form_data.clone()),
        "lead_source": lead.lead_source.as_str(),
        "utm_source": lead.attribution.utm_source,
        "utm_medium": lead.attribution.utm_medium,
        "utm_campaign": lead.attribution.utm_campaign,
        "page_url": lead.attribution.page_url,
        "submitted_at": lead.submitted_at.to_rfc3339(),
    })
}

/// Flat lead payload plus site context and full attribution, for Zapier.
pub fn build_zapier_payload(lead: &Lead, site: &Site) -> Value {
    let mut payload = build_lead_webhook_payload(lead);
    if let Some(obj) = payload.as_object_mut() {
        let a = &lead.attribution;
        for (key, value) in [
            ("site_hostname", site.hostname.as_str()),
            ("site_name", site.site_name.as_str()),
            ("utm_term", a.utm_term.as_str()),
            ("utm_content", a.utm_content.as_str()),
            ("landing_page_url", a.landing_page_url.as_str()),
            ("referrer_url", a.referrer_url.as_str()),
        ] {
            obj.insert(key.to_string(), Value::from(value));
        }
    }
    payload
}

/// Compact JSON with keys sorted recursively.
pub fn webhook_body(payload: &Value) -> String {
    sorted(payload).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

pub fn sign_body(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn webhook_headers(secret: &str, body: &str) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    let secret = secret.trim();
    if !secret.is_empty() {
        headers.push((
            SIGNATURE_HEADER.to_string(),
            format!("sha256={}", sign_body(secret, body)),
        ));
    }
    headers
}

/// Serialise and sign a payload for `url`.
pub fn signed_request(url: &str, payload: &Value, secret: &str) -> WebhookRequest {
    let body = webhook_body(payload);
    let headers = webhook_headers(secret, &body);
    WebhookRequest {
        url: url.to_string(),
        body,
        headers,
        resolved: Vec::new(),
    }
}

// ============================================================================
// URL safety
// ============================================================================

/// A webhook URL that passed [`validate_webhook_url`].
#[derive(Debug, Clone)]
pub struct VettedUrl {
    pub url: Url,
    /// Addresses the host resolved to during the check. Empty for IP
    /// literals and when private hosts are allowed.
    pub addrs: Vec<SocketAddr>,
}

/// Reject URLs that could reach internal services.
///
/// With `allow_private` the host checks are skipped; only the scheme and
/// host presence are enforced.
pub async fn validate_webhook_url(raw: &str, allow_private: bool) -> Result<VettedUrl, String> {
    let url = Url::parse(raw.trim()).map_err(|_| "Webhook URL is invalid".to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err("Webhook URL must use http or https".to_string());
    }

    let host = match url.host() {
        Some(host) => host.to_owned(),
        None => return Err("Webhook URL host is missing".to_string()),
    };
    if allow_private {
        return Ok(VettedUrl {
            url,
            addrs: Vec::new(),
        });
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let (addresses, pinned) = match host {
        Host::Ipv4(ip) => (vec![IpAddr::V4(ip)], false),
        Host::Ipv6(ip) => (vec![IpAddr::V6(ip)], false),
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local") {
                return Err("Webhook URL host is not allowed".to_string());
            }
            let resolved: Vec<IpAddr> = match tokio::net::lookup_host((domain.as_str(), port)).await {
                Ok(addrs) => addrs.map(|a| a.ip()).collect(),
                Err(_) => Vec::new(),
            };
            (resolved, true)
        }
    };

    if addresses.is_empty() {
        return Err("Webhook URL host could not be resolved".to_string());
    }
    if addresses.iter().any(|ip| !is_public_ip(ip)) {
        return Err("Webhook URL resolves to a non-public IP".to_string());
    }

    let addrs = if pinned {
        addresses.into_iter().map(|ip| SocketAddr::new(ip, port)).collect()
    } else {
        Vec::new()
    };
    Ok(VettedUrl { url, addrs })
}

pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
        || ip.is_multicast()
        || a == 0
        // shared address space 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b == 18 || b == 19))
        // reserved 240.0.0.0/4
        || a >= 240
        // IETF protocol assignments 192.0.0.0/24
        || (a == 192 && b == 0 && ip.octets()[2] == 0))
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link local fe80::/10
        || (first & 0xffc0) == 0xfe80
        // documentation 2001:db8::/32
        || (first == 0x2001 && ip.segments()[1] == 0x0db8))
}
