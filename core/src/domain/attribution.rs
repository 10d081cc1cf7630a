// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lead Attribution
//!
//! Derives a lead's marketing source from its UTM parameters and referrer.
//! Configured [`LeadSourceRule`]s are consulted first in priority order; when
//! none match, the built-in defaults below apply.
//!
//! | Condition | Source |
//! |-----------|--------|
//! | `utm_source=google` + `utm_medium=cpc` | `google_ads` |
//! | `utm_source` in facebook/instagram/fb/ig + `cpc` | `meta_ads` |
//! | `utm_source=bing` + `utm_medium=cpc` | `bing_ads` |
//! | `utm_source` starts with `offline` | `offline` |
//! | no UTM, referrer contains `google.com` | `seo` |
//! | no UTM, no referrer | `direct` |
//! | no UTM, some referrer | `referral` |
//! | anything else | `unknown` |

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    GoogleAds,
    MetaAds,
    BingAds,
    Seo,
    Direct,
    Referral,
    Offline,
    #[default]
    Unknown,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::GoogleAds => "google_ads",
            LeadSource::MetaAds => "meta_ads",
            LeadSource::BingAds => "bing_ads",
            LeadSource::Seo => "seo",
            LeadSource::Direct => "direct",
            LeadSource::Referral => "referral",
            LeadSource::Offline => "offline",
            LeadSource::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LeadSource::GoogleAds => "Google Ads",
            LeadSource::MetaAds => "Meta Ads",
            LeadSource::BingAds => "Bing Ads",
            LeadSource::Seo => "SEO",
            LeadSource::Direct => "Direct",
            LeadSource::Referral => "Referral",
            LeadSource::Offline => "Offline",
            LeadSource::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "google_ads" => LeadSource::GoogleAds,
            "meta_ads" => LeadSource::MetaAds,
            "bing_ads" => LeadSource::BingAds,
            "seo" => LeadSource::Seo,
            "direct" => LeadSource::Direct,
            "referral" => LeadSource::Referral,
            "offline" => LeadSource::Offline,
            "unknown" => LeadSource::Unknown,
            _ => return None,
        })
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-defined attribution override.
///
/// Empty conditions are ignored; a rule with no conditions never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSourceRule {
    #[serde(default)]
    pub id: i64,
    /// Lower runs first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub utm_source: String,
    #[serde(default)]
    pub utm_medium: String,
    #[serde(default)]
    pub referrer_contains: String,
    pub derived_source: LeadSource,
    #[serde(default)]
    pub derived_source_detail: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl LeadSourceRule {
    /// Inputs are expected already trimmed and lowercased.
    pub fn matches(&self, utm_source: &str, utm_medium: &str, referrer: &str) -> bool {
        let want_source = self.utm_source.trim().to_lowercase();
        let want_medium = self.utm_medium.trim().to_lowercase();
        let want_referrer = self.referrer_contains.trim().to_lowercase();

        if want_source.is_empty() && want_medium.is_empty() && want_referrer.is_empty() {
            return false;
        }
        if !want_source.is_empty() && want_source != utm_source {
            return false;
        }
        if !want_medium.is_empty() && want_medium != utm_medium {
            return false;
        }
        if !want_referrer.is_empty() && !referrer.contains(&want_referrer) {
            return false;
        }
        true
    }
}

/// Order rules the way they are evaluated: active only, by `(priority, id)`.
pub fn sort_rules(rules: &mut Vec<LeadSourceRule>) {
    rules.retain(|r| r.is_active);
    rules.sort_by_key(|r| (r.priority, r.id));
}

/// Resolve `(lead_source, lead_source_detail)` for a submission.
///
/// `rules` must already be filtered and ordered (see [`sort_rules`]).
pub fn derive_lead_source(
    utm_source: &str,
    utm_medium: &str,
    utm_campaign: &str,
    referrer_url: &str,
    rules: &[LeadSourceRule],
) -> (LeadSource, String) {
    let source = utm_source.trim().to_lowercase();
    let medium = utm_medium.trim().to_lowercase();
    let campaign = utm_campaign.trim();
    let referrer = referrer_url.trim().to_lowercase();

    if let Some(rule) = rules.iter().find(|r| r.matches(&source, &medium, &referrer)) {
        let mut parts = Vec::new();
        if !rule.derived_source_detail.is_empty() {
            parts.push(rule.derived_source_detail.clone());
        }
        if !campaign.is_empty() {
            parts.push(format!("campaign={campaign}"));
        }
        return (rule.derived_source, parts.join("; "));
    }

    default_lead_source(&source, &medium, campaign, &referrer)
}

fn default_lead_source(
    source: &str,
    medium: &str,
    campaign: &str,
    referrer: &str,
) -> (LeadSource, String) {
    let has_utm = !source.is_empty() || !medium.is_empty();
    let campaign_detail = if campaign.is_empty() {
        String::new()
    } else {
        format!("campaign={campaign}")
    };

    if source == "google" && medium == "cpc" {
        return (LeadSource::GoogleAds, campaign_detail);
    }
    if matches!(source, "facebook" | "instagram" | "fb" | "ig") && medium == "cpc" {
        return (LeadSource::MetaAds, campaign_detail);
    }
    if source == "bing" && medium == "cpc" {
        return (LeadSource::BingAds, campaign_detail);
    }
    if source.starts_with("offline") {
        return (LeadSource::Offline, campaign_detail);
    }
    if !has_utm && referrer.contains("google.com") {
        return (LeadSource::Seo, format!("referrer={referrer}"));
    }
    if !has_utm && referrer.is_empty() {
        return (LeadSource::Direct, String::new());
    }
    if !has_utm {
        return (LeadSource::Referral, format!("referrer={referrer}"));
    }

    let mut parts = Vec::new();
    if !source.is_empty() {
        parts.push(format!("utm_source={source}"));
    }
    if !medium.is_empty() {
        parts.push(format!("utm_medium={medium}"));
    }
    if !campaign.is_empty() {
        parts.push(format!("campaign={campaign}"));
    }
    (LeadSource::Unknown, parts.join("; "))
}
