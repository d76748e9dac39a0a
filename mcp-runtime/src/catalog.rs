use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use beacon_core::error::FetchError;

use crate::client::ApiClient;

/// A tracked brand domain (workspace) in the Beacon account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: String,
    pub name: String,
}

/// A topic under a domain, tagged with its parent for flat listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub domain_name: String,
}

/// Id pair resolved from a `"Domain > Topic"` display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogKey {
    pub domain_id: String,
    pub topic_id: String,
}

/// Per-domain topic-fetch outcome, kept so partial failures stay visible
/// instead of being silently skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainOutcome {
    pub domain_id: String,
    pub domain_name: String,
    /// Number of topics contributed, or the failure reason.
    pub outcome: Result<usize, String>,
}

/// The flattened two-level catalog plus a name-based lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub domains: Vec<Domain>,
    pub topics: Vec<Topic>,
    pub name_index: BTreeMap<String, CatalogKey>,
    pub outcomes: Vec<DomainOutcome>,
}

impl Catalog {
    /// Tool-facing payload: flat lists, the name index, and a summary.
    /// Failed domains are listed separately so the caller can tell a small
    /// catalog from a partially resolved one.
    pub fn to_payload(&self) -> Value {
        let failures: Vec<Value> = self
            .outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.outcome.as_ref().err().map(|reason| {
                    serde_json::json!({
                        "domainId": outcome.domain_id,
                        "domainName": outcome.domain_name,
                        "reason": reason,
                    })
                })
            })
            .collect();

        serde_json::json!({
            "domains": self.domains,
            "topics": self.topics,
            "mapping": self.name_index,
            "summary": {
                "totalDomains": self.domains.len(),
                "totalTopics": self.topics.len(),
            },
            "domainFailures": failures,
        })
    }
}

/// Walk the domain → topic hierarchy. The `/domains` fetch is fatal; a
/// single domain's topic fetch failing only excludes that domain's topics.
pub async fn resolve_catalog(client: &ApiClient) -> Result<Catalog, FetchError> {
    let payload = client.get("/domains", &[]).await?;
    let domains = parse_domains(&payload);

    let mut per_domain = Vec::with_capacity(domains.len());
    for domain in &domains {
        let result = client
            .get(&format!("/domains/{}/topics", domain.id), &[])
            .await;
        if let Err(err) = &result {
            warn!(domain_id = %domain.id, error = %err, "skipping domain: topic fetch failed");
        }
        per_domain.push((domain.clone(), result));
    }

    Ok(build_catalog(domains, per_domain))
}

/// Pure assembly step, separated from I/O so partial-failure composition is
/// directly testable.
pub fn build_catalog(
    domains: Vec<Domain>,
    per_domain: Vec<(Domain, Result<Value, FetchError>)>,
) -> Catalog {
    let mut topics = Vec::new();
    let mut name_index = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(per_domain.len());

    for (domain, result) in per_domain {
        match result {
            Ok(payload) => {
                let parsed = parse_topics(&payload, &domain);
                outcomes.push(DomainOutcome {
                    domain_id: domain.id,
                    domain_name: domain.name,
                    outcome: Ok(parsed.len()),
                });
                for topic in parsed {
                    name_index.insert(
                        format!("{} > {}", topic.domain_name, topic.name),
                        CatalogKey {
                            domain_id: topic.domain_id.clone(),
                            topic_id: topic.id.clone(),
                        },
                    );
                    topics.push(topic);
                }
            }
            Err(err) => outcomes.push(DomainOutcome {
                domain_id: domain.id,
                domain_name: domain.name,
                outcome: Err(err.to_string()),
            }),
        }
    }

    Catalog {
        domains,
        topics,
        name_index,
        outcomes,
    }
}

pub fn parse_domains(payload: &Value) -> Vec<Domain> {
    list_entries(payload, "domains")
        .iter()
        .filter_map(|entry| {
            Some(Domain {
                id: entry_id(entry)?,
                name: display_name(entry),
            })
        })
        .collect()
}

fn parse_topics(payload: &Value, domain: &Domain) -> Vec<Topic> {
    list_entries(payload, "topics")
        .iter()
        .filter_map(|entry| {
            Some(Topic {
                id: entry_id(entry)?,
                name: display_name(entry),
                domain_id: domain.id.clone(),
                domain_name: domain.name.clone(),
            })
        })
        .collect()
}

fn list_entries<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .as_array()
        .or_else(|| payload.get(key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn entry_id(entry: &Value) -> Option<String> {
    match entry.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

/// Human display name preferred over the internal identifier.
fn display_name(entry: &Value) -> String {
    entry
        .get("displayName")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use beacon_core::error::FetchError;
    use serde_json::json;

    use super::{Domain, build_catalog, parse_domains};

    fn domain(id: &str, name: &str) -> Domain {
        Domain {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn parse_domains_prefers_display_name() {
        let domains = parse_domains(&json!([
            { "id": "d1", "name": "internal-acme", "displayName": "Acme" },
            { "id": "d2", "name": "beta.com" },
            { "name": "no-id-entry" }
        ]));
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].name, "Acme");
        assert_eq!(domains[1].name, "beta.com");
    }

    #[test]
    fn one_failed_domain_still_yields_the_other_topics() {
        let domains = vec![domain("d1", "Acme"), domain("d2", "Beta"), domain("d3", "Gamma")];
        let per_domain = vec![
            (
                domains[0].clone(),
                Ok(json!([{ "id": "t1", "displayName": "CRM" }])),
            ),
            (
                domains[1].clone(),
                Err(FetchError::Upstream {
                    status: 500,
                    body: "boom".into(),
                }),
            ),
            (
                domains[2].clone(),
                Ok(json!([
                    { "id": "t2", "displayName": "Billing" },
                    { "id": "t3", "displayName": "Support" }
                ])),
            ),
        ];

        let catalog = build_catalog(domains, per_domain);
        assert_eq!(catalog.topics.len(), 3);
        assert_eq!(catalog.outcomes.len(), 3);
        assert!(catalog.outcomes[1].outcome.is_err());
        assert_eq!(catalog.outcomes[0].outcome, Ok(1));
        assert_eq!(catalog.outcomes[2].outcome, Ok(2));
    }

    #[test]
    fn name_index_maps_joined_display_names_to_id_pairs() {
        let domains = vec![domain("d1", "Acme")];
        let per_domain = vec![(
            domains[0].clone(),
            Ok(json!([{ "id": "t1", "displayName": "CRM" }])),
        )];
        let catalog = build_catalog(domains, per_domain);
        let key = catalog.name_index.get("Acme > CRM").unwrap();
        assert_eq!(key.domain_id, "d1");
        assert_eq!(key.topic_id, "t1");
    }

    #[test]
    fn payload_reports_failures_and_summary_counts() {
        let domains = vec![domain("d1", "Acme"), domain("d2", "Beta")];
        let per_domain = vec![
            (
                domains[0].clone(),
                Ok(json!([{ "id": "t1", "name": "CRM" }])),
            ),
            (
                domains[1].clone(),
                Err(FetchError::Transport("connection refused".into())),
            ),
        ];
        let payload = build_catalog(domains, per_domain).to_payload();
        assert_eq!(payload["summary"]["totalDomains"], 2);
        assert_eq!(payload["summary"]["totalTopics"], 1);
        assert_eq!(payload["domainFailures"].as_array().unwrap().len(), 1);
        assert_eq!(payload["domainFailures"][0]["domainId"], "d2");
    }
}
