//! Config merger.
//!
//! Concatenates the configuration that applies to one resolved request in
//! specificity order: claim, claim class, request, request class. Entries
//! are tagged with the scope they came from; class entries count as
//! admin-supplied. Payloads are never merged or deduplicated.

use dra_api::{ConfigScope, Configuration, DeviceClass, DriverConfiguration, RequestDetail};

fn tag<'a>(scope: ConfigScope, entries: impl IntoIterator<Item = &'a Configuration>) -> Vec<DriverConfiguration> {
    entries
        .into_iter()
        .map(|entry| DriverConfiguration {
            source: scope.source(),
            scope,
            driver_name: entry.driver_name().to_string(),
            parameters: entry.parameters().clone(),
        })
        .collect()
}

/// Merged configuration for one request, most specific first.
///
/// The claim class contributes both its claim-level and request-level
/// entries. A class referenced only by the request contributes its
/// request-level entries.
pub fn merge_config(
    claim_config: &[Configuration],
    claim_class: Option<&DeviceClass>,
    detail: &RequestDetail,
    request_class: Option<&DeviceClass>,
) -> Vec<DriverConfiguration> {
    let mut merged = tag(ConfigScope::Claim, claim_config);
    if let Some(class) = claim_class {
        merged.extend(tag(
            ConfigScope::ClaimClass,
            class.claim.config.iter().chain(&class.request.config),
        ));
    }
    merged.extend(tag(ConfigScope::Request, &detail.config));
    if let Some(class) = request_class {
        merged.extend(tag(ConfigScope::RequestClass, &class.request.config));
    }
    merged
}
