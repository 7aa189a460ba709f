use dra_api::{
    decode_documents, ApiError, AttributeType, AttributeValue, DecodedObject, FieldErrorKind, KindRegistry,
    Quantity, API_GROUP,
};

const GPU_CLAIM: &str = include_str!("testdata/gpu-claim.yaml");

fn decode(text: &str) -> Vec<DecodedObject> {
    decode_documents(&KindRegistry::standard(), text)
        .unwrap()
        .into_iter()
        .map(|d| d.object)
        .collect()
}

fn invalid_paths(text: &str) -> Vec<String> {
    match decode_documents(&KindRegistry::standard(), text) {
        Err(ApiError::InvalidDocument { errors, .. }) => errors.iter().map(|e| e.path.to_string()).collect(),
        other => panic!("expected InvalidDocument, got {other:?}"),
    }
}

// ---- Multi-document stream ----

#[test]
fn fixture_decodes_registered_kinds_and_skips_others() {
    let docs = decode_documents(&KindRegistry::standard(), GPU_CLAIM).unwrap();
    let kinds: Vec<&str> = docs.iter().map(|d| d.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["DeviceClass", "ResourceSlice", "ResourceClaim", "ResourceClaimTemplate"]
    );
    // The Pod at index 2 is skipped but still counted.
    assert_eq!(docs[2].index, 3);
    assert_eq!(docs[0].api_version, format!("{API_GROUP}/v1alpha3"));
}

#[test]
fn device_class_fields() {
    let docs = decode(GPU_CLAIM);
    let DecodedObject::DeviceClass(class) = &docs[0] else {
        panic!("expected a device class");
    };
    assert_eq!(class.name, "example.com-foozer");
    assert!(class.suitable_nodes.is_some());
    let filter = class.request.requirements[0].device_filter();
    assert_eq!(filter.driver_name.as_deref(), Some("example.com-foozer"));
    assert_eq!(filter.selector, "device.type == 'gpu'");
}

#[test]
fn resource_slice_attributes_are_typed() {
    let docs = decode(GPU_CLAIM);
    let DecodedObject::ResourceSlice(devices) = &docs[1] else {
        panic!("expected a resource slice");
    };
    assert_eq!(devices.len(), 2);
    let gpu0 = &devices[0];
    assert_eq!(gpu0.driver_name, "example.com-foozer");
    assert_eq!(gpu0.device_type, "gpu");
    assert_eq!(
        gpu0.attribute("memory.foozer.example.com"),
        Some(&AttributeValue::Quantity(Quantity::parse("40Gi").unwrap()))
    );
    assert_eq!(
        gpu0.typed_attribute("firmware.foozer.example.com", AttributeType::Version),
        AttributeValue::Version(semver::Version::new(1, 4, 2))
    );
    assert_eq!(
        devices[1].typed_attribute("numa.foozer.example.com", AttributeType::Int),
        AttributeValue::Int(0)
    );
}

#[test]
fn claim_requests_and_alternatives() {
    let docs = decode(GPU_CLAIM);
    let DecodedObject::Claim(claim) = &docs[2] else {
        panic!("expected a claim");
    };
    assert_eq!(claim.name, "two-gpus");
    assert_eq!(claim.class.as_ref().map(|c| c.name()), Some("example.com-foozer"));
    assert_eq!(claim.config[0].driver_name(), "example.com-foozer");
    assert_eq!(claim.config[0].parameters()["sharing"], "time-slicing");
    assert_eq!(claim.constraints.len(), 1);

    assert_eq!(claim.requests.len(), 2);
    assert_eq!(claim.requests[0].alternatives()[0].count_bounds(), (1, Some(2)));
    let fallback = &claim.requests[1];
    assert!(fallback.is_one_of());
    assert!(fallback.alternatives()[0].is_admin());
    assert_eq!(fallback.alternatives()[1].count_bounds(), (0, Some(0)));
}

#[test]
fn claim_template_is_named_after_template() {
    let docs = decode(GPU_CLAIM);
    let DecodedObject::ClaimTemplate(claim) = &docs[3] else {
        panic!("expected a claim template");
    };
    assert_eq!(claim.name, "one-gpu");
    assert_eq!(claim.requests[0].name.as_deref(), Some("gpu"));
}

#[test]
fn custom_registry_only_decodes_what_it_knows() {
    let registry = KindRegistry::new().with_kind(API_GROUP, "ResourceSlice", dra_api::decode::decode_resource_slice);
    let docs = decode_documents(&registry, GPU_CLAIM).unwrap();
    assert_eq!(docs.len(), 1);
    assert!(matches!(docs[0].object, DecodedObject::ResourceSlice(_)));
}

// ---- Structural errors ----

#[test]
fn unqualified_match_attribute_is_rejected_with_path() {
    let text = r#"
apiVersion: resource.k8s.io/v1alpha3
kind: ResourceClaim
metadata: {name: c}
spec:
  constraints:
  - match: {attribute: numa}
  - match: {attribute: numa.dra.example.com}
  requests:
  - resourceClassName: gpu
"#;
    assert_eq!(invalid_paths(text), vec!["spec.constraints[0].match.attribute"]);
}

#[test]
fn every_error_in_a_document_is_reported() {
    let text = r#"
apiVersion: resource.k8s.io/v1alpha3
kind: ResourceClaim
metadata: {name: c}
spec:
  config:
  - {}
  requests:
  - name: a
  - name: b
    resourceClassName: gpu
    oneOf:
    - resourceClassName: gpu
  - oneOf:
    - count: {minimum: -1}
    - requirements:
      - {}
"#;
    let paths = invalid_paths(text);
    assert!(paths.contains(&"spec.config[0]".to_string()));
    assert!(paths.contains(&"spec.requests[0]".to_string()));
    assert!(paths.contains(&"spec.requests[1]".to_string()));
    assert!(paths.contains(&"spec.requests[2].oneOf[0].count".to_string()));
    assert!(paths.contains(&"spec.requests[2].oneOf[1].requirements[0]".to_string()));
}

#[test]
fn spec_ref_is_not_supported() {
    let text = r#"
apiVersion: resource.k8s.io/v1alpha3
kind: ResourceClaim
metadata: {name: c}
specRef: {name: shared}
"#;
    assert_eq!(invalid_paths(text), vec!["specRef"]);
}

#[test]
fn slice_attribute_errors() {
    let text = r#"
apiVersion: resource.k8s.io/v1alpha3
kind: ResourceSlice
spec:
  driverName: nic.example.com
  devices:
  - name: eth0
    attributes:
    - name: speed
      int: 100
    - name: firmware.nic.example.com
      version: not-a-version
    - name: mtu.nic.example.com
      int: 9000
      string: jumbo
  - name: eth0
"#;
    let err = decode_documents(&KindRegistry::standard(), text).unwrap_err();
    let ApiError::InvalidDocument { index, kind, errors } = err else {
        panic!("expected InvalidDocument");
    };
    assert_eq!(index, 0);
    assert_eq!(kind, "ResourceSlice");
    assert!(errors.has_path("spec.devices[0].attributes[0].name"));
    assert!(errors.has_path("spec.devices[0].attributes[1].version"));
    assert!(errors.has_path("spec.devices[0].attributes[2]"));
    assert!(errors.has_path("spec.devices[1].name"));
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, FieldErrorKind::NotQualified { ref name } if name == "speed")));
}

#[test]
fn malformed_yaml_is_a_yaml_error() {
    let err = decode_documents(&KindRegistry::standard(), "kind: [unterminated").unwrap_err();
    assert!(matches!(err, ApiError::Yaml(_)));
}
