//! Claim-wide constraint checker.
//!
//! Runs over every device allocated for a claim, after all requests are
//! resolved. A `match` constraint requires one attribute to hold the same
//! value on all of them.

use dra_api::{AttributeValue, Constraint, Device, DeviceId};

use crate::config::MissingAttributePolicy;

/// A failed match constraint: the distinct values seen, in device order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub attribute: String,
    pub values: Vec<String>,
}

/// Value of `name` on each device, for comparison.
///
/// Present values are kept as they are, whatever their type. Devices lacking
/// the attribute read as the zero value of the type found on the first
/// device that has it. `None` for every device when no device has it.
pub fn typed_values(devices: &[&Device], name: &str) -> Vec<Option<AttributeValue>> {
    let Some(ty) = devices
        .iter()
        .find_map(|d| d.attribute(name).map(AttributeValue::attribute_type))
    else {
        return vec![None; devices.len()];
    };
    devices
        .iter()
        .map(|d| Some(d.attribute(name).cloned().unwrap_or_else(|| ty.zero_value())))
        .collect()
}

/// Check every constraint. Duplicate devices (admin requests may share one)
/// are compared once.
pub fn check_constraints(
    devices: &[&Device],
    constraints: &[Constraint],
    policy: MissingAttributePolicy,
) -> Result<(), ConstraintViolation> {
    let mut seen: Vec<DeviceId> = Vec::with_capacity(devices.len());
    let mut unique: Vec<&Device> = Vec::with_capacity(devices.len());
    for &device in devices {
        let id = device.id();
        if !seen.contains(&id) {
            seen.push(id);
            unique.push(device);
        }
    }

    for constraint in constraints {
        let Constraint::Match(model) = constraint;
        check_match(&unique, model.attribute_name().as_str(), policy)?;
    }
    Ok(())
}

fn check_match(devices: &[&Device], name: &str, policy: MissingAttributePolicy) -> Result<(), ConstraintViolation> {
    let values: Vec<Option<AttributeValue>> = match policy {
        MissingAttributePolicy::DefaultValue => typed_values(devices, name),
        MissingAttributePolicy::Ignore => devices
            .iter()
            .filter_map(|d| d.attribute(name).cloned())
            .map(Some)
            .collect(),
        MissingAttributePolicy::Require => devices.iter().map(|d| d.attribute(name).cloned()).collect(),
    };

    let mut distinct: Vec<&Option<AttributeValue>> = Vec::new();
    for value in &values {
        if !distinct.contains(&value) {
            distinct.push(value);
        }
    }

    let missing = policy == MissingAttributePolicy::Require && values.iter().any(Option::is_none);
    if distinct.len() <= 1 && !missing {
        return Ok(());
    }
    Err(ConstraintViolation {
        attribute: name.to_string(),
        values: distinct
            .iter()
            .map(|v| match v {
                Some(value) => value.to_string(),
                None => "<missing>".to_string(),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "model.example.com";

    fn device(name: &str, model: Option<&str>) -> Device {
        let device = Device::new("gpu.example.com", name);
        match model {
            Some(m) => device.with_attribute(MODEL, m),
            None => device,
        }
    }

    fn model_constraint() -> Vec<Constraint> {
        vec![Constraint::match_attribute(MODEL).unwrap()]
    }

    #[test]
    fn test_agreeing_devices_pass() {
        let a = device("a", Some("f100"));
        let b = device("b", Some("f100"));
        assert!(check_constraints(&[&a, &b], &model_constraint(), MissingAttributePolicy::DefaultValue).is_ok());
    }

    #[test]
    fn test_disagreeing_devices_fail() {
        let a = device("a", Some("f100"));
        let b = device("b", Some("f200"));
        let c = device("c", Some("f100"));
        let violation =
            check_constraints(&[&a, &b, &c], &model_constraint(), MissingAttributePolicy::DefaultValue).unwrap_err();
        assert_eq!(violation.attribute, MODEL);
        assert_eq!(violation.values.len(), 2);
    }

    #[test]
    fn test_missing_attribute_policies() {
        let a = device("a", Some("f100"));
        let bare1 = device("b", None);
        let bare2 = device("c", None);

        // Both lacking: vacuously equal.
        assert!(check_constraints(&[&bare1, &bare2], &model_constraint(), MissingAttributePolicy::DefaultValue).is_ok());
        // One lacking reads as "" and differs.
        assert!(check_constraints(&[&a, &bare1], &model_constraint(), MissingAttributePolicy::DefaultValue).is_err());

        assert!(check_constraints(&[&a, &bare1], &model_constraint(), MissingAttributePolicy::Ignore).is_ok());
        assert!(check_constraints(&[&bare1, &bare2], &model_constraint(), MissingAttributePolicy::Ignore).is_ok());

        let violation =
            check_constraints(&[&bare1, &bare2], &model_constraint(), MissingAttributePolicy::Require).unwrap_err();
        assert_eq!(violation.values, vec!["<missing>"]);
    }

    #[test]
    fn test_values_of_different_types_disagree() {
        let zero = Device::new("gpu.example.com", "a").with_attribute(MODEL, 0i64);
        let named = device("b", Some("f100"));
        for policy in [
            MissingAttributePolicy::DefaultValue,
            MissingAttributePolicy::Ignore,
            MissingAttributePolicy::Require,
        ] {
            for devices in [[&zero, &named], [&named, &zero]] {
                let violation = check_constraints(&devices, &model_constraint(), policy).unwrap_err();
                assert_eq!(violation.values.len(), 2, "{policy:?}");
            }
        }
    }

    #[test]
    fn test_duplicates_and_empty_sets() {
        let a = device("a", Some("f100"));
        assert!(check_constraints(&[&a, &a], &model_constraint(), MissingAttributePolicy::Require).is_ok());
        assert!(check_constraints(&[], &model_constraint(), MissingAttributePolicy::Require).is_ok());
        assert!(check_constraints(&[&a], &[], MissingAttributePolicy::DefaultValue).is_ok());
    }

    #[test]
    fn test_typed_values_fill_only_absent_attributes() {
        let a = Device::new("x", "a").with_attribute("numa.example.com", 1i64);
        let b = Device::new("x", "b").with_attribute("numa.example.com", "one");
        let c = Device::new("x", "c");
        assert_eq!(
            typed_values(&[&a, &b, &c], "numa.example.com"),
            vec![
                Some(AttributeValue::Int(1)),
                Some(AttributeValue::String("one".to_string())),
                Some(AttributeValue::Int(0))
            ]
        );
        assert_eq!(typed_values(&[&c], "numa.example.com"), vec![None]);
    }
}
