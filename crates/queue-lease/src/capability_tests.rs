//! Tests for the capability table.

use super::*;

#[test]
fn test_operation_names_round_trip() {
    for op in Operation::ALL {
        assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
    }
}

#[test]
fn test_facade_aliases_translate() {
    assert_eq!("createQueue".parse::<Operation>().unwrap(), Operation::Create);
    assert_eq!("deleteQueue".parse::<Operation>().unwrap(), Operation::Delete);
}

#[test]
fn test_unknown_operation_is_rejected() {
    let err = "purge".parse::<Operation>().unwrap_err();
    assert!(matches!(err, ValidationError::InvalidFormat { .. }));
}

#[test]
fn test_all_capabilities_support_every_operation() {
    for op in Operation::ALL {
        assert!(Capabilities::ALL.supports(op), "{op} should be supported");
    }
}

#[test]
fn test_capability_map_lists_every_operation() {
    let caps = Capabilities {
        get_queues: false,
        ..Capabilities::ALL
    };
    let map = caps.to_map();

    assert_eq!(map.len(), Operation::ALL.len());
    assert_eq!(map.get("getQueues"), Some(&false));
    assert_eq!(map.get("deleteMessage"), Some(&true));
}
