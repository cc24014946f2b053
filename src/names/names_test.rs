use super::*;

#[test]
fn test_full_names() {
    assert_eq!(local_host_full_name("fuchsia"), "fuchsia.local.");
    assert_eq!(local_service_full_name("_test._tcp."), "_test._tcp.local.");
    assert_eq!(
        local_instance_full_name("demo", "_test._tcp."),
        "demo._test._tcp.local."
    );
    assert_eq!(
        local_service_subtype_full_name("_test._tcp.", "_printer"),
        "_printer._sub._test._tcp.local."
    );
}

#[test]
fn test_extract_instance_name() {
    assert_eq!(
        extract_instance_name("demo._test._tcp.local.", "_test._tcp."),
        Some("demo".to_owned())
    );

    // Case differences don't matter.
    assert_eq!(
        extract_instance_name("demo._TEST._tcp.LOCAL.", "_test._tcp."),
        Some("demo".to_owned())
    );

    // Wrong service.
    assert_eq!(
        extract_instance_name("demo._other._tcp.local.", "_test._tcp."),
        None
    );

    // No instance label.
    assert_eq!(extract_instance_name("_test._tcp.local.", "_test._tcp."), None);
}

#[test]
fn test_match_service_name() {
    assert_eq!(
        match_service_name("_test._tcp.local.", "_test._tcp."),
        Some(String::new())
    );
    assert_eq!(
        match_service_name("_TEST._TCP.local.", "_test._tcp."),
        Some(String::new())
    );
    assert_eq!(
        match_service_name("_printer._sub._test._tcp.local.", "_test._tcp."),
        Some("_printer".to_owned())
    );
    assert_eq!(match_service_name("_other._tcp.local.", "_test._tcp."), None);
    assert_eq!(
        match_service_name("demo._test._tcp.local.", "_test._tcp."),
        None
    );
}

#[test]
fn test_host_name_validation() {
    assert!(is_valid_host_name("fuchsia"));
    assert!(is_valid_host_name("fuchsia2"));
    assert!(!is_valid_host_name(""));
    assert!(!is_valid_host_name("fuchsia.local"));
    assert!(!is_valid_host_name(&"x".repeat(64)));
}

#[test]
fn test_service_name_validation() {
    assert!(is_valid_service_name("_test._tcp."));
    assert!(is_valid_service_name("_music._udp."));
    assert!(!is_valid_service_name("_test._tcp"));
    assert!(!is_valid_service_name("test._tcp."));
    assert!(!is_valid_service_name("_test._xdp."));
    assert!(!is_valid_service_name("_._tcp."));
}

#[test]
fn test_instance_name_validation() {
    assert!(is_valid_instance_name("demo"));
    assert!(is_valid_instance_name("Living Room Printer"));
    assert!(!is_valid_instance_name(""));
    assert!(!is_valid_instance_name("a.b"));
}

#[test]
fn test_subtype_name_validation() {
    assert!(is_valid_subtype_name("_printer"));
    assert!(!is_valid_subtype_name("printer"));
    assert!(!is_valid_subtype_name("_"));
    assert!(!is_valid_subtype_name(""));
}
