#[cfg(test)]
mod names_test;

use crate::error::*;

// Naming helpers for the local domain. Service names are handled in their
// dotted form ("_test._tcp.") and expand to full names under "local."
// ("_test._tcp.local."). All matching is ASCII case-insensitive, as DNS
// name comparison is.

pub const LOCAL_DOMAIN: &str = "local.";

// The reserved service-enumeration name (RFC 6763 section 9). A PTR query
// for this name asks every responder to reveal the services it publishes.
pub const ANY_SERVICE_FULL_NAME: &str = "_services._dns-sd._udp.local.";

const SUB_LABEL: &str = "_sub.";
const MAX_LABEL_LEN: usize = 63;

pub fn local_host_full_name(host_name: &str) -> String {
    format!("{host_name}.{LOCAL_DOMAIN}")
}

pub fn local_service_full_name(service_name: &str) -> String {
    format!("{service_name}{LOCAL_DOMAIN}")
}

pub fn local_instance_full_name(instance_name: &str, service_name: &str) -> String {
    format!("{instance_name}.{service_name}{LOCAL_DOMAIN}")
}

pub fn local_service_subtype_full_name(service_name: &str, subtype: &str) -> String {
    format!("{subtype}.{SUB_LABEL}{service_name}{LOCAL_DOMAIN}")
}

// Extracts the instance name from an instance full name, given the service
// it is expected to belong to. Returns None if the name doesn't parse as an
// instance of that service.
pub fn extract_instance_name(instance_full_name: &str, service_name: &str) -> Option<String> {
    let suffix = local_service_full_name(service_name);
    let instance = strip_suffix_ignore_case(instance_full_name, &suffix)?;
    let instance = instance.strip_suffix('.')?;
    if instance.is_empty() || instance.contains('.') {
        return None;
    }
    Some(instance.to_owned())
}

// Determines whether name is the full name of the given service or of one
// of its subtypes. Returns the subtype on a subtype match, Some("") on a
// plain match, and None otherwise.
pub fn match_service_name(name: &str, service_name: &str) -> Option<String> {
    let suffix = local_service_full_name(service_name);
    let rest = strip_suffix_ignore_case(name, &suffix)?;

    if rest.is_empty() {
        return Some(String::new());
    }

    let subtype = strip_suffix_ignore_case(rest, SUB_LABEL)?;
    let subtype = subtype.strip_suffix('.')?;
    if is_valid_subtype_name(subtype) {
        Some(subtype.to_owned())
    } else {
        None
    }
}

pub fn is_valid_host_name(host_name: &str) -> bool {
    is_valid_label(host_name)
}

pub fn is_valid_instance_name(instance_name: &str) -> bool {
    is_valid_label(instance_name)
}

// A service name is two underscore labels, e.g. "_test._tcp.". The second
// label names the transport and must be "_tcp" or "_udp".
pub fn is_valid_service_name(service_name: &str) -> bool {
    let Some(body) = service_name.strip_suffix('.') else {
        return false;
    };
    let Some((service, transport)) = body.split_once('.') else {
        return false;
    };
    if !transport.eq_ignore_ascii_case("_tcp") && !transport.eq_ignore_ascii_case("_udp") {
        return false;
    }
    service.len() > 1 && service.starts_with('_') && is_valid_label(service)
}

pub fn is_valid_subtype_name(subtype: &str) -> bool {
    subtype.len() > 1 && subtype.starts_with('_') && is_valid_label(subtype)
}

pub(crate) fn check_host_name(host_name: &str) -> Result<()> {
    if is_valid_host_name(host_name) {
        Ok(())
    } else {
        Err(Error::ErrInvalidHostName)
    }
}

pub(crate) fn check_service_name(service_name: &str) -> Result<()> {
    if is_valid_service_name(service_name) {
        Ok(())
    } else {
        Err(Error::ErrInvalidServiceName)
    }
}

pub(crate) fn check_instance_name(instance_name: &str) -> Result<()> {
    if is_valid_instance_name(instance_name) {
        Ok(())
    } else {
        Err(Error::ErrInvalidInstanceName)
    }
}

pub(crate) fn check_subtype_name(subtype: &str) -> Result<()> {
    if is_valid_subtype_name(subtype) {
        Ok(())
    } else {
        Err(Error::ErrInvalidSubtypeName)
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.contains('.')
        && label.bytes().all(|b| (0x20..0x7f).contains(&b))
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() < suffix.len() {
        return None;
    }
    let (head, tail) = s.split_at(s.len() - suffix.len());
    if tail.eq_ignore_ascii_case(suffix) {
        Some(head)
    } else {
        None
    }
}
