use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

use super::name::*;
use super::question::*;
use super::resource::*;
use super::*;

fn name(data: &str) -> Name {
    Name::new(data).unwrap()
}

fn test_msg() -> Message {
    let instance = name("demo._test._tcp.local.");
    let service = name("_test._tcp.local.");
    let host = name("fuchsia.local.");

    Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        questions: vec![Question::new(service.clone(), DnsType::Ptr)],
        answers: vec![{
            let mut r = ResourceRecord::new(service, RData::Ptr(instance.clone()));
            r.ttl = 4500;
            r
        }],
        authorities: vec![ResourceRecord::new(
            name("fuchsia.local."),
            RData::A(Ipv4Addr::new(192, 168, 1, 2)),
        )],
        additionals: vec![
            ResourceRecord::new(
                instance.clone(),
                RData::Srv {
                    priority: 0,
                    weight: 0,
                    port: 2525,
                    target: host,
                },
            ),
            ResourceRecord::new(instance.clone(), RData::Txt(vec!["path=/".to_owned()])),
            ResourceRecord::new(
                name("fuchsia.local."),
                RData::Aaaa(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            ),
            ResourceRecord::new(
                instance,
                RData::Nsec {
                    next_domain: name("demo._test._tcp.local."),
                    bits: vec![0, 1, 0x40],
                },
            ),
        ],
    }
}

#[test]
fn test_pack_unpack_round_trip() {
    let msg = test_msg();
    let packed = msg.pack().unwrap();
    let unpacked = Message::unpack(&packed).unwrap();
    assert_eq!(msg, unpacked);
}

#[test]
fn test_counts_match_section_lengths() {
    let msg = test_msg();
    let packed = msg.pack().unwrap();

    let question_count = u16::from_be_bytes([packed[4], packed[5]]);
    let answer_count = u16::from_be_bytes([packed[6], packed[7]]);
    let authority_count = u16::from_be_bytes([packed[8], packed[9]]);
    let additional_count = u16::from_be_bytes([packed[10], packed[11]]);

    assert_eq!(question_count as usize, msg.questions.len());
    assert_eq!(answer_count as usize, msg.answers.len());
    assert_eq!(authority_count as usize, msg.authorities.len());
    assert_eq!(additional_count as usize, msg.additionals.len());
}

#[test]
fn test_compression_round_trip() {
    // Repeated suffixes compress into pointers; the message must still
    // parse back to the same value.
    let msg = test_msg();
    let packed = msg.pack().unwrap();

    let mut uncompressed_len = 0;
    for q in &msg.questions {
        uncompressed_len += q.name.data.len();
    }
    for r in msg
        .answers
        .iter()
        .chain(msg.authorities.iter())
        .chain(msg.additionals.iter())
    {
        uncompressed_len += r.name.data.len();
    }

    // The packed names alone would exceed the packed size if no pointer
    // had been emitted.
    assert!(packed.len() < uncompressed_len + 100);

    assert_eq!(Message::unpack(&packed).unwrap(), msg);
}

#[test]
fn test_name_case_insensitive() {
    let a = name("Fuchsia.LOCAL.");
    let b = name("fuchsia.local.");
    assert_eq!(a, b);

    let mut hasher_a = DefaultHasher::new();
    a.hash(&mut hasher_a);
    let mut hasher_b = DefaultHasher::new();
    b.hash(&mut hasher_b);
    assert_eq!(hasher_a.finish(), hasher_b.finish());

    assert_ne!(name("fuchsia2.local."), b);
}

#[test]
fn test_unicast_response_bit() {
    let mut question = Question::new(name("fuchsia.local."), DnsType::A);
    question.unicast_response = true;

    let msg = Message {
        questions: vec![question],
        ..Default::default()
    };

    let packed = msg.pack().unwrap();

    // The question class is the last two bytes; the top bit must be set.
    assert_eq!(packed[packed.len() - 2] & 0x80, 0x80);

    let unpacked = Message::unpack(&packed).unwrap();
    assert!(unpacked.questions[0].unicast_response);
    assert_eq!(unpacked.questions[0].class, DNSCLASS_INET);
}

#[test]
fn test_cache_flush_bit() {
    let mut record = ResourceRecord::new(
        name("fuchsia.local."),
        RData::A(Ipv4Addr::new(192, 168, 1, 2)),
    );
    record.cache_flush = true;

    let msg = Message {
        answers: vec![record.clone()],
        ..Default::default()
    };

    let unpacked = Message::unpack(&msg.pack().unwrap()).unwrap();
    assert!(unpacked.answers[0].cache_flush);
    assert_eq!(unpacked.answers[0], record);
}

#[test]
fn test_address_placeholder_does_not_pack() {
    let msg = Message {
        answers: vec![ResourceRecord::new(
            name("fuchsia.local."),
            RData::AddressPlaceholder,
        )],
        ..Default::default()
    };

    assert_eq!(msg.pack(), Err(crate::error::Error::ErrAddressPlaceholder));
}

#[test]
fn test_unsupported_type_skipped() {
    // Header with one answer of type 99, which the engine doesn't model.
    let mut packed = vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
    packed.extend_from_slice(&[1, b'x', 5, b'l', b'o', b'c', b'a', b'l', 0]);
    packed.extend_from_slice(&[0, 99]); // type
    packed.extend_from_slice(&[0, 1]); // class
    packed.extend_from_slice(&[0, 0, 0, 60]); // ttl
    packed.extend_from_slice(&[0, 2, 0xde, 0xad]); // rdlength + rdata

    let unpacked = Message::unpack(&packed).unwrap();
    assert!(unpacked.answers.is_empty());
}

#[test]
fn test_truncated_message_rejected() {
    let msg = test_msg();
    let packed = msg.pack().unwrap();
    assert!(Message::unpack(&packed[..packed.len() - 3]).is_err());
}

#[test]
fn test_pointer_loop_rejected() {
    // A name that is just a pointer to itself.
    let mut packed = vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    packed.extend_from_slice(&[0xC0, 12]); // pointer to offset 12 (itself)
    packed.extend_from_slice(&[0, 1, 0, 1]); // type A, class IN

    assert!(Message::unpack(&packed).is_err());
}

#[test]
fn test_empty_txt_round_trip() {
    let record = ResourceRecord::new(name("demo._test._tcp.local."), RData::Txt(vec![]));
    let msg = Message {
        answers: vec![record.clone()],
        ..Default::default()
    };

    let unpacked = Message::unpack(&msg.pack().unwrap()).unwrap();
    assert_eq!(unpacked.answers[0], record);
}

#[test]
fn test_resource_equality_covers_header_and_body() {
    let a = ResourceRecord::new(
        name("fuchsia.local."),
        RData::A(Ipv4Addr::new(192, 168, 1, 2)),
    );

    let mut b = a.clone();
    assert_eq!(a, b);

    b.ttl += 1;
    assert_ne!(a, b);

    let mut c = a.clone();
    c.rdata = RData::A(Ipv4Addr::new(192, 168, 1, 3));
    assert_ne!(a, c);

    // Same name in a different case is the same record.
    let mut d = a.clone();
    d.name = name("FUCHSIA.local.");
    assert_eq!(a, d);
}
