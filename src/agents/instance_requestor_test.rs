use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use super::instance_requestor::InstanceRequestor;
use crate::address_book::AddressBook;
use crate::agent::{Agent, AgentContext, AgentId, Section};
use crate::mdns::Subscriber;
use crate::message::name::Name;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Callback {
    kind: &'static str,
    instance: String,
    v4_address: Option<SocketAddr>,
    text: Vec<String>,
}

#[derive(Clone, Default)]
struct RecordingSubscriber {
    callbacks: Arc<Mutex<Vec<Callback>>>,
}

impl RecordingSubscriber {
    fn take(&self) -> Vec<Callback> {
        std::mem::take(&mut *self.callbacks.lock().unwrap())
    }
}

impl Subscriber for RecordingSubscriber {
    fn instance_discovered(
        &mut self,
        _service: &str,
        instance: &str,
        v4_address: Option<SocketAddr>,
        _v6_address: Option<SocketAddr>,
        text: &[String],
        _srv_priority: u16,
        _srv_weight: u16,
    ) {
        self.callbacks.lock().unwrap().push(Callback {
            kind: "discovered",
            instance: instance.to_owned(),
            v4_address,
            text: text.to_vec(),
        });
    }

    fn instance_changed(
        &mut self,
        _service: &str,
        instance: &str,
        v4_address: Option<SocketAddr>,
        _v6_address: Option<SocketAddr>,
        text: &[String],
        _srv_priority: u16,
        _srv_weight: u16,
    ) {
        self.callbacks.lock().unwrap().push(Callback {
            kind: "changed",
            instance: instance.to_owned(),
            v4_address,
            text: text.to_vec(),
        });
    }

    fn instance_lost(&mut self, _service: &str, instance: &str) {
        self.callbacks.lock().unwrap().push(Callback {
            kind: "lost",
            instance: instance.to_owned(),
            v4_address: None,
            text: vec![],
        });
    }
}

fn context() -> AgentContext {
    let mut ctx = AgentContext::new(AddressBook::default());
    ctx.current = AgentId(1);
    ctx
}

fn started_requestor(ctx: &mut AgentContext) -> (InstanceRequestor, RecordingSubscriber) {
    let mut requestor = InstanceRequestor::new("_test._tcp.");
    let subscriber = RecordingSubscriber::default();
    requestor.add_subscriber(0, Box::new(subscriber.clone()));
    requestor.start(&Name::new("fuchsia.local.").unwrap(), ctx);
    (requestor, subscriber)
}

fn ptr_record(ttl: u32) -> ResourceRecord {
    let mut r = ResourceRecord::new(
        Name::new("_test._tcp.local.").unwrap(),
        RData::Ptr(Name::new("demo._test._tcp.local.").unwrap()),
    );
    r.ttl = ttl;
    r
}

fn srv_record(port: u16, ttl: u32) -> ResourceRecord {
    let mut r = ResourceRecord::new(
        Name::new("demo._test._tcp.local.").unwrap(),
        RData::Srv {
            priority: 0,
            weight: 0,
            port,
            target: Name::new("fuchsia2.local.").unwrap(),
        },
    );
    r.ttl = ttl;
    r
}

fn a_record(ttl: u32) -> ResourceRecord {
    let mut r = ResourceRecord::new(
        Name::new("fuchsia2.local.").unwrap(),
        RData::A(Ipv4Addr::new(1, 2, 3, 4)),
    );
    r.ttl = ttl;
    r
}

fn feed_instance(requestor: &mut InstanceRequestor, ctx: &mut AgentContext) {
    requestor.receive_resource(&ptr_record(4500), Section::Answer, ctx);
    requestor.receive_resource(&srv_record(2525, 120), Section::Additional, ctx);
    requestor.receive_resource(&a_record(120), Section::Additional, ctx);
    requestor.end_of_message(ctx);
}

#[test]
fn test_query_backoff() {
    let mut ctx = context();
    let start = ctx.now;
    let (mut requestor, _subscriber) = started_requestor(&mut ctx);

    // The PTR question goes out immediately; the first re-query comes
    // after one second, doubling after that.
    let message = ctx
        .outbound
        .get(&ctx.addresses.multicast_reply())
        .expect("question sent");
    assert_eq!(message.questions.len(), 1);
    assert_eq!(message.questions[0].typ, DnsType::Ptr);
    assert_eq!(ctx.tasks.next_time(), Some(start + Duration::from_secs(1)));

    let mut delay = Duration::from_secs(1);
    for _ in 0..15 {
        ctx.now = ctx.tasks.next_time().unwrap();
        let at = ctx.now;
        ctx.tasks.pop_due(ctx.now).unwrap();
        requestor.wake(1, &mut ctx);

        delay = (delay * 2).min(Duration::from_secs(60 * 60));
        assert_eq!(ctx.tasks.next_time(), Some(at + delay));
    }
}

#[test]
fn test_instance_discovered_then_changed_then_lost() {
    let mut ctx = context();
    let (mut requestor, subscriber) = started_requestor(&mut ctx);

    feed_instance(&mut requestor, &mut ctx);

    let expected_v4 = Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 2525));
    assert_eq!(
        subscriber.take(),
        vec![Callback {
            kind: "discovered",
            instance: "demo".to_owned(),
            v4_address: expected_v4,
            text: vec![],
        }]
    );

    // The same records again change nothing.
    feed_instance(&mut requestor, &mut ctx);
    assert_eq!(subscriber.take(), vec![]);

    // A port change is reported as a change, not a rediscovery.
    requestor.receive_resource(&srv_record(2526, 120), Section::Additional, &mut ctx);
    requestor.end_of_message(&mut ctx);

    let expected_v4 = Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 2526));
    assert_eq!(
        subscriber.take(),
        vec![Callback {
            kind: "changed",
            instance: "demo".to_owned(),
            v4_address: expected_v4,
            text: vec![],
        }]
    );

    // A ttl-zero PTR loses the instance.
    requestor.receive_resource(&ptr_record(0), Section::Answer, &mut ctx);
    requestor.end_of_message(&mut ctx);

    assert_eq!(
        subscriber.take(),
        vec![Callback {
            kind: "lost",
            instance: "demo".to_owned(),
            v4_address: None,
            text: vec![],
        }]
    );
}

#[test]
fn test_no_discovery_without_address() {
    let mut ctx = context();
    let (mut requestor, subscriber) = started_requestor(&mut ctx);

    requestor.receive_resource(&ptr_record(4500), Section::Answer, &mut ctx);
    requestor.receive_resource(&srv_record(2525, 120), Section::Additional, &mut ctx);
    requestor.end_of_message(&mut ctx);

    // No address for the target yet, so no discovery.
    assert_eq!(subscriber.take(), vec![]);

    requestor.receive_resource(&a_record(120), Section::Additional, &mut ctx);
    requestor.end_of_message(&mut ctx);

    assert_eq!(subscriber.take().len(), 1);
}

#[test]
fn test_late_subscriber_sees_known_instances() {
    let mut ctx = context();
    let (mut requestor, first) = started_requestor(&mut ctx);

    feed_instance(&mut requestor, &mut ctx);
    first.take();

    let second = RecordingSubscriber::default();
    requestor.add_subscriber(1, Box::new(second.clone()));

    let callbacks = second.take();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].kind, "discovered");
    assert_eq!(callbacks[0].instance, "demo");

    // The first subscriber heard nothing new.
    assert_eq!(first.take(), vec![]);
}

#[test]
fn test_expired_address_stops_updates() {
    let mut ctx = context();
    let (mut requestor, subscriber) = started_requestor(&mut ctx);

    feed_instance(&mut requestor, &mut ctx);
    subscriber.take();

    // The renewal layer reports the address expired.
    requestor.receive_resource(&a_record(0), Section::Expired, &mut ctx);
    requestor.end_of_message(&mut ctx);
    subscriber.take();

    // With no address left for the target, changes are not reported.
    requestor.receive_resource(&srv_record(2526, 120), Section::Additional, &mut ctx);
    requestor.end_of_message(&mut ctx);

    assert_eq!(subscriber.take(), vec![]);
}

#[test]
fn test_resources_are_renewed() {
    let mut ctx = context();
    let (mut requestor, _subscriber) = started_requestor(&mut ctx);

    feed_instance(&mut requestor, &mut ctx);

    // PTR, SRV and A were all registered for renewal.
    assert_eq!(ctx.renewals.len(), 3);
    let types: Vec<_> = ctx.renewals.iter().map(|r| r.typ()).collect();
    assert!(types.contains(&DnsType::Ptr));
    assert!(types.contains(&DnsType::Srv));
    assert!(types.contains(&DnsType::A));
}

#[test]
fn test_remove_subscriber() {
    let mut ctx = context();
    let (mut requestor, _subscriber) = started_requestor(&mut ctx);

    let second = RecordingSubscriber::default();
    requestor.add_subscriber(1, Box::new(second));

    assert!(!requestor.remove_subscriber(0));
    assert!(requestor.remove_subscriber(1));
}
