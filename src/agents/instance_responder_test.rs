use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use super::instance_responder::InstanceResponder;
use crate::address_book::AddressBook;
use crate::agent::{Agent, AgentContext, AgentId};
use crate::mdns::{Publication, Publisher};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::RData;
use crate::message::{DnsType, Message};
use crate::reply_address::{Media, ReplyAddress};

#[derive(Debug, Clone)]
struct PublicationRequest {
    query: bool,
    subtype: String,
    source_addresses: Vec<SocketAddr>,
}

#[derive(Clone)]
struct RecordingPublisher {
    requests: Arc<Mutex<Vec<PublicationRequest>>>,
    publication: Arc<Mutex<Option<Publication>>>,
    successes: Arc<Mutex<Vec<bool>>>,
}

impl RecordingPublisher {
    fn new() -> Self {
        let mut publication = Publication::new(2525);
        publication.ptr_ttl = 4500;
        publication.srv_ttl = 120;
        publication.txt_ttl = 4500;

        RecordingPublisher {
            requests: Arc::new(Mutex::new(vec![])),
            publication: Arc::new(Mutex::new(Some(publication))),
            successes: Arc::new(Mutex::new(vec![])),
        }
    }

    fn take_requests(&self) -> Vec<PublicationRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

impl Publisher for RecordingPublisher {
    fn get_publication(
        &mut self,
        query: bool,
        subtype: &str,
        source_addresses: &[SocketAddr],
    ) -> Option<Publication> {
        self.requests.lock().unwrap().push(PublicationRequest {
            query,
            subtype: subtype.to_owned(),
            source_addresses: source_addresses.to_vec(),
        });
        self.publication.lock().unwrap().clone()
    }

    fn report_success(&mut self, success: bool) {
        self.successes.lock().unwrap().push(success);
    }
}

fn context() -> AgentContext {
    let mut ctx = AgentContext::new(AddressBook::default());
    ctx.current = AgentId(1);
    ctx.set_host_full_name(&Name::new("fuchsia.local.").unwrap());
    ctx
}

fn started_responder(
    ctx: &mut AgentContext,
    media: Media,
) -> (InstanceResponder, RecordingPublisher) {
    let publisher = RecordingPublisher::new();
    let mut responder =
        InstanceResponder::new("_test._tcp.", "demo", media, Box::new(publisher.clone()));
    responder.start(&Name::new("fuchsia.local.").unwrap(), ctx);
    (responder, publisher)
}

fn take_multicast(ctx: &mut AgentContext) -> Option<Message> {
    let key = ctx.addresses.multicast_reply();
    ctx.outbound.remove(&key)
}

fn sender(port: u16) -> ReplyAddress {
    ReplyAddress::new(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), port),
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        Media::Wired,
    )
}

fn ptr_question() -> Question {
    Question::new(Name::new("_test._tcp.local.").unwrap(), DnsType::Ptr)
}

// The shape shared by announcements and query responses: PTR in answers,
// SRV and TXT and the address placeholder in additionals.
fn assert_publication_shape(message: &Message) {
    assert_eq!(message.answers.len(), 1);
    let ptr = &message.answers[0];
    assert_eq!(ptr.name, Name::new("_test._tcp.local.").unwrap());
    assert_eq!(ptr.ttl, 4500);
    assert_eq!(
        ptr.rdata,
        RData::Ptr(Name::new("demo._test._tcp.local.").unwrap())
    );

    assert_eq!(message.additionals.len(), 3);

    let srv = &message.additionals[0];
    assert_eq!(srv.name, Name::new("demo._test._tcp.local.").unwrap());
    assert_eq!(srv.ttl, 120);
    assert_eq!(
        srv.rdata,
        RData::Srv {
            priority: 0,
            weight: 0,
            port: 2525,
            target: Name::new("fuchsia.local.").unwrap(),
        }
    );

    let txt = &message.additionals[1];
    assert_eq!(txt.ttl, 4500);
    assert_eq!(txt.rdata, RData::Txt(vec![]));

    assert_eq!(message.additionals[2].rdata, RData::AddressPlaceholder);
}

#[test]
fn test_announcement_sequence() {
    let mut ctx = context();
    let start = ctx.now;
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);

    // The first announcement is immediate.
    let message = take_multicast(&mut ctx).expect("announcement sent");
    assert_publication_shape(&message);
    assert!(!publisher.take_requests()[0].query);

    // Three more at one, three and seven seconds in.
    for offset in [1u64, 3, 7] {
        let at = ctx.tasks.next_time().expect("announcement scheduled");
        assert_eq!(at, start + Duration::from_secs(offset));
        ctx.now = at;
        ctx.tasks.pop_due(ctx.now).unwrap();
        responder.wake(1, &mut ctx);

        assert_publication_shape(&take_multicast(&mut ctx).expect("announcement sent"));
    }

    // And no more.
    assert_eq!(ctx.tasks.next_time(), None);

    // Reannounce restarts the sequence.
    responder.reannounce(&mut ctx);
    assert!(take_multicast(&mut ctx).is_some());
    assert_eq!(
        ctx.tasks.next_time(),
        Some(ctx.now + Duration::from_secs(1))
    );
}

#[test]
fn test_unicast_question_answered_without_throttle() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    // A question from source port 51234 gets a unicast reply.
    let reply = sender(51234);
    responder.receive_question(&ptr_question(), &reply, &reply, &mut ctx);

    let message = ctx.outbound.remove(&reply).expect("unicast reply");
    assert_publication_shape(&message);

    let requests = publisher.take_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].query);
    assert_eq!(
        requests[0].source_addresses,
        vec![sender(51234).socket_address()]
    );

    // A second question right away is also answered; unicast replies are
    // never throttled.
    responder.receive_question(&ptr_question(), &reply, &reply, &mut ctx);
    assert!(ctx.outbound.remove(&reply).is_some());
}

#[test]
fn test_multicast_throttle_coalesces() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    let multicast = ctx.addresses.multicast_reply();

    // A first multicast question is answered immediately and stamps the
    // throttle.
    responder.receive_question(&ptr_question(), &multicast, &sender(5353), &mut ctx);
    assert!(take_multicast(&mut ctx).is_some());
    let first_sent = ctx.now;
    publisher.take_requests();

    // Two more questions arrive 100 ms and 300 ms later. The first marks
    // a send pending one second after the previous send; the second folds
    // into it.
    ctx.now = first_sent + Duration::from_millis(100);
    responder.receive_question(&ptr_question(), &multicast, &sender(5353), &mut ctx);
    assert!(take_multicast(&mut ctx).is_none());

    ctx.now = first_sent + Duration::from_millis(300);
    let second_sender = ReplyAddress::new(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8)), 5353),
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        Media::Wired,
    );
    responder.receive_question(&ptr_question(), &multicast, &second_sender, &mut ctx);
    assert!(take_multicast(&mut ctx).is_none());
    assert!(publisher.take_requests().is_empty());

    // The scheduled send fires one second after the first one, and the
    // publisher hears about both senders at once.
    let at = ctx.tasks.next_time().unwrap();
    assert_eq!(at, first_sent + Duration::from_secs(1));
    ctx.now = at;
    ctx.tasks.pop_due(ctx.now).unwrap();
    responder.wake(1, &mut ctx);

    assert!(take_multicast(&mut ctx).is_some());
    let requests = publisher.take_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].source_addresses,
        vec![
            sender(5353).socket_address(),
            second_sender.socket_address()
        ]
    );
}

#[test]
fn test_media_filter() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Wireless);
    take_multicast(&mut ctx);
    ctx.outbound.clear();
    publisher.take_requests();

    // A question arriving on a wired interface is ignored by a
    // wireless-only responder.
    let reply = sender(51234);
    responder.receive_question(&ptr_question(), &reply, &reply, &mut ctx);
    assert!(ctx.outbound.is_empty());
    assert!(publisher.take_requests().is_empty());

    // The announcement of a wireless-only responder goes to the
    // wireless-only multicast key.
    responder.reannounce(&mut ctx);
    assert!(ctx
        .outbound
        .contains_key(&ctx.addresses.multicast_reply_wireless_only()));
}

#[test]
fn test_service_enumeration() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    let reply = sender(51234);
    let question = Question::new(
        Name::new("_services._dns-sd._udp.local.").unwrap(),
        DnsType::Ptr,
    );
    responder.receive_question(&question, &reply, &reply, &mut ctx);

    // The publisher is not consulted for enumeration.
    assert!(publisher.take_requests().is_empty());

    let message = ctx.outbound.remove(&reply).expect("enumeration reply");
    assert_eq!(message.answers.len(), 1);
    assert_eq!(
        message.answers[0].rdata,
        RData::Ptr(Name::new("_test._tcp.local.").unwrap())
    );
}

#[test]
fn test_subtype_question_and_removal() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    responder.set_subtypes(vec!["_printer".to_owned()], &mut ctx);

    // The restarted announcement carries the subtype PTR.
    let message = take_multicast(&mut ctx).expect("announcement sent");
    assert!(message.answers.iter().any(|r| {
        r.name == Name::new("_printer._sub._test._tcp.local.").unwrap() && r.ttl != 0
    }));

    // A subtype question is answered with the subtype passed through to
    // the publisher.
    let reply = sender(51234);
    let question = Question::new(
        Name::new("_printer._sub._test._tcp.local.").unwrap(),
        DnsType::Ptr,
    );
    responder.receive_question(&question, &reply, &reply, &mut ctx);
    assert!(ctx.outbound.remove(&reply).is_some());
    assert_eq!(publisher.take_requests()[0].subtype, "_printer");

    // Dropping the subtype retracts it with a ttl-zero PTR.
    responder.set_subtypes(vec![], &mut ctx);
    let message = take_multicast(&mut ctx).expect("retraction sent");
    assert!(message.answers.iter().any(|r| {
        r.name == Name::new("_printer._sub._test._tcp.local.").unwrap() && r.ttl == 0
    }));
}

#[test]
fn test_goodbye_on_quit() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    responder.quit(&mut ctx);

    let message = take_multicast(&mut ctx).expect("goodbye sent");
    assert!(message.answers.iter().all(|r| r.ttl == 0));
    assert!(message
        .additionals
        .iter()
        .filter(|r| r.rdata != RData::AddressPlaceholder)
        .all(|r| r.ttl == 0));

    // The goodbye is not a publisher publication.
    assert!(publisher.take_requests().is_empty());
    assert_eq!(ctx.removals, vec![AgentId(1)]);
}

#[test]
fn test_null_publication_sends_nothing() {
    let mut ctx = context();
    let (mut responder, publisher) = started_responder(&mut ctx, Media::Both);
    take_multicast(&mut ctx);
    publisher.take_requests();

    *publisher.publication.lock().unwrap() = None;

    let multicast = ctx.addresses.multicast_reply();
    responder.receive_question(&ptr_question(), &multicast, &sender(5353), &mut ctx);

    assert!(take_multicast(&mut ctx).is_none());

    // The throttle isn't wedged: with a publication restored, the next
    // question is answered.
    *publisher.publication.lock().unwrap() = Some(Publication::new(2525));
    responder.receive_question(&ptr_question(), &multicast, &sender(5353), &mut ctx);
    assert!(take_multicast(&mut ctx).is_some());
}
