use std::net::Ipv4Addr;

use tokio::time::Duration;

use super::address_prober::AddressProber;
use crate::address_book::AddressBook;
use crate::agent::{Agent, AgentContext, AgentEvent, AgentId, Section};
use crate::message::name::Name;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

fn context() -> AgentContext {
    let mut ctx = AgentContext::new(AddressBook::default());
    ctx.current = AgentId(1);
    ctx.set_host_full_name(&Name::new("fuchsia.local.").unwrap());
    ctx
}

fn multicast_message(ctx: &AgentContext) -> Option<&crate::message::Message> {
    ctx.outbound.get(&ctx.addresses.multicast_reply())
}

#[test]
fn test_three_probes_then_success() {
    let mut ctx = context();
    let mut prober = AddressProber::new();
    let host_full_name = Name::new("fuchsia.local.").unwrap();

    prober.start(&host_full_name, &mut ctx);

    // The first probe is scheduled with up to 250 ms of jitter.
    let first = ctx.tasks.next_time().expect("probe scheduled");
    assert!(first <= ctx.now + Duration::from_millis(250));

    let mut wakes = 0;
    let mut questions = 0;
    let mut last_probe_time = None;

    loop {
        let Some(at) = ctx.tasks.next_time() else {
            break;
        };
        ctx.now = at;
        ctx.tasks.pop_due(ctx.now).unwrap();
        prober.wake(1, &mut ctx);
        wakes += 1;

        let sent = multicast_message(&ctx)
            .map(|m| m.questions.len())
            .unwrap_or(0);
        if sent > questions {
            // Probe queries are spaced 250 ms apart.
            if let Some(last) = last_probe_time {
                assert_eq!(at - last, Duration::from_millis(250));
            }
            last_probe_time = Some(at);
            questions = sent;
        }

        assert!(wakes < 10, "prober never completed");
        if !ctx.events.is_empty() {
            break;
        }
    }

    // Exactly three probe queries, each with the proposed record in the
    // authority section, then success.
    assert_eq!(questions, 3);
    let message = multicast_message(&ctx).unwrap();
    assert_eq!(message.authorities.len(), 3);
    assert!(message
        .questions
        .iter()
        .all(|q| q.typ == DnsType::A && q.unicast_response));

    assert!(matches!(
        ctx.events[0],
        AgentEvent::AddressProbeComplete { success: true }
    ));
    assert_eq!(ctx.removals, vec![AgentId(1)]);
}

#[test]
fn test_conflict_reports_failure() {
    let mut ctx = context();
    let mut prober = AddressProber::new();
    let host_full_name = Name::new("fuchsia.local.").unwrap();

    prober.start(&host_full_name, &mut ctx);

    // First probe goes out.
    ctx.now = ctx.tasks.next_time().unwrap();
    ctx.tasks.pop_due(ctx.now).unwrap();
    prober.wake(1, &mut ctx);

    // A peer claims the name.
    let conflict = ResourceRecord::new(
        Name::new("FUCHSIA.local.").unwrap(),
        RData::A(Ipv4Addr::new(10, 0, 0, 7)),
    );
    prober.receive_resource(&conflict, Section::Answer, &mut ctx);

    assert!(matches!(
        ctx.events[0],
        AgentEvent::AddressProbeComplete { success: false }
    ));
    assert_eq!(ctx.removals, vec![AgentId(1)]);

    // Further wakes do nothing.
    let questions_before = multicast_message(&ctx).unwrap().questions.len();
    while let Some(at) = ctx.tasks.next_time() {
        ctx.now = at;
        ctx.tasks.pop_due(ctx.now).unwrap();
        prober.wake(1, &mut ctx);
    }
    assert_eq!(
        multicast_message(&ctx).unwrap().questions.len(),
        questions_before
    );
}

#[test]
fn test_unrelated_records_ignored() {
    let mut ctx = context();
    let mut prober = AddressProber::new();

    prober.start(&Name::new("fuchsia.local.").unwrap(), &mut ctx);

    let other = ResourceRecord::new(
        Name::new("other.local.").unwrap(),
        RData::A(Ipv4Addr::new(10, 0, 0, 7)),
    );
    prober.receive_resource(&other, Section::Answer, &mut ctx);

    let ptr = ResourceRecord::new(
        Name::new("fuchsia.local.").unwrap(),
        RData::Ptr(Name::new("other.local.").unwrap()),
    );
    prober.receive_resource(&ptr, Section::Answer, &mut ctx);

    assert!(ctx.events.is_empty());
    assert!(ctx.removals.is_empty());
}
