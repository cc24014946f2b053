use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::sync::oneshot;
use tokio::time::Duration;

use crate::agent::{Agent, AgentContext, Section};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

const DEADLINE: u64 = 1;

pub(crate) type HostNameResult = (Option<Ipv4Addr>, Option<Ipv6Addr>);

// Resolves a host name to its v4/v6 addresses. Sends A and AAAA questions
// on start and reports at most once: at the first end-of-message with a
// non-empty result, at the deadline with whatever was collected, or on
// quit.
pub(crate) struct HostNameResolver {
    host_full_name: Name,
    timeout: Duration,
    v4_address: Option<Ipv4Addr>,
    v6_address: Option<Ipv6Addr>,
    result_sender: Option<oneshot::Sender<HostNameResult>>,
}

impl HostNameResolver {
    pub(crate) fn new(
        host_full_name: Name,
        timeout: Duration,
        result_sender: oneshot::Sender<HostNameResult>,
    ) -> Self {
        HostNameResolver {
            host_full_name,
            timeout,
            v4_address: None,
            v6_address: None,
            result_sender: Some(result_sender),
        }
    }

    fn report(&mut self) {
        if let Some(sender) = self.result_sender.take() {
            let _ = sender.send((self.v4_address, self.v6_address));
        }
    }
}

impl Agent for HostNameResolver {
    // Note that self.host_full_name is the name being resolved, not the
    // name of the local host, which is the (ignored) parameter here.
    fn start(&mut self, _host_full_name: &Name, ctx: &mut AgentContext) {
        ctx.send_question(Question::new(self.host_full_name.clone(), DnsType::A));
        ctx.send_question(Question::new(self.host_full_name.clone(), DnsType::Aaaa));

        let deadline = ctx.now() + self.timeout;
        ctx.post_task_at(DEADLINE, deadline);
    }

    fn receive_resource(
        &mut self,
        resource: &ResourceRecord,
        _section: Section,
        _ctx: &mut AgentContext,
    ) {
        if resource.name != self.host_full_name {
            return;
        }

        match resource.rdata {
            RData::A(address) => self.v4_address = Some(address),
            RData::Aaaa(address) => self.v6_address = Some(address),
            _ => {}
        }
    }

    fn end_of_message(&mut self, ctx: &mut AgentContext) {
        if self.result_sender.is_none() {
            // A redundant response can arrive after the result was already
            // reported, e.g. when two NICs are connected to the same LAN.
            return;
        }

        if self.v4_address.is_some() || self.v6_address.is_some() {
            self.report();
            ctx.remove_self();
        }
    }

    fn wake(&mut self, _token: u64, ctx: &mut AgentContext) {
        self.report();
        ctx.remove_self();
    }

    fn quit(&mut self, ctx: &mut AgentContext) {
        self.report();
        ctx.remove_self();
    }
}
