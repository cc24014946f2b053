use crate::agent::{Agent, AgentContext, Section};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::DnsType;
use crate::reply_address::ReplyAddress;

// Answers address queries for the local host by emitting the address
// placeholder; the interface transceiver substitutes the real A/AAAA
// records of the interface the answer leaves through.
pub(crate) struct AddressResponder {
    host_full_name: Option<Name>,
}

impl AddressResponder {
    pub(crate) fn new() -> Self {
        AddressResponder {
            host_full_name: None,
        }
    }
}

impl Agent for AddressResponder {
    fn start(&mut self, host_full_name: &Name, _ctx: &mut AgentContext) {
        self.host_full_name = Some(host_full_name.clone());
    }

    fn receive_question(
        &mut self,
        question: &Question,
        reply_address: &ReplyAddress,
        _sender_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        if !matches!(
            question.typ,
            DnsType::A | DnsType::Aaaa | DnsType::Any
        ) {
            return;
        }

        if Some(&question.name) == self.host_full_name.as_ref() {
            ctx.send_addresses(Section::Answer, reply_address);
        }
    }
}
