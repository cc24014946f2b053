use crate::agent::{Agent, AgentContext, Section};
use crate::agents::prober::{ProbeSequence, ProbeStep};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

const PROBE: u64 = 1;

// Verifies that the candidate local host name is unique on the link before
// the engine starts answering for it. The probe queries carry the address
// placeholder in the authority section as the proposed record. A response
// holding an address record for the probed name from anyone else is a
// conflict; the engine then picks a new candidate and probes again.
pub(crate) struct AddressProber {
    host_full_name: Option<Name>,
    sequence: ProbeSequence,
    done: bool,
}

impl AddressProber {
    pub(crate) fn new() -> Self {
        AddressProber {
            host_full_name: None,
            sequence: ProbeSequence::new(),
            done: false,
        }
    }
}

impl Agent for AddressProber {
    fn start(&mut self, host_full_name: &Name, ctx: &mut AgentContext) {
        self.host_full_name = Some(host_full_name.clone());
        self.sequence.schedule_first(PROBE, ctx);
    }

    fn receive_resource(
        &mut self,
        resource: &ResourceRecord,
        section: Section,
        ctx: &mut AgentContext,
    ) {
        if self.done || section == Section::Expired {
            return;
        }

        if matches!(resource.rdata, RData::A(_) | RData::Aaaa(_))
            && Some(&resource.name) == self.host_full_name.as_ref()
        {
            log::info!("address probe detected conflict for {}", resource.name);
            self.done = true;
            ctx.complete_address_probe(false);
            ctx.remove_self();
        }
    }

    fn wake(&mut self, _token: u64, ctx: &mut AgentContext) {
        if self.done {
            return;
        }

        let Some(host_full_name) = self.host_full_name.clone() else {
            return;
        };

        match self.sequence.advance(PROBE, ctx) {
            ProbeStep::SendProbe => {
                let mut question = Question::new(host_full_name, DnsType::A);
                question.unicast_response = true;
                ctx.send_question(question);

                let reply_address = ctx.addresses().multicast_reply();
                ctx.send_addresses(Section::Authority, &reply_address);
            }
            ProbeStep::Done => {
                self.done = true;
                ctx.complete_address_probe(true);
                ctx.remove_self();
            }
        }
    }
}
