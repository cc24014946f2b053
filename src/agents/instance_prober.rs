use crate::agent::{Agent, AgentContext, Section};
use crate::agents::prober::{ProbeSequence, ProbeStep};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

const PROBE: u64 = 1;

// Verifies that a prospective (service, instance) binding is unique on the
// link before its responder is added. The probe queries ask for the SRV of
// the instance full name and carry the proposed SRV in the authority
// section; an SRV for the same name from any other source is a conflict.
pub(crate) struct InstanceProber {
    instance_full_name: Name,
    port: u16,
    host_full_name: Option<Name>,
    sequence: ProbeSequence,
    done: bool,
}

impl InstanceProber {
    pub(crate) fn new(instance_full_name: Name, port: u16) -> Self {
        InstanceProber {
            instance_full_name,
            port,
            host_full_name: None,
            sequence: ProbeSequence::new(),
            done: false,
        }
    }
}

impl Agent for InstanceProber {
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

        if matches!(resource.rdata, RData::Srv { .. }) && resource.name == self.instance_full_name
        {
            log::info!("instance probe detected conflict for {}", resource.name);
            self.done = true;
            ctx.complete_instance_probe(false);
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
                let mut question =
                    Question::new(self.instance_full_name.clone(), DnsType::Srv);
                question.unicast_response = true;
                ctx.send_question(question);

                let proposed = ResourceRecord::new(
                    self.instance_full_name.clone(),
                    RData::Srv {
                        priority: 0,
                        weight: 0,
                        port: self.port,
                        target: host_full_name,
                    },
                );
                let reply_address = ctx.addresses().multicast_reply();
                ctx.send_resource(proposed, Section::Authority, &reply_address);
            }
            ProbeStep::Done => {
                self.done = true;
                ctx.complete_instance_probe(true);
                ctx.remove_self();
            }
        }
    }
}
