pub(crate) mod address_prober;
pub(crate) mod address_responder;
pub(crate) mod host_name_resolver;
pub(crate) mod instance_prober;
pub(crate) mod instance_requestor;
pub(crate) mod instance_responder;
pub(crate) mod prober;

#[cfg(test)]
mod address_prober_test;
#[cfg(test)]
mod instance_requestor_test;
#[cfg(test)]
mod instance_responder_test;

use address_prober::AddressProber;
use address_responder::AddressResponder;
use host_name_resolver::HostNameResolver;
use instance_prober::InstanceProber;
use instance_requestor::InstanceRequestor;
use instance_responder::InstanceResponder;

use crate::agent::Agent;

// The concrete agent kinds the engine hosts. The tagged variant replaces
// downcasting: traffic distribution goes through the shared Agent contract,
// while kind-specific control calls (subscriber attach, publisher control)
// go through the accessors below.
pub(crate) enum AgentKind {
    AddressProber(AddressProber),
    AddressResponder(AddressResponder),
    HostNameResolver(HostNameResolver),
    InstanceProber(InstanceProber),
    InstanceRequestor(InstanceRequestor),
    InstanceResponder(InstanceResponder),
}

impl AgentKind {
    pub(crate) fn as_agent_mut(&mut self) -> &mut dyn Agent {
        match self {
            AgentKind::AddressProber(agent) => agent,
            AgentKind::AddressResponder(agent) => agent,
            AgentKind::HostNameResolver(agent) => agent,
            AgentKind::InstanceProber(agent) => agent,
            AgentKind::InstanceRequestor(agent) => agent,
            AgentKind::InstanceResponder(agent) => agent,
        }
    }

    pub(crate) fn as_instance_requestor_mut(&mut self) -> Option<&mut InstanceRequestor> {
        match self {
            AgentKind::InstanceRequestor(agent) => Some(agent),
            _ => None,
        }
    }

    pub(crate) fn as_instance_responder_mut(&mut self) -> Option<&mut InstanceResponder> {
        match self {
            AgentKind::InstanceResponder(agent) => Some(agent),
            _ => None,
        }
    }
}
