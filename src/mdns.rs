
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{sleep_until, Duration, Instant};

use crate::address_book::AddressBook;
use crate::agent::{AgentContext, AgentEvent, AgentId, Section, RENEWER_ID};
use crate::agents::address_prober::AddressProber;
use crate::agents::address_responder::AddressResponder;
use crate::agents::host_name_resolver::{HostNameResolver, HostNameResult};
use crate::agents::instance_prober::InstanceProber;
use crate::agents::instance_requestor::InstanceRequestor;
use crate::agents::instance_responder::InstanceResponder;
use crate::agents::AgentKind;
use crate::error::*;
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{ResourceRecord, LONG_TTL, SHORT_TTL};
use crate::message::Message;
use crate::names;
use crate::reply_address::{Media, ReplyAddress};
use crate::resource_renewer::ResourceRenewer;
use crate::transceiver::{InterfaceInfo, Transceiver};

// Describes an instance publication or query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub port: u16,
    pub text: Vec<String>,
    pub srv_priority: u16,
    pub srv_weight: u16,
    pub ptr_ttl: u32,
    pub srv_ttl: u32,
    pub txt_ttl: u32,
}

impl Publication {
    pub fn new(port: u16) -> Self {
        Publication {
            port,
            text: vec![],
            srv_priority: 0,
            srv_weight: 0,
            ptr_ttl: LONG_TTL,
            srv_ttl: SHORT_TTL,
            txt_ttl: LONG_TTL,
        }
    }
}

// Client-supplied publisher for one service instance.
pub trait Publisher: Send {
    // Provides instance information for an initial announcement (query =
    // false) or a query response (query = true). subtype is empty unless
    // the publication concerns a subtype of the service. source_addresses
    // lists the senders whose questions prompted this publication. A None
    // return means nothing is transmitted for this tick.
    fn get_publication(
        &mut self,
        query: bool,
        subtype: &str,
        source_addresses: &[SocketAddr],
    ) -> Option<Publication>;

    // Reports whether the publication attempt succeeded. Publication fails
    // if another device on the subnet is already publishing the instance.
    fn report_success(&mut self, success: bool);
}

// Client-supplied subscriber to a service.
pub trait Subscriber: Send {
    // Called when an instance is first discovered.
    #[allow(clippy::too_many_arguments)]
    fn instance_discovered(
        &mut self,
        service: &str,
        instance: &str,
        v4_address: Option<SocketAddr>,
        v6_address: Option<SocketAddr>,
        text: &[String],
        srv_priority: u16,
        srv_weight: u16,
    );

    // Called when a previously discovered instance changes addresses,
    // text or SRV fields.
    #[allow(clippy::too_many_arguments)]
    fn instance_changed(
        &mut self,
        service: &str,
        instance: &str,
        v4_address: Option<SocketAddr>,
        v6_address: Option<SocketAddr>,
        text: &[String],
        srv_priority: u16,
        srv_weight: u16,
    );

    // Called when an instance is lost.
    fn instance_lost(&mut self, service: &str, instance: &str);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    NotStarted,
    WaitingForInterfaces,
    AddressProbeInProgress,
    Active,
}

#[derive(PartialEq, Eq)]
enum PublisherEntry {
    // A prober is checking the instance for uniqueness.
    Probing(AgentId),
    // The responder agent is live.
    Active(AgentId),
}

// The agent host: owns the agents, the resource renewer, the task queue
// and the outbound accumulation map, distributes inbound traffic, and runs
// the host-name lifecycle.
struct Core {
    state: State,
    original_host_name: String,
    next_host_name_deduplicator: u32,
    host_name: Option<String>,
    host_full_name: Option<Name>,
    perform_address_probe: bool,
    ready_sender: Option<oneshot::Sender<String>>,
    ctx: AgentContext,
    renewer: ResourceRenewer,
    agents: HashMap<AgentId, AgentKind>,
    agents_awaiting_start: Vec<(AgentId, AgentKind)>,
    next_agent_id: u64,
    next_subscriber_key: u64,
    instance_subscribers_by_service_name: HashMap<String, AgentId>,
    instance_publishers_by_instance_full_name: HashMap<Name, PublisherEntry>,
    pending_instance_probes: HashMap<AgentId, (Name, InstanceResponder)>,
}

impl Core {
    fn new(addresses: AddressBook) -> Self {
        Core {
            state: State::NotStarted,
            original_host_name: String::new(),
            next_host_name_deduplicator: 2,
            host_name: None,
            host_full_name: None,
            perform_address_probe: false,
            ready_sender: None,
            ctx: AgentContext::new(addresses),
            renewer: ResourceRenewer::new(),
            agents: HashMap::new(),
            agents_awaiting_start: vec![],
            next_agent_id: RENEWER_ID.0 + 1,
            next_subscriber_key: 0,
            instance_subscribers_by_service_name: HashMap::new(),
            instance_publishers_by_instance_full_name: HashMap::new(),
            pending_instance_probes: HashMap::new(),
        }
    }

    fn start(
        &mut self,
        host_name: &str,
        perform_address_probe: bool,
        ready_sender: oneshot::Sender<String>,
    ) {
        debug_assert!(self.state == State::NotStarted);

        self.state = State::WaitingForInterfaces;
        self.original_host_name = host_name.to_owned();
        self.perform_address_probe = perform_address_probe;
        self.ready_sender = Some(ready_sender);

        // Respond to address queries for the local host.
        self.add_agent(AgentKind::AddressResponder(AddressResponder::new()));
        self.finish();
    }

    fn stop(&mut self) {
        self.ready_sender = None;
        self.state = State::NotStarted;
    }

    // Once at least one interface exists, the host name can be
    // established, optionally probing for uniqueness first.
    //
    // Link changes after that never restart the probe: a late link change
    // could put two hosts with the same name on one subnet, and improving
    // on that would mean being prepared to change a host name that has
    // been in use for a while.
    fn on_link_change(&mut self, has_interfaces: bool) {
        if self.state == State::WaitingForInterfaces && has_interfaces {
            self.on_interfaces_started();
        }
        self.finish();
    }

    fn on_interfaces_started(&mut self) {
        if self.perform_address_probe {
            let host_name = self.original_host_name.clone();
            self.start_address_probe(&host_name);
            return;
        }

        let host_name = self.original_host_name.clone();
        self.register_host_name(&host_name);
        self.on_ready();
    }

    // Starts a probe for a conflicting host name. On conflict a new name
    // is generated and this runs again; otherwise the host becomes active.
    fn start_address_probe(&mut self, host_name: &str) {
        self.state = State::AddressProbeInProgress;
        self.register_host_name(host_name);

        log::info!(
            "mDNS: verifying uniqueness of host name {}",
            self.host_full_name.as_ref().unwrap_or(&Name::default())
        );

        // Added directly rather than through add_agent: agents added the
        // normal way don't participate until probing completes.
        let id = self.allocate_agent_id();
        self.agents
            .insert(id, AgentKind::AddressProber(AddressProber::new()));
        self.start_agent(id);
    }

    fn register_host_name(&mut self, host_name: &str) {
        self.host_name = Some(host_name.to_owned());
        let host_full_name = Name {
            data: names::local_host_full_name(host_name),
        };
        self.ctx.set_host_full_name(&host_full_name);
        self.host_full_name = Some(host_full_name);
    }

    // Starts the pending agents and reports readiness. Runs when at least
    // one interface is up and a unique host name has been established.
    fn on_ready(&mut self) {
        log::info!(
            "mDNS: using unique host name {}",
            self.host_full_name.as_ref().unwrap_or(&Name::default())
        );

        self.state = State::Active;

        let awaiting = std::mem::take(&mut self.agents_awaiting_start);
        for (id, kind) in awaiting {
            self.agents.insert(id, kind);
            self.start_agent(id);
        }

        if let Some(sender) = self.ready_sender.take() {
            let _ = sender.send(self.host_name.clone().unwrap_or_default());
        }
    }

    fn on_host_name_conflict(&mut self) {
        log::info!(
            "mDNS: another host is using name {}",
            self.host_full_name.as_ref().unwrap_or(&Name::default())
        );

        let host_name = format!(
            "{}{}",
            self.original_host_name, self.next_host_name_deduplicator
        );
        self.next_host_name_deduplicator += 1;

        self.start_address_probe(&host_name);
    }

    fn allocate_agent_id(&mut self) -> AgentId {
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        id
    }

    // Adds an agent. While the host isn't active yet, the agent waits in
    // the pending list and starts when the host name is final.
    fn add_agent(&mut self, kind: AgentKind) -> AgentId {
        let id = self.allocate_agent_id();
        if self.state == State::Active {
            self.agents.insert(id, kind);
            self.start_agent(id);
        } else {
            self.agents_awaiting_start.push((id, kind));
        }
        id
    }

    fn start_agent(&mut self, id: AgentId) {
        let Some(host_full_name) = self.host_full_name.clone() else {
            debug_assert!(false, "agent started without a host name");
            return;
        };

        self.with_agent(id, |agent, ctx| {
            agent.as_agent_mut().start(&host_full_name, ctx);
        });
    }

    // Runs a closure against one agent, live or pending, with the context
    // pointed at it.
    fn with_agent<R>(
        &mut self,
        id: AgentId,
        f: impl FnOnce(&mut AgentKind, &mut AgentContext) -> R,
    ) -> Option<R> {
        if let Some(agent) = self.agents.get_mut(&id) {
            self.ctx.current = id;
            return Some(f(agent, &mut self.ctx));
        }

        if let Some((_, agent)) = self
            .agents_awaiting_start
            .iter_mut()
            .find(|(aid, _)| *aid == id)
        {
            self.ctx.current = id;
            return Some(f(agent, &mut self.ctx));
        }

        None
    }

    fn quit_agent(&mut self, id: AgentId) {
        self.with_agent(id, |agent, ctx| agent.as_agent_mut().quit(ctx));
    }

    fn remove_agent(&mut self, id: AgentId) {
        debug_assert!(!self.ctx.prohibit_removal);

        self.agents.remove(&id);
        self.agents_awaiting_start.retain(|(aid, _)| *aid != id);
        self.instance_subscribers_by_service_name
            .retain(|_, agent_id| *agent_id != id);
        self.instance_publishers_by_instance_full_name
            .retain(|_, entry| *entry != PublisherEntry::Active(id));

        // Tasks this agent posted are discarded when they pop.
    }

    // Distributes an inbound message: questions first, then each resource
    // section in order, then end-of-message. Questions are tagged with a
    // unicast reply address when the question asks for one or the sender's
    // source port isn't the mDNS port; otherwise replies accumulate for
    // multicast.
    fn receive_message(&mut self, message: &Message, reply_address: &ReplyAddress) {
        for question in &message.questions {
            let reply = if question.unicast_response
                || reply_address.socket_address().port() != self.ctx.addresses().port()
            {
                *reply_address
            } else {
                self.ctx.addresses().multicast_reply()
            };
            self.distribute_question(question, &reply, reply_address);
        }

        for resource in &message.answers {
            self.distribute_resource(resource, Section::Answer);
        }
        for resource in &message.authorities {
            self.distribute_resource(resource, Section::Authority);
        }
        for resource in &message.additionals {
            self.distribute_resource(resource, Section::Additional);
        }

        self.ctx.prohibit_removal = true;
        for (id, agent) in self.agents.iter_mut() {
            self.ctx.current = *id;
            agent.as_agent_mut().end_of_message(&mut self.ctx);
        }
        self.ctx.prohibit_removal = false;

        self.ctx.current = RENEWER_ID;
        self.renewer.end_of_message(&mut self.ctx);

        self.finish();
    }

    // The renewer never sees questions.
    fn distribute_question(
        &mut self,
        question: &Question,
        reply_address: &ReplyAddress,
        sender_address: &ReplyAddress,
    ) {
        self.ctx.prohibit_removal = true;
        for (id, agent) in self.agents.iter_mut() {
            self.ctx.current = *id;
            agent
                .as_agent_mut()
                .receive_question(question, reply_address, sender_address, &mut self.ctx);
        }
        self.ctx.prohibit_removal = false;
    }

    // The renewer is always first to see resources.
    fn distribute_resource(&mut self, resource: &ResourceRecord, section: Section) {
        self.ctx.current = RENEWER_ID;
        self.renewer.receive_resource(resource, section, &mut self.ctx);

        self.ctx.prohibit_removal = true;
        for (id, agent) in self.agents.iter_mut() {
            self.ctx.current = *id;
            agent
                .as_agent_mut()
                .receive_resource(resource, section, &mut self.ctx);
        }
        self.ctx.prohibit_removal = false;
    }

    // Runs tasks that have come due. Tasks whose agent is gone are
    // silently skipped.
    fn run_due_tasks(&mut self) {
        let now = self.ctx.now;

        while let Some((agent_id, token)) = self.ctx.tasks.pop_due(now) {
            if agent_id == RENEWER_ID {
                self.ctx.current = RENEWER_ID;
                self.renewer.wake(token, &mut self.ctx);
            } else if let Some(agent) = self.agents.get_mut(&agent_id) {
                self.ctx.current = agent_id;
                agent.as_agent_mut().wake(token, &mut self.ctx);
            }
        }

        self.finish();
    }

    // Processes the side effects agents queued during the last unit of
    // work: renewal registrations, agent removals, then events. Events can
    // produce more side effects, so this loops until everything settles.
    fn finish(&mut self) {
        loop {
            if self.ctx.renewals.is_empty()
                && self.ctx.removals.is_empty()
                && self.ctx.events.is_empty()
            {
                break;
            }

            let renewals = std::mem::take(&mut self.ctx.renewals);
            for resource in renewals {
                self.ctx.current = RENEWER_ID;
                self.renewer.renew(&resource, &mut self.ctx);
            }

            let removals = std::mem::take(&mut self.ctx.removals);
            for id in removals {
                self.remove_agent(id);
            }

            let events = std::mem::take(&mut self.ctx.events);
            for event in events {
                self.process_event(event);
            }
        }
    }

    fn process_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Expired(resource) => {
                self.ctx.prohibit_removal = true;
                for (id, agent) in self.agents.iter_mut() {
                    self.ctx.current = *id;
                    agent
                        .as_agent_mut()
                        .receive_resource(&resource, Section::Expired, &mut self.ctx);
                }
                self.ctx.prohibit_removal = false;
            }

            AgentEvent::AddressProbeComplete { success } => {
                if self.state != State::AddressProbeInProgress {
                    return;
                }

                if success {
                    self.on_ready();
                } else {
                    self.on_host_name_conflict();
                }
            }

            AgentEvent::InstanceProbeComplete { prober, success } => {
                let Some((instance_full_name, mut responder)) =
                    self.pending_instance_probes.remove(&prober)
                else {
                    return;
                };

                responder.report_success(success);

                if success {
                    let id = self.add_agent(AgentKind::InstanceResponder(responder));
                    self.instance_publishers_by_instance_full_name
                        .insert(instance_full_name, PublisherEntry::Active(id));
                } else {
                    self.instance_publishers_by_instance_full_name
                        .remove(&instance_full_name);
                }
            }
        }
    }

    // Drains the outbound accumulation map into one datagram per reply
    // address. Messages that carry no questions become authoritative
    // responses.
    fn take_outbound(&mut self) -> Vec<(ReplyAddress, Message)> {
        self.ctx
            .outbound
            .drain()
            .map(|(reply_address, mut message)| {
                if message.questions.is_empty() {
                    message.header.response = true;
                    message.header.authoritative = true;
                }
                (reply_address, message)
            })
            .collect()
    }

    fn resolve_host_name(
        &mut self,
        host_name: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<HostNameResult>> {
        names::check_host_name(host_name)?;

        if self.state != State::Active {
            return Err(Error::ErrNotReady);
        }

        let (sender, receiver) = oneshot::channel();
        let resolver = HostNameResolver::new(
            Name {
                data: names::local_host_full_name(host_name),
            },
            timeout,
            sender,
        );
        self.add_agent(AgentKind::HostNameResolver(resolver));

        Ok(receiver)
    }

    // Subscribes to a service. Subscriptions of one service share a single
    // requestor agent; the subscriber immediately hears about instances
    // that are already known.
    fn subscribe_to_service(
        &mut self,
        service_name: &str,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<u64> {
        names::check_service_name(service_name)?;

        if self.state == State::NotStarted {
            return Err(Error::ErrNotStarted);
        }

        let key = self.next_subscriber_key;
        self.next_subscriber_key += 1;

        let agent_id = match self.instance_subscribers_by_service_name.get(service_name) {
            Some(id) => *id,
            None => {
                let id = self.add_agent(AgentKind::InstanceRequestor(InstanceRequestor::new(
                    service_name,
                )));
                self.instance_subscribers_by_service_name
                    .insert(service_name.to_owned(), id);
                id
            }
        };

        self.with_agent(agent_id, |agent, _ctx| {
            if let Some(requestor) = agent.as_instance_requestor_mut() {
                requestor.add_subscriber(key, subscriber);
            }
        });

        Ok(key)
    }

    fn unsubscribe_from_service(&mut self, service_name: &str, key: u64) -> Result<()> {
        names::check_service_name(service_name)?;

        let Some(&agent_id) = self.instance_subscribers_by_service_name.get(service_name) else {
            return Err(Error::ErrNotSubscribed);
        };

        let now_empty = self
            .with_agent(agent_id, |agent, _ctx| {
                agent
                    .as_instance_requestor_mut()
                    .map(|requestor| requestor.remove_subscriber(key))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        if now_empty {
            // The last subscriber is gone.
            self.quit_agent(agent_id);
        }

        Ok(())
    }

    // Publishes a service instance, optionally probing for a conflicting
    // publication first. Fails if the instance is already published
    // locally.
    fn publish_service_instance(
        &mut self,
        service_name: &str,
        instance_name: &str,
        media: Media,
        perform_probe: bool,
        publisher: Box<dyn Publisher>,
    ) -> Result<()> {
        names::check_service_name(service_name)?;
        names::check_instance_name(instance_name)?;

        if self.state == State::NotStarted {
            return Err(Error::ErrNotStarted);
        }

        let instance_full_name = Name {
            data: names::local_instance_full_name(instance_name, service_name),
        };

        if self
            .instance_publishers_by_instance_full_name
            .contains_key(&instance_full_name)
        {
            return Err(Error::ErrDuplicatePublication);
        }

        let mut responder = InstanceResponder::new(service_name, instance_name, media, publisher);

        if perform_probe {
            // The port in the proposed SRV doesn't matter; the record only
            // resolves collisions.
            let prober_id = self.add_agent(AgentKind::InstanceProber(InstanceProber::new(
                instance_full_name.clone(),
                0,
            )));
            self.pending_instance_probes
                .insert(prober_id, (instance_full_name.clone(), responder));
            self.instance_publishers_by_instance_full_name
                .insert(instance_full_name, PublisherEntry::Probing(prober_id));
        } else {
            responder.report_success(true);
            let id = self.add_agent(AgentKind::InstanceResponder(responder));
            self.instance_publishers_by_instance_full_name
                .insert(instance_full_name, PublisherEntry::Active(id));
        }

        Ok(())
    }

    fn unpublish_service_instance(
        &mut self,
        service_name: &str,
        instance_name: &str,
    ) -> Result<()> {
        names::check_service_name(service_name)?;
        names::check_instance_name(instance_name)?;

        let instance_full_name = Name {
            data: names::local_instance_full_name(instance_name, service_name),
        };

        match self
            .instance_publishers_by_instance_full_name
            .remove(&instance_full_name)
        {
            Some(PublisherEntry::Active(id)) => {
                self.quit_agent(id);
                Ok(())
            }
            Some(PublisherEntry::Probing(prober_id)) => {
                self.pending_instance_probes.remove(&prober_id);
                self.quit_agent(prober_id);
                Ok(())
            }
            None => Err(Error::ErrNotPublished),
        }
    }

    fn set_subtypes(
        &mut self,
        service_name: &str,
        instance_name: &str,
        subtypes: Vec<String>,
    ) -> Result<()> {
        for subtype in &subtypes {
            names::check_subtype_name(subtype)?;
        }

        self.with_instance_responder(service_name, instance_name, |responder, ctx| {
            responder.set_subtypes(subtypes, ctx);
        })
    }

    fn reannounce(&mut self, service_name: &str, instance_name: &str) -> Result<()> {
        self.with_instance_responder(service_name, instance_name, |responder, ctx| {
            responder.reannounce(ctx);
        })
    }

    fn with_instance_responder(
        &mut self,
        service_name: &str,
        instance_name: &str,
        f: impl FnOnce(&mut InstanceResponder, &mut AgentContext),
    ) -> Result<()> {
        names::check_service_name(service_name)?;
        names::check_instance_name(instance_name)?;

        let instance_full_name = Name {
            data: names::local_instance_full_name(instance_name, service_name),
        };

        match self
            .instance_publishers_by_instance_full_name
            .get(&instance_full_name)
        {
            Some(PublisherEntry::Active(id)) => {
                let id = *id;
                self.with_agent(id, |agent, ctx| {
                    if let Some(responder) = agent.as_instance_responder_mut() {
                        f(responder, ctx);
                    }
                });
                Ok(())
            }
            Some(PublisherEntry::Probing(prober_id)) => {
                let prober_id = *prober_id;
                if let Some((_, responder)) = self.pending_instance_probes.get_mut(&prober_id) {
                    f(responder, &mut self.ctx);
                }
                Ok(())
            }
            None => Err(Error::ErrNotPublished),
        }
    }
}

struct Inner {
    core: Mutex<Core>,
    transceiver: Transceiver,
    notify: Notify,
    close_tx: Mutex<Option<mpsc::Sender<()>>>,
}

// The mDNS engine handle. One engine publishes and discovers service
// instances and resolves host names on the local subnet, per RFC 6762.
// Handles are cheap to clone and share one engine.
#[derive(Clone)]
pub struct Mdns {
    inner: Arc<Inner>,
}

impl Default for Mdns {
    fn default() -> Self {
        Mdns::new(AddressBook::default())
    }
}

impl Mdns {
    pub fn new(addresses: AddressBook) -> Self {
        Mdns {
            inner: Arc::new(Inner {
                core: Mutex::new(Core::new(addresses)),
                transceiver: Transceiver::new(addresses),
                notify: Notify::new(),
                close_tx: Mutex::new(None),
            }),
        }
    }

    // Starts the engine. interfaces is the interface-enumeration event
    // stream; each event carries the full current set of NIC addresses.
    // The returned channel yields the established host name once the
    // engine is ready for resolve, subscribe and publish calls. The
    // established name is host_name, possibly deduplicated with a numeric
    // suffix if perform_address_probe is true and conflicts were found.
    pub async fn start(
        &self,
        interfaces: mpsc::Receiver<Vec<InterfaceInfo>>,
        host_name: &str,
        perform_address_probe: bool,
    ) -> Result<oneshot::Receiver<String>> {
        names::check_host_name(host_name)?;

        let (ready_tx, ready_rx) = oneshot::channel();

        {
            let mut core = self.inner.core.lock().unwrap();
            if core.state != State::NotStarted {
                return Err(Error::ErrAlreadyStarted);
            }
            core.ctx.now = Instant::now();
            core.start(host_name, perform_address_probe, ready_tx);
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (close_tx, close_rx) = mpsc::channel(1);
        *self.inner.close_tx.lock().unwrap() = Some(close_tx);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            dispatch(inner, interfaces, inbound_rx, inbound_tx, close_rx).await;
        });

        Ok(ready_rx)
    }

    // Stops the engine: shuts the transceiver down, drops the ready
    // channel and returns to the not-started state.
    pub async fn stop(&self) {
        let close_tx = self.inner.close_tx.lock().unwrap().take();
        if let Some(close_tx) = close_tx {
            let _ = close_tx.send(()).await;
        }

        self.inner.transceiver.stop();
        self.inner.core.lock().unwrap().stop();
    }

    // The host name currently in use. May differ from the name passed to
    // start if address probing detected conflicts.
    pub fn host_name(&self) -> Option<String> {
        self.inner.core.lock().unwrap().host_name.clone()
    }

    // Resolves a host name to its v4/v6 addresses, waiting at most
    // timeout. Requires the ready callback to have fired.
    pub async fn resolve_host_name(
        &self,
        host_name: &str,
        timeout: Duration,
    ) -> Result<(Option<Ipv4Addr>, Option<Ipv6Addr>)> {
        let receiver = drive(&self.inner, |core| {
            core.resolve_host_name(host_name, timeout)
        })
        .await?;

        receiver
            .await
            .map_err(|_| Error::Other("host name resolution abandoned".to_owned()))
    }

    // Subscribes to a service. The returned key identifies the
    // subscription for unsubscribe_from_service.
    pub async fn subscribe_to_service(
        &self,
        service_name: &str,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<u64> {
        drive(&self.inner, |core| {
            core.subscribe_to_service(service_name, subscriber)
        })
        .await
    }

    pub async fn unsubscribe_from_service(&self, service_name: &str, key: u64) -> Result<()> {
        drive(&self.inner, |core| {
            core.unsubscribe_from_service(service_name, key)
        })
        .await
    }

    // Publishes a service instance. Fails with ErrDuplicatePublication if
    // the instance is already published locally. The publisher's
    // report_success tells whether probing (if requested) found the
    // instance to be unique.
    pub async fn publish_service_instance(
        &self,
        service_name: &str,
        instance_name: &str,
        media: Media,
        perform_probe: bool,
        publisher: Box<dyn Publisher>,
    ) -> Result<()> {
        drive(&self.inner, |core| {
            core.publish_service_instance(
                service_name,
                instance_name,
                media,
                perform_probe,
                publisher,
            )
        })
        .await
    }

    // Unpublishes a service instance, saying goodbye for it.
    pub async fn unpublish_service_instance(
        &self,
        service_name: &str,
        instance_name: &str,
    ) -> Result<()> {
        drive(&self.inner, |core| {
            core.unpublish_service_instance(service_name, instance_name)
        })
        .await
    }

    // Replaces the subtypes of a published instance. Removed subtypes are
    // retracted with ttl-zero records, and the announcement sequence
    // restarts.
    pub async fn set_subtypes(
        &self,
        service_name: &str,
        instance_name: &str,
        subtypes: Vec<String>,
    ) -> Result<()> {
        drive(&self.inner, |core| {
            core.set_subtypes(service_name, instance_name, subtypes)
        })
        .await
    }

    // Restarts the announcement sequence of a published instance.
    pub async fn reannounce(&self, service_name: &str, instance_name: &str) -> Result<()> {
        drive(&self.inner, |core| {
            core.reannounce(service_name, instance_name)
        })
        .await
    }
}

// Runs one unit of work against the core, then performs the sends it
// accumulated and re-arms the dispatcher timer. The lock is never held
// across an await.
async fn drive<R>(inner: &Arc<Inner>, f: impl FnOnce(&mut Core) -> R) -> R {
    let (result, outbound) = {
        let mut core = inner.core.lock().unwrap();
        core.ctx.now = Instant::now();
        let result = f(&mut core);
        core.finish();
        (result, core.take_outbound())
    };

    inner.transceiver.send_all(outbound).await;
    inner.notify.notify_one();

    result
}

// The dispatcher: drives the core from interface-enumeration events,
// inbound messages and the task-queue clock until the close channel fires.
async fn dispatch(
    inner: Arc<Inner>,
    mut interfaces: mpsc::Receiver<Vec<InterfaceInfo>>,
    mut inbound_rx: mpsc::Receiver<(Message, ReplyAddress)>,
    inbound_tx: mpsc::Sender<(Message, ReplyAddress)>,
    mut close_rx: mpsc::Receiver<()>,
) {
    let mut interfaces_open = true;

    loop {
        let wake_at = {
            let core = inner.core.lock().unwrap();
            core.ctx.tasks.next_time()
        }
        .unwrap_or_else(|| Instant::now() + Duration::from_secs(60 * 60));

        tokio::select! {
            _ = close_rx.recv() => {
                return;
            }

            _ = inner.notify.notified() => {
                // An earlier task may have been posted; recompute the
                // wake-up time.
            }

            infos = interfaces.recv(), if interfaces_open => {
                match infos {
                    Some(infos) => {
                        let host_full_name = inner.core.lock().unwrap().host_full_name.clone();
                        let link_change = inner
                            .transceiver
                            .update_interfaces(&infos, host_full_name.as_ref(), &inbound_tx)
                            .await;
                        if link_change {
                            let has_interfaces = inner.transceiver.has_interfaces();
                            drive(&inner, |core| core.on_link_change(has_interfaces)).await;
                        }
                    }
                    None => interfaces_open = false,
                }
            }

            inbound = inbound_rx.recv() => {
                if let Some((message, reply_address)) = inbound {
                    if inner
                        .transceiver
                        .is_local_interface_address(reply_address.socket_address().ip())
                    {
                        // One of our own messages, received on another
                        // interface.
                        continue;
                    }

                    log::trace!("inbound message from {reply_address}: {message}");
                    drive(&inner, |core| core.receive_message(&message, &reply_address)).await;
                }
            }

            _ = sleep_until(wake_at) => {
                drive(&inner, |core| core.run_due_tasks()).await;
            }
        }
    }
}
