use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;

use crate::address_book::AddressBook;
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::Message;
use crate::reply_address::ReplyAddress;

// The section of a DNS message a resource record was found in. Expired is
// not a real section; it marks the ttl-zero records the renewal layer
// distributes locally when a renewal fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Section {
    Answer,
    Authority,
    Additional,
    Expired,
}

// Identifies an agent for task posting and removal. Identifiers are never
// reused within one engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct AgentId(pub(crate) u64);

// The resource renewer participates in resource distribution and task
// scheduling like an agent but lives outside the agent map.
pub(crate) const RENEWER_ID: AgentId = AgentId(0);

// An agent drives one specialized slice of mDNS question and record
// traffic. Agents that have been started receive all inbound questions and
// resource records; when a whole message has been distributed, each agent
// gets an end_of_message call. Anything an agent sends accumulates in the
// context's per-reply-address outbound map; the engine flushes that map
// into one datagram per reply address after agent start, inbound message
// processing, agent removal and task execution.
pub(crate) trait Agent: Send {
    fn start(&mut self, host_full_name: &Name, ctx: &mut AgentContext);

    fn receive_question(
        &mut self,
        _question: &Question,
        _reply_address: &ReplyAddress,
        _sender_address: &ReplyAddress,
        _ctx: &mut AgentContext,
    ) {
    }

    fn receive_resource(
        &mut self,
        _resource: &ResourceRecord,
        _section: Section,
        _ctx: &mut AgentContext,
    ) {
    }

    fn end_of_message(&mut self, _ctx: &mut AgentContext) {}

    // Runs a task previously posted through the context. The token is
    // whatever the agent passed to post_task_at; its meaning is private to
    // the agent.
    fn wake(&mut self, _token: u64, _ctx: &mut AgentContext) {}

    // Tells the agent to quit. Agents override this to say goodbye first;
    // every override ends by calling ctx.remove_self().
    fn quit(&mut self, ctx: &mut AgentContext) {
        ctx.remove_self();
    }
}

// Side effects agents hand back to the engine for processing once the
// current unit of work completes.
pub(crate) enum AgentEvent {
    AddressProbeComplete { success: bool },
    InstanceProbeComplete { prober: AgentId, success: bool },
    Expired(ResourceRecord),
}

#[derive(Debug)]
struct TaskEntry {
    time: Instant,
    seq: u64,
    agent: AgentId,
    token: u64,
}

impl PartialEq for TaskEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for TaskEntry {}

impl PartialOrd for TaskEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskEntry {
    // Reversed so the BinaryHeap pops the earliest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

// Time-ordered task queue. Entries of removed agents are discarded lazily
// when they are popped.
#[derive(Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<TaskEntry>,
    next_seq: u64,
}

impl TaskQueue {
    pub(crate) fn post(&mut self, agent: AgentId, token: u64, time: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TaskEntry {
            time,
            seq,
            agent,
            token,
        });
    }

    pub(crate) fn next_time(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.time)
    }

    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<(AgentId, u64)> {
        if self.heap.peek().map(|e| e.time <= now).unwrap_or(false) {
            self.heap.pop().map(|e| (e.agent, e.token))
        } else {
            None
        }
    }
}

// AgentContext is the engine surface agents work against: the clock, the
// address book, the outbound accumulation map, the task queue, and queues
// of deferred side effects (removals, renewal registrations, events). The
// engine processes the deferred queues after each unit of work, which is
// what keeps the agent set stable while a message is being distributed.
pub(crate) struct AgentContext {
    pub(crate) now: Instant,
    pub(crate) current: AgentId,
    pub(crate) addresses: AddressBook,
    pub(crate) address_placeholder: Option<ResourceRecord>,
    pub(crate) outbound: HashMap<ReplyAddress, Message>,
    pub(crate) tasks: TaskQueue,
    pub(crate) removals: Vec<AgentId>,
    pub(crate) renewals: Vec<ResourceRecord>,
    pub(crate) events: Vec<AgentEvent>,
    pub(crate) prohibit_removal: bool,
}

impl AgentContext {
    pub(crate) fn new(addresses: AddressBook) -> Self {
        AgentContext {
            now: Instant::now(),
            current: RENEWER_ID,
            addresses,
            address_placeholder: None,
            outbound: HashMap::new(),
            tasks: TaskQueue::default(),
            removals: vec![],
            renewals: vec![],
            events: vec![],
            prohibit_removal: false,
        }
    }

    pub(crate) fn now(&self) -> Instant {
        self.now
    }

    pub(crate) fn addresses(&self) -> &AddressBook {
        &self.addresses
    }

    pub(crate) fn set_host_full_name(&mut self, host_full_name: &Name) {
        self.address_placeholder = Some(ResourceRecord::new(
            host_full_name.clone(),
            RData::AddressPlaceholder,
        ));
    }

    // Posts a task for the calling agent. Tasks posted by agents that have
    // since been removed are not executed.
    pub(crate) fn post_task_at(&mut self, token: u64, time: Instant) {
        let agent = self.current;
        self.tasks.post(agent, token, time);
    }

    // Sends a question to the multicast address.
    pub(crate) fn send_question(&mut self, question: Question) {
        let reply_address = self.addresses.multicast_reply();
        self.outbound
            .entry(reply_address)
            .or_default()
            .questions
            .push(question);
    }

    // Sends a resource to the specified address. Expirations are not real
    // traffic; they are queued for local distribution to all agents.
    pub(crate) fn send_resource(
        &mut self,
        resource: ResourceRecord,
        section: Section,
        reply_address: &ReplyAddress,
    ) {
        if section == Section::Expired {
            self.events.push(AgentEvent::Expired(resource));
            return;
        }

        let message = self.outbound.entry(*reply_address).or_default();
        match section {
            Section::Answer => message.answers.push(resource),
            Section::Authority => message.authorities.push(resource),
            Section::Additional => message.additionals.push(resource),
            Section::Expired => unreachable!(),
        }
    }

    // Sends the address placeholder to the specified address. The interface
    // transceiver substitutes the real A/AAAA records of the outgoing
    // interface.
    pub(crate) fn send_addresses(&mut self, section: Section, reply_address: &ReplyAddress) {
        debug_assert!(self.address_placeholder.is_some());
        if let Some(placeholder) = self.address_placeholder.clone() {
            self.send_resource(placeholder, section, reply_address);
        }
    }

    // Registers the resource for renewal. Before the resource's TTL
    // expires, queries for it are issued; if they all go unanswered, every
    // agent receives a matching record with a TTL of zero in the Expired
    // section. Renewal is transient: an agent keeps a resource alive by
    // renewing each incoming copy and loses interest by simply not renewing.
    pub(crate) fn renew(&mut self, resource: &ResourceRecord) {
        debug_assert!(resource.ttl != 0);
        self.renewals.push(resource.clone());
    }

    // Removes the calling agent once the current unit of work completes,
    // discarding its pending tasks.
    pub(crate) fn remove_self(&mut self) {
        let agent = self.current;
        self.removals.push(agent);
    }

    pub(crate) fn complete_address_probe(&mut self, success: bool) {
        self.events.push(AgentEvent::AddressProbeComplete { success });
    }

    pub(crate) fn complete_instance_probe(&mut self, success: bool) {
        let prober = self.current;
        self.events
            .push(AgentEvent::InstanceProbeComplete { prober, success });
    }
}
