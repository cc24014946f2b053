use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::time::{Duration, Instant};

use crate::agent::{Agent, AgentContext, Section};
use crate::mdns::{Publication, Publisher};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord, SHORT_TTL};
use crate::message::DnsType;
use crate::names;
use crate::reply_address::{Media, ReplyAddress};

const INITIAL_ANNOUNCEMENT_INTERVAL: Duration = Duration::from_secs(1);
const MAX_ANNOUNCEMENT_INTERVAL: Duration = Duration::from_secs(4);
const MIN_MULTICAST_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

// Sender addresses only accumulate while a multicast response is being
// throttled, so this limit is rarely approached.
const MAX_SENDER_ADDRESSES: usize = 64;

// Per-subtype multicast throttle state: either a send is already scheduled,
// or this is when the last multicast response for the subtype went out.
enum ThrottleState {
    Pending,
    SentAt(Instant),
}

enum Task {
    Announce,
    ThrottledSend {
        subtype: String,
        reply_address: ReplyAddress,
    },
    IdleCheck {
        subtype: String,
    },
}

// Publishes one service instance: announces it on start (and reannounce),
// answers matching questions with publications obtained from the
// client-supplied publisher, throttles multicast responses to one per
// second per subtype, and says goodbye on quit.
pub(crate) struct InstanceResponder {
    service_name: String,
    instance_full_name: Name,
    media: Media,
    publisher: Box<dyn Publisher>,
    subtypes: Vec<String>,
    host_full_name: Option<Name>,
    announcement_interval: Duration,
    throttle_state_by_subtype: HashMap<String, ThrottleState>,
    sender_addresses: Vec<SocketAddr>,
    tasks: HashMap<u64, Task>,
    next_token: u64,
}

impl InstanceResponder {
    pub(crate) fn new(
        service_name: &str,
        instance_name: &str,
        media: Media,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        InstanceResponder {
            service_name: service_name.to_owned(),
            instance_full_name: Name {
                data: names::local_instance_full_name(instance_name, service_name),
            },
            media,
            publisher,
            subtypes: vec![],
            host_full_name: None,
            announcement_interval: INITIAL_ANNOUNCEMENT_INTERVAL,
            throttle_state_by_subtype: HashMap::new(),
            sender_addresses: Vec::new(),
            tasks: HashMap::new(),
            next_token: 1,
        }
    }

    fn started(&self) -> bool {
        self.host_full_name.is_some()
    }

    pub(crate) fn report_success(&mut self, success: bool) {
        self.publisher.report_success(success);
    }

    pub(crate) fn set_subtypes(&mut self, subtypes: Vec<String>, ctx: &mut AgentContext) {
        if !self.started() {
            // Can't announce yet, and no subtypes have been announced, so
            // there is nothing to retract. Start will reannounce.
            self.subtypes = subtypes;
            return;
        }

        // The first announcement retracts the removed subtypes with
        // ttl-zero PTR records.
        let multicast_reply = self.multicast_reply(ctx);
        for subtype in self.subtypes.clone() {
            if !subtypes.contains(&subtype) {
                self.send_subtype_ptr_record(&subtype, 0, &multicast_reply, ctx);
            }
        }

        self.subtypes = subtypes;

        self.reannounce(ctx);
    }

    // Initiates four announcements with intervals of 1, 2 and 4 seconds. If
    // announcements were already underway, the sequence restarts now.
    pub(crate) fn reannounce(&mut self, ctx: &mut AgentContext) {
        if !self.started() {
            // Start will call reannounce.
            return;
        }

        self.announcement_interval = INITIAL_ANNOUNCEMENT_INTERVAL;
        self.send_announcement(ctx);
    }

    fn post_task(&mut self, task: Task, at: Instant, ctx: &mut AgentContext) {
        let token = self.next_token;
        self.next_token += 1;
        self.tasks.insert(token, task);
        ctx.post_task_at(token, at);
    }

    fn send_announcement(&mut self, ctx: &mut AgentContext) {
        let multicast_reply = self.multicast_reply(ctx);
        self.get_and_send_publication(false, "", &multicast_reply, ctx);

        for subtype in self.subtypes.clone() {
            self.send_subtype_ptr_record(&subtype, SHORT_TTL, &multicast_reply, ctx);
        }

        if self.announcement_interval > MAX_ANNOUNCEMENT_INTERVAL {
            return;
        }

        let at = ctx.now() + self.announcement_interval;
        self.post_task(Task::Announce, at, ctx);

        self.announcement_interval *= 2;
    }

    fn log_sender_address(&mut self, sender_address: &ReplyAddress) {
        if self.sender_addresses.len() == MAX_SENDER_ADDRESSES {
            return;
        }

        self.sender_addresses.push(sender_address.socket_address());
    }

    fn maybe_get_and_send_publication(
        &mut self,
        subtype: String,
        reply_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        // Only multicast sends are throttled.
        if ctx.addresses().is_multicast_reply(reply_address) {
            let last_sent = match self.throttle_state_by_subtype.get(&subtype) {
                Some(ThrottleState::Pending) => {
                    // The send is already happening.
                    return;
                }
                Some(ThrottleState::SentAt(last)) => Some(*last),
                None => None,
            };

            // Either the send happens now or it gets scheduled; in both
            // cases a send is pending.
            self.throttle_state_by_subtype
                .insert(subtype.clone(), ThrottleState::Pending);

            if let Some(last) = last_sent {
                if last + MIN_MULTICAST_INTERVAL > ctx.now() {
                    // A multicast publication of this subtype went out less
                    // than a second ago; schedule this one a second after
                    // the previous one.
                    self.post_task(
                        Task::ThrottledSend {
                            subtype,
                            reply_address: *reply_address,
                        },
                        last + MIN_MULTICAST_INTERVAL,
                        ctx,
                    );
                    return;
                }
            }
        }

        self.get_and_send_publication(true, &subtype, reply_address, ctx);
    }

    fn get_and_send_publication(
        &mut self,
        query: bool,
        subtype: &str,
        reply_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        let publication =
            self.publisher
                .get_publication(query, subtype, &self.sender_addresses);
        self.sender_addresses.clear();

        let multicast = ctx.addresses().is_multicast_reply(reply_address);

        let Some(publication) = publication else {
            // Nothing to send for this tick. Don't leave the subtype's
            // throttle stuck in the pending state.
            if query && multicast {
                if let Some(ThrottleState::Pending) =
                    self.throttle_state_by_subtype.get(subtype)
                {
                    self.throttle_state_by_subtype.remove(subtype);
                }
            }
            return;
        };

        self.send_publication(&publication, subtype, reply_address, ctx);

        if query && multicast {
            self.throttle_state_by_subtype
                .insert(subtype.to_owned(), ThrottleState::SentAt(ctx.now()));
            // Clean the entry up later so the map doesn't grow without
            // bound across subtypes.
            let at = ctx.now() + IDLE_CHECK_INTERVAL;
            self.post_task(
                Task::IdleCheck {
                    subtype: subtype.to_owned(),
                },
                at,
                ctx,
            );
        }
    }

    fn send_publication(
        &mut self,
        publication: &Publication,
        subtype: &str,
        reply_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        let Some(host_full_name) = self.host_full_name.clone() else {
            return;
        };

        if !subtype.is_empty() {
            self.send_subtype_ptr_record(subtype, publication.ptr_ttl, reply_address, ctx);
        }

        let mut ptr_resource = ResourceRecord::new(
            Name {
                data: names::local_service_full_name(&self.service_name),
            },
            RData::Ptr(self.instance_full_name.clone()),
        );
        ptr_resource.ttl = publication.ptr_ttl;
        ctx.send_resource(ptr_resource, Section::Answer, reply_address);

        let mut srv_resource = ResourceRecord::new(
            self.instance_full_name.clone(),
            RData::Srv {
                priority: publication.srv_priority,
                weight: publication.srv_weight,
                port: publication.port,
                target: host_full_name,
            },
        );
        srv_resource.ttl = publication.srv_ttl;
        ctx.send_resource(srv_resource, Section::Additional, reply_address);

        let mut txt_resource = ResourceRecord::new(
            self.instance_full_name.clone(),
            RData::Txt(publication.text.clone()),
        );
        txt_resource.ttl = publication.txt_ttl;
        ctx.send_resource(txt_resource, Section::Additional, reply_address);

        ctx.send_addresses(Section::Additional, reply_address);
    }

    fn send_subtype_ptr_record(
        &self,
        subtype: &str,
        ttl: u32,
        reply_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        debug_assert!(!subtype.is_empty());

        let mut ptr_resource = ResourceRecord::new(
            Name {
                data: names::local_service_subtype_full_name(&self.service_name, subtype),
            },
            RData::Ptr(self.instance_full_name.clone()),
        );
        ptr_resource.ttl = ttl;
        ctx.send_resource(ptr_resource, Section::Answer, reply_address);
    }

    // Responds to a query for all services on the subnet with a PTR from
    // the service-enumeration name to this responder's service. The
    // publisher is not consulted.
    fn send_any_service_response(&self, reply_address: &ReplyAddress, ctx: &mut AgentContext) {
        let ptr_resource = ResourceRecord::new(
            Name {
                data: names::ANY_SERVICE_FULL_NAME.to_owned(),
            },
            RData::Ptr(Name {
                data: names::local_service_full_name(&self.service_name),
            }),
        );
        ctx.send_resource(ptr_resource, Section::Answer, reply_address);
    }

    fn send_goodbye(&mut self, ctx: &mut AgentContext) {
        let publication = Publication {
            ptr_ttl: 0,
            srv_ttl: 0,
            txt_ttl: 0,
            ..Publication::new(0)
        };

        let multicast_reply = self.multicast_reply(ctx);
        self.send_publication(&publication, "", &multicast_reply, ctx);
    }

    fn idle_check(&mut self, subtype: &str, ctx: &mut AgentContext) {
        if let Some(ThrottleState::SentAt(last)) = self.throttle_state_by_subtype.get(subtype) {
            if *last + MIN_MULTICAST_INTERVAL < ctx.now() {
                self.throttle_state_by_subtype.remove(subtype);
            }
        }
    }

    // The multicast reply address narrowed to this responder's media.
    fn multicast_reply(&self, ctx: &AgentContext) -> ReplyAddress {
        match self.media {
            Media::Wired => ctx.addresses().multicast_reply_wired_only(),
            Media::Wireless => ctx.addresses().multicast_reply_wireless_only(),
            Media::Both => ctx.addresses().multicast_reply(),
        }
    }
}

impl Agent for InstanceResponder {
    fn start(&mut self, host_full_name: &Name, ctx: &mut AgentContext) {
        debug_assert!(!host_full_name.data.is_empty());

        self.host_full_name = Some(host_full_name.clone());

        self.reannounce(ctx);
    }

    fn receive_question(
        &mut self,
        question: &Question,
        reply_address: &ReplyAddress,
        sender_address: &ReplyAddress,
        ctx: &mut AgentContext,
    ) {
        if self.media != Media::Both && sender_address.media() != self.media {
            // Question received on an unsupported medium. Ignore.
            return;
        }

        // A multicast reply from a media-restricted responder goes out
        // narrowed to that responder's media.
        let reply_address = if ctx.addresses().is_multicast_reply(reply_address) {
            self.multicast_reply(ctx)
        } else {
            *reply_address
        };

        let name = &question.name.data;

        match question.typ {
            DnsType::Ptr => {
                if let Some(subtype) = names::match_service_name(name, &self.service_name) {
                    self.log_sender_address(sender_address);
                    self.maybe_get_and_send_publication(subtype, &reply_address, ctx);
                } else if name.eq_ignore_ascii_case(names::ANY_SERVICE_FULL_NAME) {
                    self.send_any_service_response(&reply_address, ctx);
                }
            }
            DnsType::Srv | DnsType::Txt => {
                if question.name == self.instance_full_name {
                    self.log_sender_address(sender_address);
                    self.maybe_get_and_send_publication(String::new(), &reply_address, ctx);
                }
            }
            DnsType::Any => {
                if question.name == self.instance_full_name {
                    self.log_sender_address(sender_address);
                    self.maybe_get_and_send_publication(String::new(), &reply_address, ctx);
                } else if let Some(subtype) = names::match_service_name(name, &self.service_name) {
                    self.log_sender_address(sender_address);
                    self.maybe_get_and_send_publication(subtype, &reply_address, ctx);
                }
            }
            _ => {}
        }
    }

    fn wake(&mut self, token: u64, ctx: &mut AgentContext) {
        match self.tasks.remove(&token) {
            Some(Task::Announce) => self.send_announcement(ctx),
            Some(Task::ThrottledSend {
                subtype,
                reply_address,
            }) => self.get_and_send_publication(true, &subtype, &reply_address, ctx),
            Some(Task::IdleCheck { subtype }) => self.idle_check(&subtype, ctx),
            None => {}
        }
    }

    fn quit(&mut self, ctx: &mut AgentContext) {
        if self.started() {
            self.send_goodbye(ctx);
        }

        ctx.remove_self();
    }
}
