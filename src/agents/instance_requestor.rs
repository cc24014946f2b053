use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::time::Duration;

use crate::agent::{Agent, AgentContext, Section};
use crate::mdns::Subscriber;
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;
use crate::names;

const QUERY: u64 = 1;

const MAX_QUERY_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Default)]
struct InstanceInfo {
    instance_name: String,
    target: Option<Name>,
    port: u16,
    text: Vec<String>,
    srv_priority: u16,
    srv_weight: u16,
    new: bool,
    dirty: bool,
}

#[derive(Default)]
struct TargetInfo {
    v4_address: Option<Ipv4Addr>,
    v6_address: Option<Ipv6Addr>,
    keep: bool,
    dirty: bool,
}

// Discovers and maintains the set of instances of one service on the link,
// and notifies the attached subscribers of discoveries, changes and losses.
// All attached subscribers share one requestor; the requestor quits when
// the last one detaches.
pub(crate) struct InstanceRequestor {
    service_name: String,
    service_full_name: Name,
    subscribers: HashMap<u64, Box<dyn Subscriber>>,
    instance_infos_by_full_name: HashMap<Name, InstanceInfo>,
    target_infos_by_full_name: HashMap<Name, TargetInfo>,
    query_delay: Duration,
}

impl InstanceRequestor {
    pub(crate) fn new(service_name: &str) -> Self {
        InstanceRequestor {
            service_name: service_name.to_owned(),
            service_full_name: Name {
                data: names::local_service_full_name(service_name),
            },
            subscribers: HashMap::new(),
            instance_infos_by_full_name: HashMap::new(),
            target_infos_by_full_name: HashMap::new(),
            query_delay: Duration::ZERO,
        }
    }

    pub(crate) fn add_subscriber(&mut self, key: u64, subscriber: Box<dyn Subscriber>) {
        self.subscribers.insert(key, subscriber);
        self.report_all_discoveries(key);
    }

    // Removes a subscriber. Returns true when the subscriber set became
    // empty, in which case the caller quits this agent.
    pub(crate) fn remove_subscriber(&mut self, key: u64) -> bool {
        self.subscribers.remove(&key);
        self.subscribers.is_empty()
    }

    // Replays the known instances to a newly attached subscriber so it
    // never misses instances discovered before it arrived.
    fn report_all_discoveries(&mut self, key: u64) {
        let service_name = self.service_name.clone();
        let mut discoveries = vec![];

        for instance_info in self.instance_infos_by_full_name.values() {
            let Some(target) = &instance_info.target else {
                // No SRV record seen for this instance yet.
                continue;
            };

            let Some(target_info) = self.target_infos_by_full_name.get(target) else {
                continue;
            };

            if target_info.v4_address.is_none() && target_info.v6_address.is_none() {
                // No addresses yet.
                continue;
            }

            discoveries.push((
                instance_info.instance_name.clone(),
                socket_address_v4(target_info, instance_info.port),
                socket_address_v6(target_info, instance_info.port),
                instance_info.text.clone(),
                instance_info.srv_priority,
                instance_info.srv_weight,
            ));
        }

        if let Some(subscriber) = self.subscribers.get_mut(&key) {
            for (instance, v4, v6, text, priority, weight) in discoveries {
                subscriber
                    .instance_discovered(&service_name, &instance, v4, v6, &text, priority, weight);
            }
        }
    }

    fn send_query(&mut self, ctx: &mut AgentContext) {
        ctx.send_question(Question::new(self.service_full_name.clone(), DnsType::Ptr));

        if self.query_delay == Duration::ZERO {
            self.query_delay = Duration::from_secs(1);
        } else {
            self.query_delay *= 2;
            if self.query_delay > MAX_QUERY_INTERVAL {
                self.query_delay = MAX_QUERY_INTERVAL;
            }
        }

        let at = ctx.now() + self.query_delay;
        ctx.post_task_at(QUERY, at);
    }

    fn receive_ptr_resource(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        let RData::Ptr(instance_full_name) = &resource.rdata else {
            return;
        };

        let Some(instance_name) =
            names::extract_instance_name(&instance_full_name.data, &self.service_name)
        else {
            return;
        };

        if resource.ttl == 0 {
            self.remove_instance(instance_full_name);
            return;
        }

        self.instance_infos_by_full_name
            .entry(instance_full_name.clone())
            .or_insert_with(|| InstanceInfo {
                instance_name,
                new: true,
                ..Default::default()
            });

        ctx.renew(resource);
    }

    fn receive_srv_resource(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        if resource.ttl == 0 {
            self.remove_instance(&resource.name);
            return;
        }

        let RData::Srv {
            priority,
            weight,
            port,
            target,
        } = &resource.rdata
        else {
            return;
        };

        let Some(instance_info) = self.instance_infos_by_full_name.get_mut(&resource.name) else {
            return;
        };

        if instance_info.target.as_ref() != Some(target) {
            instance_info.target = Some(target.clone());
            instance_info.dirty = true;

            self.target_infos_by_full_name
                .entry(target.clone())
                .or_default();
        }

        if instance_info.srv_priority != *priority {
            instance_info.srv_priority = *priority;
            instance_info.dirty = true;
        }

        if instance_info.srv_weight != *weight {
            instance_info.srv_weight = *weight;
            instance_info.dirty = true;
        }

        if instance_info.port != *port {
            instance_info.port = *port;
            instance_info.dirty = true;
        }

        ctx.renew(resource);
    }

    fn receive_txt_resource(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        let Some(instance_info) = self.instance_infos_by_full_name.get_mut(&resource.name) else {
            return;
        };

        if resource.ttl == 0 {
            if !instance_info.text.is_empty() {
                instance_info.text.clear();
                instance_info.dirty = true;
            }
            return;
        }

        let RData::Txt(strings) = &resource.rdata else {
            return;
        };

        if instance_info.text != *strings {
            instance_info.text = strings.clone();
            instance_info.dirty = true;
        }

        ctx.renew(resource);
    }

    fn receive_a_resource(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        let Some(target_info) = self.target_infos_by_full_name.get_mut(&resource.name) else {
            return;
        };

        if resource.ttl == 0 {
            if target_info.v4_address.is_some() {
                target_info.v4_address = None;
                target_info.dirty = true;
            }
            return;
        }

        let RData::A(address) = resource.rdata else {
            return;
        };

        if target_info.v4_address != Some(address) {
            target_info.v4_address = Some(address);
            target_info.dirty = true;
        }

        ctx.renew(resource);
    }

    fn receive_aaaa_resource(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        let Some(target_info) = self.target_infos_by_full_name.get_mut(&resource.name) else {
            return;
        };

        if resource.ttl == 0 {
            if target_info.v6_address.is_some() {
                target_info.v6_address = None;
                target_info.dirty = true;
            }
            return;
        }

        let RData::Aaaa(address) = resource.rdata else {
            return;
        };

        if target_info.v6_address != Some(address) {
            target_info.v6_address = Some(address);
            target_info.dirty = true;
        }

        ctx.renew(resource);
    }

    fn remove_instance(&mut self, instance_full_name: &Name) {
        if let Some(instance_info) = self.instance_infos_by_full_name.remove(instance_full_name) {
            for subscriber in self.subscribers.values_mut() {
                subscriber.instance_lost(&self.service_name, &instance_info.instance_name);
            }
        }
    }
}

impl Agent for InstanceRequestor {
    fn start(&mut self, _host_full_name: &Name, ctx: &mut AgentContext) {
        self.send_query(ctx);
    }

    fn receive_resource(
        &mut self,
        resource: &ResourceRecord,
        _section: Section,
        ctx: &mut AgentContext,
    ) {
        match resource.typ() {
            DnsType::Ptr => {
                if resource.name == self.service_full_name {
                    self.receive_ptr_resource(resource, ctx);
                }
            }
            DnsType::Srv => self.receive_srv_resource(resource, ctx),
            DnsType::Txt => self.receive_txt_resource(resource, ctx),
            DnsType::A => self.receive_a_resource(resource, ctx),
            DnsType::Aaaa => self.receive_aaaa_resource(resource, ctx),
            _ => {}
        }
    }

    fn end_of_message(&mut self, _ctx: &mut AgentContext) {
        // Report updates.
        for instance_info in self.instance_infos_by_full_name.values_mut() {
            let Some(target) = &instance_info.target else {
                // No SRV record seen for this instance yet.
                continue;
            };

            let Some(target_info) = self.target_infos_by_full_name.get_mut(target) else {
                debug_assert!(false, "instance target has no target info");
                continue;
            };

            // Keep this target info around.
            target_info.keep = true;

            if !instance_info.dirty && !target_info.dirty {
                continue;
            }

            if target_info.v4_address.is_none() && target_info.v6_address.is_none() {
                // No addresses yet.
                continue;
            }

            let v4 = socket_address_v4(target_info, instance_info.port);
            let v6 = socket_address_v6(target_info, instance_info.port);

            if instance_info.new {
                instance_info.new = false;
                for subscriber in self.subscribers.values_mut() {
                    subscriber.instance_discovered(
                        &self.service_name,
                        &instance_info.instance_name,
                        v4,
                        v6,
                        &instance_info.text,
                        instance_info.srv_priority,
                        instance_info.srv_weight,
                    );
                }
            } else {
                for subscriber in self.subscribers.values_mut() {
                    subscriber.instance_changed(
                        &self.service_name,
                        &instance_info.instance_name,
                        v4,
                        v6,
                        &instance_info.text,
                        instance_info.srv_priority,
                        instance_info.srv_weight,
                    );
                }
            }

            instance_info.dirty = false;
        }

        // Garbage-collect targets no instance references anymore.
        self.target_infos_by_full_name.retain(|_, target_info| {
            let keep = target_info.keep;
            target_info.keep = false;
            target_info.dirty = false;
            keep
        });
    }

    fn wake(&mut self, _token: u64, ctx: &mut AgentContext) {
        self.send_query(ctx);
    }
}

fn socket_address_v4(target_info: &TargetInfo, port: u16) -> Option<SocketAddr> {
    target_info
        .v4_address
        .map(|address| SocketAddr::new(IpAddr::V4(address), port))
}

fn socket_address_v6(target_info: &TargetInfo, port: u16) -> Option<SocketAddr> {
    target_info
        .v6_address
        .map(|address| SocketAddr::new(IpAddr::V6(address), port))
}
