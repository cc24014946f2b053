
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::{Duration, Instant};

use crate::agent::{AgentContext, Section, RENEWER_ID};
use crate::message::name::Name;
use crate::message::question::Question;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::DnsType;

const RENEW: u64 = 1;

// Renews resources by querying for them before their TTLs expire.
//
// A resource registered with renew is queried at 80% of its TTL and then up
// to three more times at intervals of 5% of the TTL. If a fresh copy
// arrives, the renewer forgets the entry until asked to renew again. If all
// four queries go unanswered, the renewer distributes a matching record
// with a TTL of zero to every agent (the Expired section) and forgets the
// entry. A resource that is explicitly deleted on the wire (a record with
// TTL zero arrives) is dropped without an expiry distribution.
//
// Agents keep a resource alive by renewing each incoming copy; when an
// agent loses interest it simply stops renewing. That costs some needless
// renewals but avoids the cleanup problems a persistent registration
// scheme would have.
pub(crate) struct ResourceRenewer {
    entries: HashMap<EntryKey, Entry>,
    schedule: BinaryHeap<ScheduleItem>,
}

type EntryKey = (Name, DnsType);

struct Entry {
    time: Instant,
    interval: Duration,
    queries_remaining: u32,
    delete: bool,
}

impl Entry {
    const FIRST_QUERY_PER_THOUSAND: u32 = 800;
    const QUERY_INTERVAL_PER_THOUSAND: u32 = 50;
    const QUERIES_TO_ATTEMPT: u32 = 4;

    fn new(now: Instant, time_to_live: u32) -> Self {
        let mut entry = Entry {
            time: now,
            interval: Duration::ZERO,
            queries_remaining: 0,
            delete: false,
        };
        entry.set_first_query(now, time_to_live);
        entry
    }

    fn set_first_query(&mut self, now: Instant, time_to_live: u32) {
        self.time = now
            + Duration::from_millis(
                u64::from(time_to_live) * u64::from(Self::FIRST_QUERY_PER_THOUSAND),
            );
        self.interval = Duration::from_millis(
            u64::from(time_to_live) * u64::from(Self::QUERY_INTERVAL_PER_THOUSAND),
        );
        self.queries_remaining = Self::QUERIES_TO_ATTEMPT;
    }

    fn set_next_query_or_expiration(&mut self) {
        debug_assert!(self.queries_remaining != 0);
        self.time += self.interval;
        self.queries_remaining -= 1;
    }
}

// A scheduled wake for one entry. When an entry's real time moves later
// (the resource was renewed again), the heap item keeps its old time; at
// pop time an item whose entry disagrees is re-pushed instead of processed,
// so renewals never have to touch the heap.
struct ScheduleItem {
    time: Instant,
    key: EntryKey,
}

impl PartialEq for ScheduleItem {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.key == other.key
    }
}

impl Eq for ScheduleItem {}

impl PartialOrd for ScheduleItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleItem {
    // Reversed so the BinaryHeap pops the earliest item first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.cmp(&self.time)
    }
}

impl ResourceRenewer {
    pub(crate) fn new() -> Self {
        ResourceRenewer {
            entries: HashMap::new(),
            schedule: BinaryHeap::new(),
        }
    }

    // Attempts to renew the resource before its TTL expires. Renewing a
    // resource that is already tracked restarts its schedule and clears a
    // pending delete.
    pub(crate) fn renew(&mut self, resource: &ResourceRecord, ctx: &mut AgentContext) {
        debug_assert!(resource.ttl != 0);

        let key = (resource.name.clone(), resource.typ());

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.set_first_query(ctx.now(), resource.ttl);
            entry.delete = false;
            return;
        }

        let entry = Entry::new(ctx.now(), resource.ttl);
        let time = entry.time;
        self.entries.insert(key.clone(), entry);
        self.schedule.push(ScheduleItem { time, key });

        if self
            .schedule
            .peek()
            .map(|top| top.time == time)
            .unwrap_or(false)
        {
            ctx.current = RENEWER_ID;
            ctx.post_task_at(RENEW, time);
        }
    }

    pub(crate) fn receive_resource(
        &mut self,
        resource: &ResourceRecord,
        section: Section,
        _ctx: &mut AgentContext,
    ) {
        debug_assert!(section != Section::Expired);

        let key = (resource.name.clone(), resource.typ());
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.delete = true;
        }
    }

    pub(crate) fn end_of_message(&mut self, _ctx: &mut AgentContext) {}

    // Sends due renewal queries and expirations, then schedules the next
    // wake as appropriate.
    pub(crate) fn wake(&mut self, _token: u64, ctx: &mut AgentContext) {
        let now = ctx.now();

        while self
            .schedule
            .peek()
            .map(|item| item.time <= now)
            .unwrap_or(false)
        {
            let Some(item) = self.schedule.pop() else {
                break;
            };

            let Some(entry) = self.entries.get_mut(&item.key) else {
                continue;
            };

            if entry.delete {
                self.entries.remove(&item.key);
            } else if entry.time != item.time {
                // Postponed entry.
                let time = entry.time;
                self.schedule.push(ScheduleItem {
                    time,
                    key: item.key,
                });
            } else if entry.queries_remaining == 0 {
                // TTL expired.
                let (name, typ) = item.key.clone();
                if let Some(rdata) = RData::empty(typ) {
                    let mut resource = ResourceRecord::new(name, rdata);
                    resource.ttl = 0;
                    let reply_address = ctx.addresses().multicast_reply();
                    ctx.send_resource(resource, Section::Expired, &reply_address);
                }
                self.entries.remove(&item.key);
            } else {
                // Need to query.
                let (name, typ) = item.key.clone();
                ctx.send_question(Question::new(name, typ));
                entry.set_next_query_or_expiration();
                let time = entry.time;
                self.schedule.push(ScheduleItem {
                    time,
                    key: item.key,
                });
            }
        }

        if let Some(top) = self.schedule.peek() {
            ctx.current = RENEWER_ID;
            let time = top.time;
            ctx.post_task_at(RENEW, time);
        }
    }
}
