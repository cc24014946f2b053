pub(crate) mod interface;


use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::address_book::AddressBook;
use crate::message::name::Name;
use crate::message::Message;
use crate::reply_address::{Media, ReplyAddress};
use interface::{normalize, InterfaceTransceiver};

// One entry of the interface-enumeration event stream: a NIC address along
// with the NIC's identity and link class. paired_addresses holds the other
// addresses of the same NIC, which is where the other-family alternate
// address comes from.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub address: IpAddr,
    pub name: String,
    pub index: u32,
    pub up: bool,
    pub loopback: bool,
    pub paired_addresses: Vec<IpAddr>,
    pub media: Media,
}

// Tracks the set of interface transceivers, keyed by interface address,
// and dispatches outbound messages by reply address.
pub(crate) struct Transceiver {
    addresses: AddressBook,
    interface_transceivers_by_address: Mutex<HashMap<IpAddr, Arc<InterfaceTransceiver>>>,
}

impl Transceiver {
    pub(crate) fn new(addresses: AddressBook) -> Self {
        Transceiver {
            addresses,
            interface_transceivers_by_address: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn has_interfaces(&self) -> bool {
        !self
            .interface_transceivers_by_address
            .lock()
            .unwrap()
            .is_empty()
    }

    // Reports whether the address belongs to one of our own interfaces.
    // Inbound datagrams from such addresses are our own multicasts looped
    // back by another interface and must be dropped.
    pub(crate) fn is_local_interface_address(&self, address: IpAddr) -> bool {
        self.interface_transceivers_by_address
            .lock()
            .unwrap()
            .contains_key(&normalize(address))
    }

    // Applies an interface-enumeration update: ensures a transceiver exists
    // for every up, non-loopback interface address, recreates transceivers
    // whose interface name or index changed, and stops transceivers whose
    // address is gone (saying goodbye first if the local host name is
    // established). Returns true if the interface set changed.
    pub(crate) async fn update_interfaces(
        &self,
        interfaces: &[InterfaceInfo],
        host_full_name: Option<&Name>,
        inbound_tx: &mpsc::Sender<(Message, ReplyAddress)>,
    ) -> bool {
        let mut link_change = false;
        let mut stopped = vec![];

        {
            let mut current = self.interface_transceivers_by_address.lock().unwrap();
            let mut prev = std::mem::take(&mut *current);

            for info in interfaces {
                if !info.up || info.loopback || info.address.is_unspecified() {
                    continue;
                }

                let alternate_address = info
                    .paired_addresses
                    .iter()
                    .find(|a| a.is_ipv4() != info.address.is_ipv4())
                    .copied();

                if let Some(existing) = prev.remove(&info.address) {
                    debug_assert_eq!(existing.address(), info.address);
                    if existing.name() == info.name && existing.index() == info.index {
                        // Keep the existing transceiver.
                        if let Some(alternate_address) = alternate_address {
                            existing.set_alternate_address(alternate_address);
                        }
                        current.insert(info.address, existing);
                        continue;
                    }

                    // Same address, but the interface name or index
                    // changed. Recreate the transceiver.
                    stopped.push(existing);
                    link_change = true;
                }

                match InterfaceTransceiver::open(
                    info.address,
                    &info.name,
                    info.index,
                    info.media,
                    self.addresses,
                    inbound_tx.clone(),
                ) {
                    Ok(transceiver) => {
                        if let Some(alternate_address) = alternate_address {
                            transceiver.set_alternate_address(alternate_address);
                        }
                        current.insert(info.address, transceiver);
                        link_change = true;
                    }
                    Err(err) => {
                        log::error!(
                            "failed to start mDNS on interface {} {}: {err}",
                            info.name,
                            info.address
                        );
                    }
                }
            }

            // Whatever is left in prev is no longer present.
            for (_, transceiver) in prev.drain() {
                stopped.push(transceiver);
                link_change = true;
            }
        }

        for transceiver in stopped {
            if let Some(host_full_name) = host_full_name {
                transceiver.send_address_goodbye(host_full_name).await;
            }
            transceiver.stop();
        }

        link_change
    }

    // Sends a message per its reply address: a multicast placeholder goes
    // out every interface whose media the placeholder admits, anything
    // else goes out the interface matching the reply's interface address.
    pub(crate) async fn send_message(&self, message: &mut Message, reply_address: &ReplyAddress) {
        if self.addresses.is_multicast_reply(reply_address) {
            let targets: Vec<Arc<InterfaceTransceiver>> = self
                .interface_transceivers_by_address
                .lock()
                .unwrap()
                .values()
                .filter(|t| {
                    reply_address.media() == Media::Both || t.media() == reply_address.media()
                })
                .cloned()
                .collect();

            for target in targets {
                target
                    .send_message(message, reply_address.socket_address())
                    .await;
            }

            return;
        }

        let target = self
            .interface_transceivers_by_address
            .lock()
            .unwrap()
            .get(&reply_address.interface_address())
            .cloned();

        if let Some(target) = target {
            target
                .send_message(message, reply_address.socket_address())
                .await;
        }
    }

    pub(crate) async fn send_all(&self, outbound: Vec<(ReplyAddress, Message)>) {
        for (reply_address, mut message) in outbound {
            self.send_message(&mut message, &reply_address).await;
        }
    }

    pub(crate) fn stop(&self) {
        let mut current = self.interface_transceivers_by_address.lock().unwrap();
        for (_, transceiver) in current.drain() {
            transceiver.stop();
        }
    }
}
