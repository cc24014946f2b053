use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::address_book::AddressBook;
use crate::error::*;
use crate::message::name::Name;
use crate::message::resource::{RData, ResourceRecord};
use crate::message::Message;
use crate::reply_address::{Media, ReplyAddress};

// RFC 6762 suggests a max packet size of 1500, but bigger packets show up
// in the wild. 9000 is the maximum size of a jumbo frame.
const MAX_PACKET_SIZE: usize = 9000;

// RFC 6762 section 11.
const TIME_TO_LIVE: u32 = 255;

const RECEIVE_RETRY_INTERVAL: Duration = Duration::from_secs(10);

// Handles mDNS traffic for a single NIC address: owns the UDP socket bound
// to the mDNS port and joined to the family-appropriate multicast group,
// runs the receive loop, and fixes up address records at the last moment
// before a message leaves through this interface.
pub(crate) struct InterfaceTransceiver {
    address: IpAddr,
    name: String,
    index: u32,
    media: Media,
    alternate_address: Mutex<Option<IpAddr>>,
    socket: Arc<UdpSocket>,
    addresses: AddressBook,
    close_tx: mpsc::Sender<()>,
}

impl InterfaceTransceiver {
    pub(crate) fn open(
        address: IpAddr,
        name: &str,
        index: u32,
        media: Media,
        addresses: AddressBook,
        inbound_tx: mpsc::Sender<(Message, ReplyAddress)>,
    ) -> Result<Arc<Self>> {
        log::info!(
            "starting mDNS on interface {name} {address} using port {}",
            addresses.port()
        );

        let socket = match address {
            IpAddr::V4(local) => {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                configure_shared(&socket, name)?;
                socket.set_multicast_loop_v4(false)?;
                socket.set_multicast_ttl_v4(TIME_TO_LIVE)?;
                socket.set_ttl(TIME_TO_LIVE)?;
                socket
                    .join_multicast_v4(&addresses.v4_multicast_group(), &local)
                    .map_err(|err| {
                        log::error!("failed to join multicast group on interface {name}: {err}");
                        Error::ErrJoiningMulticastGroup
                    })?;
                socket.set_multicast_if_v4(&local)?;
                socket.bind(&SockAddr::from(addresses.v4_bind()))?;
                socket
            }
            IpAddr::V6(_) => {
                let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
                configure_shared(&socket, name)?;
                socket.set_only_v6(true)?;
                socket.set_multicast_loop_v6(false)?;
                socket.set_multicast_hops_v6(TIME_TO_LIVE)?;
                socket.set_unicast_hops_v6(TIME_TO_LIVE)?;
                socket
                    .join_multicast_v6(&addresses.v6_multicast_group(), index)
                    .map_err(|err| {
                        log::error!("failed to join multicast group on interface {name}: {err}");
                        Error::ErrJoiningMulticastGroup
                    })?;
                socket.set_multicast_if_v6(index)?;
                socket.bind(&SockAddr::from(addresses.v6_bind()))?;
                socket
            }
        };

        let socket = Arc::new(UdpSocket::from_std(socket.into())?);
        let (close_tx, close_rx) = mpsc::channel(1);

        let transceiver = Arc::new(InterfaceTransceiver {
            address,
            name: name.to_owned(),
            index,
            media,
            alternate_address: Mutex::new(None),
            socket,
            addresses,
            close_tx,
        });

        let recv_transceiver = Arc::clone(&transceiver);
        tokio::spawn(async move {
            recv_transceiver.receive_loop(close_rx, inbound_tx).await;
        });

        Ok(transceiver)
    }

    pub(crate) fn address(&self) -> IpAddr {
        self.address
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn media(&self) -> Media {
        self.media
    }

    // Sets the other-family address of the same NIC. When set, outbound
    // messages carry address records for both families.
    pub(crate) fn set_alternate_address(&self, alternate_address: IpAddr) {
        debug_assert!(alternate_address.is_ipv4() != self.address.is_ipv4());
        *self.alternate_address.lock().unwrap() = Some(alternate_address);
    }

    pub(crate) fn stop(&self) {
        let _ = self.close_tx.try_send(());
    }

    async fn receive_loop(
        self: Arc<Self>,
        mut close_rx: mpsc::Receiver<()>,
        inbound_tx: mpsc::Sender<(Message, ReplyAddress)>,
    ) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                _ = close_rx.recv() => {
                    log::info!("stopping mDNS on interface {} {}", self.name, self.address);
                    return;
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, source)) => {
                            if normalize(source.ip()) == self.address {
                                // An outgoing message bounced back to us.
                                continue;
                            }

                            let reply_address =
                                ReplyAddress::new(source, self.address, self.media);

                            match Message::unpack(&buf[..n]) {
                                Ok(message) => {
                                    let _ = inbound_tx.send((message, reply_address)).await;
                                }
                                Err(err) => {
                                    log::warn!(
                                        "couldn't parse {n} byte message from {reply_address}: {err}"
                                    );
                                }
                            }
                        }

                        Err(err) => {
                            log::error!(
                                "failed to receive on interface {} {}: {err}",
                                self.name,
                                self.address
                            );
                            // Wait a bit before trying again to avoid
                            // spamming the log.
                            tokio::time::sleep(RECEIVE_RETRY_INTERVAL).await;
                        }
                    }
                }
            }
        }
    }

    // Sends a message through this interface, substituting the real
    // address records of this interface for any address records in the
    // message first. A v6 interface sends to its v6 multicast group when
    // the destination is the v4 multicast placeholder.
    pub(crate) async fn send_message(&self, message: &mut Message, address: SocketAddr) {
        let alternate_address = *self.alternate_address.lock().unwrap();
        fix_up_addresses(&mut message.answers, self.address, alternate_address);
        fix_up_addresses(&mut message.authorities, self.address, alternate_address);
        fix_up_addresses(&mut message.additionals, self.address, alternate_address);

        let address = if self.address.is_ipv6() && address == self.addresses.v4_multicast() {
            self.addresses.v6_multicast()
        } else {
            address
        };

        let bytes = match message.pack() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("failed to encode message to {address}: {err}");
                return;
            }
        };

        if let Err(err) = self.socket.send_to(&bytes, address).await {
            log::error!(
                "failed to send {} bytes to {address} from {} ({}): {err}",
                bytes.len(),
                self.name,
                self.address
            );
        }
    }

    // Sends a message containing only an address record for this interface
    // with a ttl of zero, indicating that the address is no longer valid.
    pub(crate) async fn send_address_goodbye(&self, host_full_name: &Name) {
        let mut record = address_record(host_full_name.clone(), self.address);
        record.ttl = 0;

        let mut message = Message {
            answers: vec![record],
            ..Default::default()
        };

        self.send_message(&mut message, self.addresses.v4_multicast())
            .await;
    }
}

fn configure_shared(socket: &Socket, name: &str) -> Result<()> {
    socket.set_reuse_address(true)?;
    #[cfg(target_family = "unix")]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    #[cfg(target_os = "linux")]
    if let Err(err) = socket.bind_device(Some(name.as_bytes())) {
        log::warn!("failed to bind socket to device {name}: {err}");
    }
    #[cfg(not(target_os = "linux"))]
    let _ = name;

    Ok(())
}

// Replaces the address records in a section with this interface's own
// record, plus a record for the alternate (other-family) address when one
// is set. The section is expected to hold at most two address records,
// adjacent; the same holds on return, which makes the fix-up idempotent.
// The ttl of the first replaced record is preserved so goodbyes pass
// through intact.
pub(crate) fn fix_up_addresses(
    resources: &mut Vec<ResourceRecord>,
    address: IpAddr,
    alternate_address: Option<IpAddr>,
) {
    let Some(first) = resources.iter().position(|r| r.is_address()) else {
        return;
    };

    let name = resources[first].name.clone();
    let ttl = resources[first].ttl;

    resources.retain(|r| !r.is_address());

    let mut record = address_record(name.clone(), address);
    record.ttl = ttl;
    resources.push(record);

    if let Some(alternate_address) = alternate_address {
        let mut record = address_record(name, alternate_address);
        record.ttl = ttl;
        resources.push(record);
    }
}

fn address_record(name: Name, address: IpAddr) -> ResourceRecord {
    match address {
        IpAddr::V4(address) => ResourceRecord::new(name, RData::A(address)),
        IpAddr::V6(address) => ResourceRecord::new(name, RData::Aaaa(address)),
    }
}

// Maps v4-mapped v6 addresses back to v4 so source addresses compare
// against interface addresses correctly.
pub(crate) fn normalize(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => address,
        },
        IpAddr::V4(_) => address,
    }
}
