use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::reply_address::{Media, ReplyAddress};

pub const DEFAULT_MDNS_PORT: u16 = 5353;
pub const DEFAULT_V4_MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const DEFAULT_V6_MULTICAST_ADDRESS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

// The AddressBook holds the mDNS port and the v4/v6 multicast groups, and
// synthesizes the multicast reply-address sentinels. A sentinel carries the
// v4 multicast socket address and an unspecified interface address; its
// media narrows which interfaces the message goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBook {
    port: u16,
    v4_multicast: Ipv4Addr,
    v6_multicast: Ipv6Addr,
}

impl Default for AddressBook {
    fn default() -> Self {
        AddressBook {
            port: DEFAULT_MDNS_PORT,
            v4_multicast: DEFAULT_V4_MULTICAST_ADDRESS,
            v6_multicast: DEFAULT_V6_MULTICAST_ADDRESS,
        }
    }
}

impl AddressBook {
    pub fn new(port: u16, v4_multicast: Ipv4Addr, v6_multicast: Ipv6Addr) -> Self {
        AddressBook {
            port,
            v4_multicast,
            v6_multicast,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn v4_multicast(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.v4_multicast), self.port)
    }

    pub fn v6_multicast(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(self.v6_multicast), self.port)
    }

    pub fn v4_multicast_group(&self) -> Ipv4Addr {
        self.v4_multicast
    }

    pub fn v6_multicast_group(&self) -> Ipv6Addr {
        self.v6_multicast
    }

    pub fn v4_bind(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }

    pub fn v6_bind(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.port)
    }

    // The placeholder reply address for multicast via all interfaces.
    pub fn multicast_reply(&self) -> ReplyAddress {
        ReplyAddress::new(
            self.v4_multicast(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Media::Both,
        )
    }

    // The placeholder reply address for multicast via wired interfaces only.
    pub fn multicast_reply_wired_only(&self) -> ReplyAddress {
        ReplyAddress::new(
            self.v4_multicast(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Media::Wired,
        )
    }

    // The placeholder reply address for multicast via wireless interfaces
    // only.
    pub fn multicast_reply_wireless_only(&self) -> ReplyAddress {
        ReplyAddress::new(
            self.v4_multicast(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Media::Wireless,
        )
    }

    // Reports whether a reply address is one of the multicast sentinels.
    pub fn is_multicast_reply(&self, reply_address: &ReplyAddress) -> bool {
        reply_address.socket_address() == self.v4_multicast()
    }
}
