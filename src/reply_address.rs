use std::fmt;
use std::net::{IpAddr, SocketAddr};

// Media classifies the physical layer of an interface.
//
// For unicast reply addresses the media is that of the receiving interface.
// For multicast reply addresses it selects the interfaces to send through:
// Wired or Wireless narrows to that link class, Both sends everywhere.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Media {
    Wired,
    Wireless,
    Both,
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Media::Wired => "Wired",
            Media::Wireless => "Wireless",
            Media::Both => "Both",
        };
        write!(f, "{s}")
    }
}

// A ReplyAddress identifies where an outbound message should be sent: a
// destination socket address plus the local interface it concerns. It keys
// the outbound accumulation map, and media participates in equality so
// wired-only and wireless-only multicast messages never merge into one
// datagram.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReplyAddress {
    socket_address: SocketAddr,
    interface_address: IpAddr,
    media: Media,
}

impl ReplyAddress {
    pub fn new(socket_address: SocketAddr, interface_address: IpAddr, media: Media) -> Self {
        ReplyAddress {
            socket_address,
            interface_address,
            media,
        }
    }

    pub fn socket_address(&self) -> SocketAddr {
        self.socket_address
    }

    pub fn interface_address(&self) -> IpAddr {
        self.interface_address
    }

    pub fn media(&self) -> Media {
        self.media
    }
}

impl fmt::Display for ReplyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (interface {}, {})",
            self.socket_address, self.interface_address, self.media
        )
    }
}
