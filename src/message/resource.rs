use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::name::*;
use super::packer::*;
use super::*;
use crate::error::*;

// Records announcing a resource that belongs to exactly one host (addresses,
// SRV, TXT) conventionally carry a short TTL; shared records (PTR) carry a
// long one (RFC 6762 section 10).
pub const SHORT_TTL: u32 = 2 * 60;
pub const LONG_TTL: u32 = 75 * 60;

// RData is the type-specific body of a resource record. The record type is
// derived from the variant, so an untyped or "invalid" record cannot be
// constructed.
//
// AddressPlaceholder stands in for the address records of the local host;
// the interface transceiver replaces it with the real A/AAAA of the
// outgoing interface at send time. It never appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Txt(Vec<String>),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name,
    },
    Opt(Vec<u8>),
    Nsec {
        next_domain: Name,
        bits: Vec<u8>,
    },
    AddressPlaceholder,
}

impl RData {
    pub fn typ(&self) -> DnsType {
        match self {
            RData::A(_) => DnsType::A,
            RData::Aaaa(_) => DnsType::Aaaa,
            RData::Ns(_) => DnsType::Ns,
            RData::Cname(_) => DnsType::Cname,
            RData::Ptr(_) => DnsType::Ptr,
            RData::Txt(_) => DnsType::Txt,
            RData::Srv { .. } => DnsType::Srv,
            RData::Opt(_) => DnsType::Opt,
            RData::Nsec { .. } => DnsType::Nsec,
            RData::AddressPlaceholder => DnsType::A,
        }
    }

    // Body stub used when a record must be synthesized from a (name, type)
    // key alone, e.g. the ttl-zero expiry records the renewal layer
    // distributes. Such records stay local and are never packed.
    pub(crate) fn empty(typ: DnsType) -> Option<RData> {
        let root = Name { data: ".".to_owned() };
        match typ {
            DnsType::A => Some(RData::A(Ipv4Addr::UNSPECIFIED)),
            DnsType::Aaaa => Some(RData::Aaaa(Ipv6Addr::UNSPECIFIED)),
            DnsType::Ns => Some(RData::Ns(root)),
            DnsType::Cname => Some(RData::Cname(root)),
            DnsType::Ptr => Some(RData::Ptr(root)),
            DnsType::Txt => Some(RData::Txt(vec![])),
            DnsType::Srv => Some(RData::Srv {
                priority: 0,
                weight: 0,
                port: 0,
                target: root,
            }),
            DnsType::Opt => Some(RData::Opt(vec![])),
            DnsType::Nsec => Some(RData::Nsec {
                next_domain: root,
                bits: vec![],
            }),
            _ => None,
        }
    }

    fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        match self {
            RData::A(addr) => Ok(pack_bytes(msg, &addr.octets())),
            RData::Aaaa(addr) => Ok(pack_bytes(msg, &addr.octets())),
            RData::Ns(name) => name.pack(msg, compression, compression_off),
            RData::Cname(name) => name.pack(msg, compression, compression_off),
            RData::Ptr(name) => name.pack(msg, compression, compression_off),
            RData::Txt(strings) => {
                let mut msg = msg;
                for s in strings {
                    msg = pack_str(msg, s)?;
                }
                Ok(msg)
            }
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                let mut msg = pack_uint16(msg, *priority);
                msg = pack_uint16(msg, *weight);
                msg = pack_uint16(msg, *port);
                // Target is not compressed, per RFC 2782.
                target.pack(msg, &mut None, compression_off)
            }
            RData::Opt(options) => Ok(pack_bytes(msg, options)),
            RData::Nsec { next_domain, bits } => {
                let msg = next_domain.pack(msg, &mut None, compression_off)?;
                Ok(pack_bytes(msg, bits))
            }
            RData::AddressPlaceholder => Err(Error::ErrAddressPlaceholder),
        }
    }

    fn unpack(typ: DnsType, msg: &[u8], off: usize, length: usize) -> Result<(RData, usize)> {
        let body_end = off + length;
        if body_end > msg.len() {
            return Err(Error::ErrResourceLen);
        }

        match typ {
            DnsType::A => {
                let mut octets = [0u8; 4];
                let off = unpack_bytes(msg, off, &mut octets)?;
                Ok((RData::A(Ipv4Addr::from(octets)), off))
            }
            DnsType::Aaaa => {
                let mut octets = [0u8; 16];
                let off = unpack_bytes(msg, off, &mut octets)?;
                Ok((RData::Aaaa(Ipv6Addr::from(octets)), off))
            }
            DnsType::Ns => {
                let mut name = Name::default();
                let off = name.unpack(msg, off)?;
                Ok((RData::Ns(name), off))
            }
            DnsType::Cname => {
                let mut name = Name::default();
                let off = name.unpack(msg, off)?;
                Ok((RData::Cname(name), off))
            }
            DnsType::Ptr => {
                let mut name = Name::default();
                let off = name.unpack(msg, off)?;
                Ok((RData::Ptr(name), off))
            }
            DnsType::Txt => {
                let mut strings = vec![];
                let mut off = off;
                while off < body_end {
                    let (s, new_off) = unpack_str(msg, off)?;
                    if new_off > body_end {
                        return Err(Error::ErrCalcLen);
                    }
                    strings.push(s);
                    off = new_off;
                }
                Ok((RData::Txt(strings), off))
            }
            DnsType::Srv => {
                let (priority, off) = unpack_uint16(msg, off)?;
                let (weight, off) = unpack_uint16(msg, off)?;
                let (port, off) = unpack_uint16(msg, off)?;
                let mut target = Name::default();
                let off = target.unpack_compressed(msg, off, false)?;
                Ok((
                    RData::Srv {
                        priority,
                        weight,
                        port,
                        target,
                    },
                    off,
                ))
            }
            DnsType::Opt => Ok((RData::Opt(msg[off..body_end].to_vec()), body_end)),
            DnsType::Nsec => {
                let mut next_domain = Name::default();
                let new_off = next_domain.unpack_compressed(msg, off, false)?;
                if new_off > body_end {
                    return Err(Error::ErrCalcLen);
                }
                Ok((
                    RData::Nsec {
                        next_domain,
                        bits: msg[new_off..body_end].to_vec(),
                    },
                    body_end,
                ))
            }
            _ => Err(Error::ErrResourceLen),
        }
    }
}

// A ResourceRecord is a DNS resource record. Two records are equal iff
// their header fields and type-specific body are equal; hashing covers the
// same fields.
//
// The cache_flush flag is the high bit of the wire-encoded class
// (RFC 6762 section 10.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    pub name: Name,
    pub class: DnsClass,
    pub cache_flush: bool,
    pub ttl: u32,
    pub rdata: RData,
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ttl {}", self.name, self.typ(), self.ttl)
    }
}

impl ResourceRecord {
    // Creates a record with the conventional default TTL for its type:
    // short for host-owned address records, long otherwise.
    pub fn new(name: Name, rdata: RData) -> Self {
        let ttl = match rdata {
            RData::A(_) | RData::Aaaa(_) | RData::AddressPlaceholder => SHORT_TTL,
            _ => LONG_TTL,
        };
        ResourceRecord {
            name,
            class: DNSCLASS_INET,
            cache_flush: false,
            ttl,
            rdata,
        }
    }

    pub fn typ(&self) -> DnsType {
        self.rdata.typ()
    }

    pub fn is_address(&self) -> bool {
        matches!(
            self.rdata,
            RData::A(_) | RData::Aaaa(_) | RData::AddressPlaceholder
        )
    }

    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let mut msg = self.name.pack(msg, compression, compression_off)?;
        msg = self.typ().pack(msg);
        msg = self.class.pack(msg, self.cache_flush);
        msg = pack_uint32(msg, self.ttl);

        // Length is patched once the body size is known.
        let len_off = msg.len();
        msg = pack_uint16(msg, 0);
        let pre_len = msg.len();

        msg = self.rdata.pack(msg, compression, compression_off)?;

        let body_len = msg.len() - pre_len;
        if body_len > u16::MAX as usize {
            return Err(Error::ErrResTooLong);
        }
        msg[len_off] = ((body_len >> 8) & 0xFF) as u8;
        msg[len_off + 1] = (body_len & 0xFF) as u8;

        Ok(msg)
    }

    // unpack parses one record. Records of unsupported types yield
    // Ok((None, next_off)) so the rest of the message can still be read.
    pub(crate) fn unpack(msg: &[u8], off: usize) -> Result<(Option<ResourceRecord>, usize)> {
        let mut name = Name::default();
        let off = name.unpack(msg, off)?;
        let (typ, off) = unpack_uint16(msg, off)?;
        let mut class = DnsClass::default();
        let (cache_flush, off) = class.unpack(msg, off)?;
        let (ttl, off) = unpack_uint32(msg, off)?;
        let (length, off) = unpack_uint16(msg, off)?;

        let typ = DnsType::from(typ);
        let body_end = off + length as usize;
        if body_end > msg.len() {
            return Err(Error::ErrResourceLen);
        }

        if typ == DnsType::Unsupported || typ == DnsType::Any {
            return Ok((None, body_end));
        }

        let (rdata, _) = RData::unpack(typ, msg, off, length as usize)?;

        Ok((
            Some(ResourceRecord {
                name,
                class,
                cache_flush,
                ttl,
                rdata,
            }),
            body_end,
        ))
    }
}
