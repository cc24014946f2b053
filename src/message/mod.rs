#[cfg(test)]
mod message_test;

pub mod name;
mod packer;
pub mod question;
pub mod resource;

use std::collections::HashMap;
use std::fmt;

use packer::*;
use question::*;
use resource::*;

use crate::error::*;

// Message formats

// A DnsType is a type of DNS request and response.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DnsType {
    A = 1,
    Ns = 2,
    Cname = 5,
    Ptr = 12,
    Txt = 16,
    Aaaa = 28,
    Srv = 33,
    Opt = 41,
    Nsec = 47,

    // question-only type
    Any = 255,

    #[default]
    Unsupported = 0,
}

impl From<u16> for DnsType {
    fn from(v: u16) -> Self {
        match v {
            1 => DnsType::A,
            2 => DnsType::Ns,
            5 => DnsType::Cname,
            12 => DnsType::Ptr,
            16 => DnsType::Txt,
            28 => DnsType::Aaaa,
            33 => DnsType::Srv,
            41 => DnsType::Opt,
            47 => DnsType::Nsec,
            255 => DnsType::Any,
            _ => DnsType::Unsupported,
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            DnsType::A => "A",
            DnsType::Ns => "NS",
            DnsType::Cname => "CNAME",
            DnsType::Ptr => "PTR",
            DnsType::Txt => "TXT",
            DnsType::Aaaa => "AAAA",
            DnsType::Srv => "SRV",
            DnsType::Opt => "OPT",
            DnsType::Nsec => "NSEC",
            DnsType::Any => "ANY",
            _ => "Unsupported",
        };
        write!(f, "{s}")
    }
}

impl DnsType {
    pub(crate) fn pack(&self, msg: Vec<u8>) -> Vec<u8> {
        pack_uint16(msg, *self as u16)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        let (t, o) = unpack_uint16(msg, off)?;
        *self = DnsType::from(t);
        Ok(o)
    }
}

// A DnsClass is a class of network.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DnsClass(pub u16);

pub const DNSCLASS_INET: DnsClass = DnsClass(1);
pub const DNSCLASS_ANY: DnsClass = DnsClass(255);

// The high bit of the wire-encoded class carries the mDNS cache-flush flag
// on resource records and the unicast-response flag on questions
// (RFC 6762 sections 10.2 and 5.4). It is split out during unpacking and
// recombined during packing.
const CLASS_FLAG_BIT: u16 = 0x8000;

impl Default for DnsClass {
    fn default() -> Self {
        DNSCLASS_INET
    }
}

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let other = format!("{}", self.0);
        let s = match *self {
            DNSCLASS_INET => "ClassINET",
            DNSCLASS_ANY => "ClassANY",
            _ => other.as_str(),
        };
        write!(f, "{s}")
    }
}

impl DnsClass {
    pub(crate) fn pack(&self, msg: Vec<u8>, flag: bool) -> Vec<u8> {
        let bits = if flag {
            self.0 | CLASS_FLAG_BIT
        } else {
            self.0
        };
        pack_uint16(msg, bits)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<(bool, usize)> {
        let (c, o) = unpack_uint16(msg, off)?;
        *self = DnsClass(c & !CLASS_FLAG_BIT);
        Ok((c & CLASS_FLAG_BIT != 0, o))
    }
}

// An OpCode is a DNS operation code.
pub type OpCode = u16;

// An RCode is a DNS response status code.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RCode {
    #[default]
    Success = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
    Unsupported,
}

impl From<u8> for RCode {
    fn from(v: u8) -> Self {
        match v {
            0 => RCode::Success,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            _ => RCode::Unsupported,
        }
    }
}

// Internal constants.

// HEADER_LEN is the length (in bytes) of a DNS header: six uint16s, no
// padding.
const HEADER_LEN: usize = 6 * 2;

const HEADER_BIT_QR: u16 = 1 << 15; // query/response (response=1)
const HEADER_BIT_AA: u16 = 1 << 10; // authoritative
const HEADER_BIT_TC: u16 = 1 << 9; // truncated
const HEADER_BIT_RD: u16 = 1 << 8; // recursion desired
const HEADER_BIT_RA: u16 = 1 << 7; // recursion available

// Header is a representation of a DNS message header. The four section
// counts are not stored here; they are derived from the section vectors
// when a message is packed.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub response: bool,
    pub op_code: OpCode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: RCode,
}

impl Header {
    fn pack_bits(&self) -> u16 {
        let mut bits = self.op_code << 11 | self.rcode as u16;
        if self.recursion_available {
            bits |= HEADER_BIT_RA
        }
        if self.recursion_desired {
            bits |= HEADER_BIT_RD
        }
        if self.truncated {
            bits |= HEADER_BIT_TC
        }
        if self.authoritative {
            bits |= HEADER_BIT_AA
        }
        if self.response {
            bits |= HEADER_BIT_QR
        }
        bits
    }

    fn from_bits(id: u16, bits: u16) -> Self {
        Header {
            id,
            response: (bits & HEADER_BIT_QR) != 0,
            op_code: ((bits >> 11) & 0xF) as OpCode,
            authoritative: (bits & HEADER_BIT_AA) != 0,
            truncated: (bits & HEADER_BIT_TC) != 0,
            recursion_desired: (bits & HEADER_BIT_RD) != 0,
            recursion_available: (bits & HEADER_BIT_RA) != 0,
            rcode: RCode::from((bits & 0xF) as u8),
        }
    }
}

// Message is a representation of a DNS message.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    // unpack parses a full message. Resource records of unsupported types
    // are skipped rather than failing the whole datagram.
    pub fn unpack(msg: &[u8]) -> Result<Message> {
        let (id, off) = unpack_uint16(msg, 0)?;
        let (bits, off) = unpack_uint16(msg, off)?;
        let (questions, off) = unpack_uint16(msg, off)?;
        let (answers, off) = unpack_uint16(msg, off)?;
        let (authorities, off) = unpack_uint16(msg, off)?;
        let (additionals, mut off) = unpack_uint16(msg, off)?;

        let mut m = Message {
            header: Header::from_bits(id, bits),
            ..Default::default()
        };

        for _ in 0..questions {
            let (q, new_off) = Question::unpack(msg, off)?;
            m.questions.push(q);
            off = new_off;
        }
        for _ in 0..answers {
            let (r, new_off) = ResourceRecord::unpack(msg, off)?;
            if let Some(r) = r {
                m.answers.push(r);
            }
            off = new_off;
        }
        for _ in 0..authorities {
            let (r, new_off) = ResourceRecord::unpack(msg, off)?;
            if let Some(r) = r {
                m.authorities.push(r);
            }
            off = new_off;
        }
        for _ in 0..additionals {
            let (r, new_off) = ResourceRecord::unpack(msg, off)?;
            if let Some(r) = r {
                m.additionals.push(r);
            }
            off = new_off;
        }

        Ok(m)
    }

    // pack produces the wire format of the message. The header section
    // counts are taken from the section vector lengths. Name compression is
    // always enabled; RFC 1035 requires unpacking implementations to
    // support it, so unconditionally emitting it is fine.
    pub fn pack(&self) -> Result<Vec<u8>> {
        if self.questions.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyQuestions);
        }
        if self.answers.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAnswers);
        }
        if self.authorities.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAuthorities);
        }
        if self.additionals.len() > u16::MAX as usize {
            return Err(Error::ErrTooManyAdditionals);
        }

        let mut msg = Vec::with_capacity(HEADER_LEN);
        msg = pack_uint16(msg, self.header.id);
        msg = pack_uint16(msg, self.header.pack_bits());
        msg = pack_uint16(msg, self.questions.len() as u16);
        msg = pack_uint16(msg, self.answers.len() as u16);
        msg = pack_uint16(msg, self.authorities.len() as u16);
        msg = pack_uint16(msg, self.additionals.len() as u16);

        let mut compression = Some(HashMap::new());

        for question in &self.questions {
            msg = question.pack(msg, &mut compression, 0)?;
        }
        for answer in &self.answers {
            msg = answer.pack(msg, &mut compression, 0)?;
        }
        for authority in &self.authorities {
            msg = authority.pack(msg, &mut compression, 0)?;
        }
        for additional in &self.additionals {
            msg = additional.pack(msg, &mut compression, 0)?;
        }

        Ok(msg)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message{{questions: {}, answers: {}, authorities: {}, additionals: {}}}",
            self.questions.len(),
            self.answers.len(),
            self.authorities.len(),
            self.additionals.len()
        )
    }
}
