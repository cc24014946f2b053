use std::collections::HashMap;
use std::fmt;

use super::name::*;
use super::*;
use crate::error::*;

// A Question is a DNS query.
//
// The unicast_response flag is the high bit of the wire-encoded class
// (RFC 6762 section 5.4); it asks the responder to reply directly to the
// querier instead of multicasting the answer.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub typ: DnsType,
    pub class: DnsClass,
    pub unicast_response: bool,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.typ, self.class)
    }
}

impl Question {
    pub fn new(name: Name, typ: DnsType) -> Self {
        Question {
            name,
            typ,
            class: DNSCLASS_INET,
            unicast_response: false,
        }
    }

    pub(crate) fn pack(
        &self,
        msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let mut msg = self.name.pack(msg, compression, compression_off)?;
        msg = self.typ.pack(msg);
        Ok(self.class.pack(msg, self.unicast_response))
    }

    pub(crate) fn unpack(msg: &[u8], off: usize) -> Result<(Question, usize)> {
        let mut q = Question::default();
        let off = q.name.unpack(msg, off)?;
        let off = q.typ.unpack(msg, off)?;
        let (unicast_response, off) = q.class.unpack(msg, off)?;
        q.unicast_response = unicast_response;
        Ok((q, off))
    }
}
