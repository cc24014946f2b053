use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::*;

const NAME_LEN: usize = 255;

// A Name is a dotted domain name, always stored with the trailing label
// separator ("fuchsia.local."). Comparison and hashing are ASCII
// case-insensitive per DNS convention, so "Fuchsia.LOCAL." and
// "fuchsia.local." are the same name and collide in maps.
#[derive(Default, Debug, Clone)]
pub struct Name {
    pub data: String,
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.data.eq_ignore_ascii_case(&other.data)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.data.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl Name {
    pub fn new(data: &str) -> Result<Self> {
        if data.len() > NAME_LEN {
            Err(Error::ErrCalcLen)
        } else {
            Ok(Name {
                data: data.to_owned(),
            })
        }
    }

    // pack appends the wire format of the Name to msg.
    //
    // Domain names are a sequence of counted strings split at the dots. They
    // end with a zero-length string. Compression can be used to reuse domain
    // suffixes; the compression map is updated with new suffixes. If
    // compression is None, compression is not used.
    pub(crate) fn pack(
        &self,
        mut msg: Vec<u8>,
        compression: &mut Option<HashMap<String, usize>>,
        compression_off: usize,
    ) -> Result<Vec<u8>> {
        let data = self.data.as_bytes();

        if data.is_empty() || data[data.len() - 1] != b'.' {
            return Err(Error::ErrNonCanonicalName);
        }

        // Allow root domain.
        if data.len() == 1 && data[0] == b'.' {
            msg.push(0);
            return Ok(msg);
        }

        // Emit sequence of counted strings, chopping at dots.
        let mut begin = 0;
        for i in 0..data.len() {
            if data[i] == b'.' {
                // The two most significant bits of a length octet have
                // special meaning, so segments must stay below 64 bytes.
                if i - begin >= (1 << 6) {
                    return Err(Error::ErrSegTooLong);
                }

                if i - begin == 0 {
                    return Err(Error::ErrZeroSegLen);
                }

                msg.push((i - begin) as u8);
                msg.extend_from_slice(&data[begin..i]);

                begin = i + 1;
                continue;
            }

            // Suffixes can only be compressed starting at a new segment. A
            // pointer is two bytes with the two most significant bits set.
            if i == 0 || data[i - 1] == b'.' {
                if let Some(compression) = compression {
                    let key: String = self.data[i..].to_ascii_lowercase();
                    if let Some(ptr) = compression.get(&key) {
                        msg.push(((ptr >> 8) | 0xC0) as u8);
                        msg.push((ptr & 0xFF) as u8);
                        return Ok(msg);
                    }

                    // Miss. Remember the suffix if the offset fits in the
                    // 14 bits a pointer can carry.
                    if msg.len() <= 0x3FFF {
                        compression.insert(key, msg.len() - compression_off);
                    }
                }
            }
        }

        msg.push(0);
        Ok(msg)
    }

    pub(crate) fn unpack(&mut self, msg: &[u8], off: usize) -> Result<usize> {
        self.unpack_compressed(msg, off, true)
    }

    pub(crate) fn unpack_compressed(
        &mut self,
        msg: &[u8],
        off: usize,
        allow_compression: bool,
    ) -> Result<usize> {
        // curr_off is the current working offset. new_off is where the next
        // record starts; bytes reached through pointers belong to other names
        // and don't count toward this one.
        let mut curr_off = off;
        let mut new_off = off;
        let mut ptr = 0;

        let mut name = String::new();

        loop {
            if curr_off >= msg.len() {
                return Err(Error::ErrBaseLen);
            }
            let c = msg[curr_off];
            curr_off += 1;
            match c & 0xC0 {
                0x00 => {
                    // String segment; a zero length signals the end.
                    if c == 0x00 {
                        break;
                    }
                    let end_off = curr_off + c as usize;
                    if end_off > msg.len() {
                        return Err(Error::ErrCalcLen);
                    }
                    name.push_str(String::from_utf8(msg[curr_off..end_off].to_vec())?.as_str());
                    name.push('.');
                    curr_off = end_off;
                }
                0xC0 => {
                    // Pointer.
                    if !allow_compression {
                        return Err(Error::ErrInvalidPtr);
                    }
                    if curr_off >= msg.len() {
                        return Err(Error::ErrInvalidPtr);
                    }
                    let c1 = msg[curr_off];
                    curr_off += 1;
                    if ptr == 0 {
                        new_off = curr_off;
                    }
                    // Don't follow too many pointers, maybe there's a loop.
                    ptr += 1;
                    if ptr > 10 {
                        return Err(Error::ErrTooManyPtr);
                    }
                    curr_off = ((c ^ 0xC0) as usize) << 8 | (c1 as usize);
                }
                _ => {
                    // Prefixes 0x80 and 0x40 are reserved.
                    return Err(Error::ErrReserved);
                }
            }
        }
        if name.is_empty() {
            name.push('.');
        }
        if name.len() > NAME_LEN {
            return Err(Error::ErrCalcLen);
        }
        self.data = name;
        if ptr == 0 {
            new_off = curr_off;
        }
        Ok(new_off)
    }
}
