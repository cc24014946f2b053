#![warn(rust_2018_idioms)]

pub mod address_book;
mod agent;
mod agents;
pub mod error;
mod mdns;
pub mod message;
pub mod names;
pub mod reply_address;
mod resource_renewer;
pub mod transceiver;

pub use address_book::AddressBook;
pub use error::{Error, Result};
pub use mdns::{Mdns, Publication, Publisher, Subscriber};
pub use reply_address::{Media, ReplyAddress};
pub use transceiver::InterfaceInfo;
