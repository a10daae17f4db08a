//! Addressed, size-bounded messages and the socket bus that carries them

pub mod bus;

pub use bus::MessageBus;

use crate::core::hash::{hash_string32, hash_string64, resolve_path, Hash32, Hash64};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fragment value addressing every component of an instance
pub const WHOLE_INSTANCE: u8 = 0xFF;

/// Socket identifier, the 32-bit hash of the socket name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SocketId(pub u32);

impl SocketId {
    /// Identifier for a socket name
    pub fn from_name(name: &str) -> Self {
        SocketId(hash_string32(name).0)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Hash32(self.0))
    }
}

/// Routing triple: socket, instance path and component fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub socket: SocketId,
    pub path: Hash64,
    pub fragment: u8,
}

impl Address {
    /// Address a whole instance
    pub fn new(socket: SocketId, path: Hash64) -> Self {
        Self {
            socket,
            path,
            fragment: WHOLE_INSTANCE,
        }
    }

    /// Address a socket without any instance, used for engine-level handlers
    pub fn socket(socket: SocketId) -> Self {
        Self::new(socket, Hash64::default())
    }

    /// Narrow the address to one component slot
    pub fn with_fragment(mut self, fragment: u8) -> Self {
        self.fragment = fragment;
        self
    }

    pub fn is_whole_instance(&self) -> bool {
        self.fragment == WHOLE_INSTANCE
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.socket, self.path)?;
        if !self.is_whole_instance() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

/// Symbolic address as written by scripts and stored in properties
///
/// Missing parts refer to the owner: no socket means the owner's socket, no
/// path means the owner itself. The fragment names a component id and is
/// turned into a slot index when the url is resolved against a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Url {
    pub socket: Option<SocketId>,
    pub path: Option<Hash64>,
    pub fragment: Option<Hash64>,
}

impl Url {
    /// Parse `[socket:][path][#fragment]`
    ///
    /// Relative paths are resolved against `base`, the owner's absolute path,
    /// or against the root when there is no owner.
    pub fn parse(text: &str, base: Option<&str>) -> Self {
        let (socket, rest) = match text.find(':') {
            Some(index) => (Some(&text[..index]), &text[index + 1..]),
            None => (None, text),
        };
        let (path, fragment) = match rest.find('#') {
            Some(index) => (&rest[..index], Some(&rest[index + 1..])),
            None => (rest, None),
        };
        Self {
            socket: socket.filter(|s| !s.is_empty()).map(SocketId::from_name),
            path: (!path.is_empty()).then(|| resolve_path(base.unwrap_or("/"), path)),
            fragment: fragment.filter(|f| !f.is_empty()).map(hash_string64),
        }
    }

    /// Url of a known address with an optional component id
    pub fn from_address(address: Address, component: Option<Hash64>) -> Self {
        Self {
            socket: Some(address.socket),
            path: Some(address.path),
            fragment: component,
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(socket) = self.socket {
            write!(f, "{socket}:")?;
        }
        if let Some(path) = self.path {
            write!(f, "{path}")?;
        }
        if let Some(fragment) = self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Static description of a typed message payload
#[derive(Debug, Clone, Copy)]
pub struct MessageDescriptor {
    /// Message name, hashed to form the message id
    pub name: &'static str,
    /// Exact payload size in bytes
    pub size: usize,
    /// Converts a payload into a table for script receivers
    pub to_table: fn(&[u8]) -> Option<serde_json::Value>,
}

impl MessageDescriptor {
    pub fn id(&self) -> Hash64 {
        hash_string64(self.name)
    }
}

/// A message payload with a fixed binary layout
pub trait TypedMessage: Pod {
    const DESCRIPTOR: MessageDescriptor;
}

/// How a message payload is interpreted
#[derive(Debug, Clone, Copy)]
pub enum MessageKind {
    /// Symbolic id only, no payload
    Lightweight,
    /// serde_json encoded table, used by scripts
    Table,
    /// Fixed binary layout described by the descriptor
    Descriptor(MessageDescriptor),
}

/// A queued message
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Address,
    pub receiver: Address,
    pub id: Hash64,
    pub kind: MessageKind,
    payload: Vec<u8>,
}

impl Message {
    pub(crate) fn new(
        sender: Address,
        receiver: Address,
        id: Hash64,
        kind: MessageKind,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            sender,
            receiver,
            id,
            kind,
            payload,
        }
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode a typed payload, checking the descriptor and the size
    pub fn decode<T: TypedMessage>(&self) -> Option<T> {
        match self.kind {
            MessageKind::Descriptor(descriptor)
                if descriptor.name == T::DESCRIPTOR.name
                    && self.payload.len() == std::mem::size_of::<T>() =>
            {
                bytemuck::try_pod_read_unaligned(&self.payload).ok()
            }
            _ => None,
        }
    }

    /// Payload as a table, for table messages and descriptors that convert
    pub fn table(&self) -> Option<serde_json::Value> {
        match self.kind {
            MessageKind::Lightweight => None,
            MessageKind::Table => serde_json::from_slice(&self.payload).ok(),
            MessageKind::Descriptor(descriptor) => (descriptor.to_table)(&self.payload),
        }
    }
}

/// Errors from socket management and posting
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("Socket already exists: {0}")]
    SocketExists(String),

    #[error("Invalid socket name: '{0}'")]
    InvalidSocketName(String),

    #[error("Invalid socket: {0}")]
    InvalidSocket(SocketId),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Message queue full for socket {0}")]
    QueueFull(SocketId),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct Damage {
        amount: f32,
        source: u32,
    }

    fn damage_table(bytes: &[u8]) -> Option<serde_json::Value> {
        let damage: Damage = bytemuck::try_pod_read_unaligned(bytes).ok()?;
        Some(serde_json::json!({ "amount": damage.amount }))
    }

    impl TypedMessage for Damage {
        const DESCRIPTOR: MessageDescriptor = MessageDescriptor {
            name: "damage",
            size: std::mem::size_of::<Damage>(),
            to_table: damage_table,
        };
    }

    fn message(kind: MessageKind, payload: Vec<u8>) -> Message {
        let address = Address::new(SocketId::from_name("main"), Hash64::new("/a"));
        Message::new(address, address, Hash64::new("damage"), kind, payload)
    }

    #[test]
    fn test_decode_typed_payload() {
        let damage = Damage {
            amount: 12.5,
            source: 7,
        };
        let msg = message(
            MessageKind::Descriptor(Damage::DESCRIPTOR),
            bytemuck::bytes_of(&damage).to_vec(),
        );
        assert_eq!(msg.decode::<Damage>(), Some(damage));
        assert_eq!(msg.table(), Some(serde_json::json!({ "amount": 12.5 })));
    }

    #[test]
    fn test_decode_rejects_wrong_kind_or_size() {
        let msg = message(MessageKind::Lightweight, Vec::new());
        assert_eq!(msg.decode::<Damage>(), None);

        let msg = message(MessageKind::Descriptor(Damage::DESCRIPTOR), vec![0u8; 3]);
        assert_eq!(msg.decode::<Damage>(), None);
    }

    #[test]
    fn test_url_parse() {
        let url = Url::parse("main:/enemy#script", None);
        assert_eq!(url.socket, Some(SocketId::from_name("main")));
        assert_eq!(url.path, Some(Hash64::new("/enemy")));
        assert_eq!(url.fragment, Some(Hash64::new("script")));

        let relative = Url::parse("child", Some("/level/parent"));
        assert_eq!(relative.socket, None);
        assert_eq!(relative.path, Some(Hash64::new("/level/child")));

        let fragment_only = Url::parse("#sprite", Some("/a"));
        assert_eq!(fragment_only.path, None);
        assert_eq!(fragment_only.fragment, Some(Hash64::new("sprite")));

        assert_eq!(Url::parse("", None), Url::default());
        assert_eq!(
            Url::parse("@system:", None).socket,
            Some(SocketId::from_name("@system"))
        );
    }

    #[test]
    fn test_address_display() {
        let socket = SocketId::from_name("display_socket");
        let path = Hash64::new("/display_path");
        crate::core::hash::enable_reverse_lookup(true);
        let _ = hash_string32("display_socket");
        let _ = hash_string64("/display_path");
        assert_eq!(
            Address::new(socket, path).to_string(),
            "display_socket:/display_path"
        );
        assert_eq!(
            Address::new(socket, path).with_fragment(2).to_string(),
            "display_socket:/display_path#2"
        );
    }
}
