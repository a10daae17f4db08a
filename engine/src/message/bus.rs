use super::{Address, Message, MessageError, MessageKind, SocketId, TypedMessage};
use crate::config::EngineConfig;
use crate::core::hash::Hash64;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// A named FIFO queue
#[derive(Debug)]
struct Socket {
    name: String,
    queue: VecDeque<Message>,
}

/// Named sockets holding bounded message queues
///
/// The bus is owned by the engine and handed to collections and hooks as
/// `&mut MessageBus`. Dispatch drains a snapshot, so the handler gets the bus
/// back and may post freely; those posts land in the next pass.
#[derive(Debug)]
pub struct MessageBus {
    sockets: HashMap<SocketId, Socket>,
    max_message_size: usize,
    socket_capacity: usize,
}

impl MessageBus {
    /// Create a bus with explicit limits
    pub fn new(max_message_size: usize, socket_capacity: usize) -> Self {
        debug!(max_message_size, socket_capacity, "Creating message bus");
        Self {
            sockets: HashMap::new(),
            max_message_size,
            socket_capacity,
        }
    }

    /// Create a bus using the limits from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_message_size, config.socket_capacity)
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Create a named socket
    pub fn new_socket(&mut self, name: &str) -> Result<SocketId, MessageError> {
        if name.is_empty() || name.contains(':') || name.contains('#') {
            return Err(MessageError::InvalidSocketName(name.to_string()));
        }
        let id = SocketId::from_name(name);
        if self.sockets.contains_key(&id) {
            return Err(MessageError::SocketExists(name.to_string()));
        }
        self.sockets.insert(
            id,
            Socket {
                name: name.to_string(),
                queue: VecDeque::new(),
            },
        );
        debug!(socket = name, "Created socket");
        Ok(id)
    }

    /// Delete a socket, dropping any queued messages
    pub fn delete_socket(&mut self, socket: SocketId) -> Result<(), MessageError> {
        match self.sockets.remove(&socket) {
            Some(removed) => {
                debug!(
                    socket = removed.name,
                    dropped = removed.queue.len(),
                    "Deleted socket"
                );
                Ok(())
            }
            None => Err(MessageError::InvalidSocket(socket)),
        }
    }

    pub fn has_socket(&self, socket: SocketId) -> bool {
        self.sockets.contains_key(&socket)
    }

    /// Look up an existing socket by name
    pub fn socket_by_name(&self, name: &str) -> Option<SocketId> {
        let id = SocketId::from_name(name);
        self.sockets.contains_key(&id).then_some(id)
    }

    pub fn socket_name(&self, socket: SocketId) -> Option<&str> {
        self.sockets.get(&socket).map(|s| s.name.as_str())
    }

    /// Number of queued messages on a socket
    pub fn pending(&self, socket: SocketId) -> usize {
        self.sockets.get(&socket).map_or(0, |s| s.queue.len())
    }

    /// Enqueue a message on the receiver's socket
    pub fn post(
        &mut self,
        sender: Address,
        receiver: Address,
        message_id: Hash64,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), MessageError> {
        if payload.len() > self.max_message_size {
            return Err(MessageError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }
        let capacity = self.socket_capacity;
        let socket = self
            .sockets
            .get_mut(&receiver.socket)
            .ok_or(MessageError::InvalidSocket(receiver.socket))?;
        if socket.queue.len() >= capacity {
            return Err(MessageError::QueueFull(receiver.socket));
        }
        trace!(
            sender = %sender,
            receiver = %receiver,
            message_id = %message_id,
            size = payload.len(),
            "Posting message"
        );
        socket.queue.push_back(Message::new(
            sender,
            receiver,
            message_id,
            kind,
            payload.to_vec(),
        ));
        Ok(())
    }

    /// Post a message with no payload
    pub fn post_lightweight(
        &mut self,
        sender: Address,
        receiver: Address,
        message_id: Hash64,
    ) -> Result<(), MessageError> {
        self.post(sender, receiver, message_id, MessageKind::Lightweight, &[])
    }

    /// Post a message with a fixed binary layout
    pub fn post_typed<T: TypedMessage>(
        &mut self,
        sender: Address,
        receiver: Address,
        message: &T,
    ) -> Result<(), MessageError> {
        self.post(
            sender,
            receiver,
            T::DESCRIPTOR.id(),
            MessageKind::Descriptor(T::DESCRIPTOR),
            bytemuck::bytes_of(message),
        )
    }

    /// Post a table message encoded with serde_json
    pub fn post_table(
        &mut self,
        sender: Address,
        receiver: Address,
        message_id: Hash64,
        table: &serde_json::Value,
    ) -> Result<(), MessageError> {
        let payload =
            serde_json::to_vec(table).map_err(|e| MessageError::Encode(e.to_string()))?;
        self.post(sender, receiver, message_id, MessageKind::Table, &payload)
    }

    /// Deliver every message queued on `socket` before the call
    ///
    /// Messages posted by the handler stay queued for the next pass.
    /// Returns the number of messages handed to the handler.
    pub fn dispatch<F>(&mut self, socket: SocketId, mut handler: F) -> Result<usize, MessageError>
    where
        F: FnMut(&mut MessageBus, &Message),
    {
        let snapshot = match self.sockets.get_mut(&socket) {
            Some(s) => std::mem::take(&mut s.queue),
            None => return Err(MessageError::InvalidSocket(socket)),
        };
        let count = snapshot.len();
        for message in snapshot {
            handler(self, &message);
        }
        if count > 0 {
            trace!(socket = %socket, count, "Dispatched messages");
        }
        Ok(count)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
