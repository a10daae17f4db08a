//! Engine-global commands received on the `@system` socket

use crate::collection::{Collection, InstanceHandle};
use crate::core::hash::hash_string64;
use crate::message::{Address, Message, MessageBus, MessageDescriptor, SocketId, TypedMessage};
use bytemuck::{Pod, Zeroable};
use serde_json::json;
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, error, info, warn};

/// Name of the engine-global socket
pub const SYSTEM_SOCKET: &str = "@system";

new_key_type! {
    /// Identifies a loaded collection
    pub struct CollectionId;
}

/// Reply to `request_transform`, sent to the requesting instance
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformResponse {
    /// Identifier of the instance the transform belongs to
    pub id: u64,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub world_position: [f32; 3],
    pub world_rotation: [f32; 4],
}

fn transform_response_table(bytes: &[u8]) -> Option<serde_json::Value> {
    let response: TransformResponse = bytemuck::try_pod_read_unaligned(bytes).ok()?;
    Some(json!({
        "id": response.id,
        "position": response.position,
        "rotation": response.rotation,
        "world_position": response.world_position,
        "world_rotation": response.world_rotation,
    }))
}

impl TypedMessage for TransformResponse {
    const DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        name: "transform_response",
        size: std::mem::size_of::<TransformResponse>(),
        to_table: transform_response_table,
    };
}

/// Stop the engine with an exit code
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Exit {
    pub code: i32,
}

fn exit_table(bytes: &[u8]) -> Option<serde_json::Value> {
    let exit: Exit = bytemuck::try_pod_read_unaligned(bytes).ok()?;
    Some(json!({ "code": exit.code }))
}

impl TypedMessage for Exit {
    const DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        name: "exit",
        size: std::mem::size_of::<Exit>(),
        to_table: exit_table,
    };
}

/// How a scaled time step is handed to the collections
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeStepMode {
    /// Every frame gets `dt * factor`
    #[default]
    Continuous = 0,
    /// Scaled time accumulates until it reaches a whole frame, then is
    /// handed out at once; frames in between get zero
    Discrete = 1,
}

impl TimeStepMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Continuous),
            1 => Some(Self::Discrete),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "continuous" => Some(Self::Continuous),
            "discrete" => Some(Self::Discrete),
            _ => None,
        }
    }
}

/// Scale the frame delta time
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SetTimeStep {
    pub factor: f32,
    /// A [`TimeStepMode`] value
    pub mode: u32,
}

impl SetTimeStep {
    pub fn new(factor: f32, mode: TimeStepMode) -> Self {
        Self {
            factor,
            mode: mode as u32,
        }
    }
}

fn set_time_step_table(bytes: &[u8]) -> Option<serde_json::Value> {
    let step: SetTimeStep = bytemuck::try_pod_read_unaligned(bytes).ok()?;
    Some(json!({ "factor": step.factor, "mode": step.mode }))
}

impl TypedMessage for SetTimeStep {
    const DESCRIPTOR: MessageDescriptor = MessageDescriptor {
        name: "set_time_step",
        size: std::mem::size_of::<SetTimeStep>(),
        to_table: set_time_step_table,
    };
}

/// Collection changes requested on the system socket
///
/// They are applied by the engine once the system socket has been drained,
/// before any collection runs its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionCommand {
    /// Create an empty, inactive collection
    Load(String),
    Unload(String),
    /// Start running the collection's frames
    Activate(String),
}

/// State owned by the `@system` socket handler
#[derive(Debug)]
pub struct SystemController {
    socket: SocketId,
    running: bool,
    exit_code: i32,
    time_step_factor: f32,
    time_step_mode: TimeStepMode,
    // Only set once a time step was requested
    warp: bool,
    accumulated: f32,
    commands: Vec<CollectionCommand>,
}

impl SystemController {
    pub fn new(socket: SocketId) -> Self {
        Self {
            socket,
            running: true,
            exit_code: 0,
            time_step_factor: 1.0,
            time_step_mode: TimeStepMode::Continuous,
            warp: false,
            accumulated: 0.0,
            commands: Vec::new(),
        }
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn address(&self) -> Address {
        Address::socket(self.socket)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn time_step_factor(&self) -> f32 {
        self.time_step_factor
    }

    pub fn time_step_mode(&self) -> TimeStepMode {
        self.time_step_mode
    }

    /// Delta time handed to the collections for a frame of length `dt`
    pub fn scale_dt(&mut self, dt: f32) -> f32 {
        if !self.warp {
            return dt;
        }
        let warped = dt * self.time_step_factor;
        match self.time_step_mode {
            TimeStepMode::Continuous => warped,
            TimeStepMode::Discrete => {
                self.accumulated += warped;
                if self.accumulated >= dt {
                    std::mem::take(&mut self.accumulated)
                } else {
                    0.0
                }
            }
        }
    }

    /// Collection commands received since the last call
    pub fn take_collection_commands(&mut self) -> Vec<CollectionCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Handle one message from the system socket
    pub fn handle(
        &mut self,
        collections: &mut SlotMap<CollectionId, Collection>,
        bus: &mut MessageBus,
        message: &Message,
    ) {
        let id = message.id;
        if id == hash_string64("acquire_input_focus") {
            if let Some((collection, instance)) = sender_instance(collections, message) {
                collection.instances_mut().acquire_input_focus(instance);
                debug!(instance = %message.sender, "Acquired input focus");
            }
        } else if id == hash_string64("release_input_focus") {
            if let Some((collection, instance)) = sender_instance(collections, message) {
                collection.instances_mut().release_input_focus(instance);
                debug!(instance = %message.sender, "Released input focus");
            }
        } else if id == hash_string64("request_transform") {
            self.reply_transform(collections, bus, message);
        } else if id == Exit::DESCRIPTOR.id() {
            let code = message
                .decode::<Exit>()
                .map(|exit| exit.code)
                .or_else(|| table_number(message, "code").map(|c| c as i32))
                .unwrap_or(0);
            info!(code, "Exit requested");
            self.running = false;
            self.exit_code = code;
        } else if id == SetTimeStep::DESCRIPTOR.id() {
            self.set_time_step(message);
        } else if id == hash_string64("reset_time_step") {
            debug!("Time step reset");
            self.time_step_factor = 1.0;
            self.time_step_mode = TimeStepMode::Continuous;
            self.warp = false;
            self.accumulated = 0.0;
        } else if id == hash_string64("load_collection") {
            self.queue_collection_command(message, CollectionCommand::Load);
        } else if id == hash_string64("unload_collection") {
            self.queue_collection_command(message, CollectionCommand::Unload);
        } else if id == hash_string64("activate_collection") {
            self.queue_collection_command(message, CollectionCommand::Activate);
        } else {
            error!(
                message_id = %id,
                sender = %message.sender,
                "Unknown system message"
            );
        }
    }

    fn set_time_step(&mut self, message: &Message) {
        let (factor, mode) = match message.decode::<SetTimeStep>() {
            Some(step) => (Some(step.factor), TimeStepMode::from_u32(step.mode)),
            None => {
                let table = message.table();
                let factor = table
                    .as_ref()
                    .and_then(|t| t.get("factor")?.as_f64())
                    .map(|f| f as f32);
                let mode = match table.as_ref().and_then(|t| t.get("mode")) {
                    None => Some(TimeStepMode::Continuous),
                    Some(serde_json::Value::String(name)) => TimeStepMode::from_name(name),
                    Some(value) => value
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .and_then(TimeStepMode::from_u32),
                };
                (factor, mode)
            }
        };
        match (factor, mode) {
            (Some(factor), Some(mode)) if factor >= 0.0 && factor.is_finite() => {
                debug!(factor, mode = ?mode, "Time step set");
                self.time_step_factor = factor;
                self.time_step_mode = mode;
                self.warp = true;
                self.accumulated = 0.0;
            }
            _ => warn!(sender = %message.sender, "Invalid time step"),
        }
    }

    fn queue_collection_command(&mut self, message: &Message, command: fn(String) -> CollectionCommand) {
        let name = message
            .table()
            .and_then(|table| table.get("collection")?.as_str().map(str::to_string));
        match name {
            Some(name) if !name.is_empty() => self.commands.push(command(name)),
            _ => warn!(
                sender = %message.sender,
                message_id = %message.id,
                "Collection command without a collection name"
            ),
        }
    }

    fn reply_transform(
        &self,
        collections: &mut SlotMap<CollectionId, Collection>,
        bus: &mut MessageBus,
        message: &Message,
    ) {
        let Some((collection, instance)) = sender_instance(collections, message) else {
            return;
        };
        let pool = collection.instances();
        let (Some(transform), Some(world_position), Some(world_rotation)) = (
            pool.transform(instance),
            pool.world_position(instance),
            pool.world_rotation(instance),
        ) else {
            return;
        };
        let response = TransformResponse {
            id: message.sender.path.0,
            position: transform.position.to_array(),
            rotation: transform.rotation.to_array(),
            world_position: world_position.to_array(),
            world_rotation: world_rotation.to_array(),
        };
        if let Err(err) = bus.post_typed(self.address(), message.sender, &response) {
            warn!(receiver = %message.sender, error = %err, "Failed to reply with transform");
        }
    }
}

fn table_number(message: &Message, key: &str) -> Option<f64> {
    message.table()?.get(key)?.as_f64()
}

/// The live instance that sent `message`, looked up in the collection owning
/// the sender's socket
fn sender_instance<'a>(
    collections: &'a mut SlotMap<CollectionId, Collection>,
    message: &Message,
) -> Option<(&'a mut Collection, InstanceHandle)> {
    let sender = message.sender;
    let found = collections
        .values_mut()
        .find(|c| c.socket() == sender.socket)
        .and_then(|collection| {
            let instance = collection.instance_from_identifier(sender.path)?;
            collection
                .instances()
                .is_alive(instance)
                .then_some((collection, instance))
        });
    if found.is_none() {
        warn!(sender = %sender, message_id = %message.id, "System message from unknown instance");
    }
    found
}
