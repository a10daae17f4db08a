//! Compiled scripts and the callbacks they define

use crate::core::property::PropertyDefinition;
use bitflags::bitflags;
use rhai::AST;

bitflags! {
    /// Callbacks a script defines
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ScriptCallbacks: u8 {
        const INIT = 1 << 0;
        const FINAL = 1 << 1;
        const UPDATE = 1 << 2;
        const ON_MESSAGE = 1 << 3;
        const ON_INPUT = 1 << 4;
        const ON_RELOAD = 1 << 5;
    }
}

/// A lifecycle callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    Init,
    Final,
    Update,
    OnMessage,
    OnInput,
    OnReload,
}

impl Callback {
    pub const ALL: [Callback; 6] = [
        Callback::Init,
        Callback::Final,
        Callback::Update,
        Callback::OnMessage,
        Callback::OnInput,
        Callback::OnReload,
    ];

    /// Function name in the script
    pub fn name(self) -> &'static str {
        match self {
            Callback::Init => "init",
            Callback::Final => "final",
            Callback::Update => "update",
            Callback::OnMessage => "on_message",
            Callback::OnInput => "on_input",
            Callback::OnReload => "on_reload",
        }
    }

    /// Number of parameters, not counting `this`
    pub fn arity(self) -> usize {
        match self {
            Callback::Init | Callback::Final | Callback::OnReload => 0,
            Callback::Update => 1,
            Callback::OnInput => 2,
            Callback::OnMessage => 3,
        }
    }

    pub fn flag(self) -> ScriptCallbacks {
        match self {
            Callback::Init => ScriptCallbacks::INIT,
            Callback::Final => ScriptCallbacks::FINAL,
            Callback::Update => ScriptCallbacks::UPDATE,
            Callback::OnMessage => ScriptCallbacks::ON_MESSAGE,
            Callback::OnInput => ScriptCallbacks::ON_INPUT,
            Callback::OnReload => ScriptCallbacks::ON_RELOAD,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A script that compiled and whose top level ran successfully
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub name: String,
    pub source: String,
    pub ast: AST,
    pub callbacks: ScriptCallbacks,
    /// Properties declared at the top level, in declaration order
    pub properties: Vec<PropertyDefinition>,
}

impl CompiledScript {
    pub fn has(&self, callback: Callback) -> bool {
        self.callbacks.contains(callback.flag())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }
}
