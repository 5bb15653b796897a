use crate::CommandTarget;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Destructive commands that always require the operator to retype the name.
pub const DANGEROUS_COMMANDS: &[&str] = &["DISCONNECT_ALL", "KILL_ALL", "SHUTDOWN_ALL"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Agent,
    Game,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Agent => "agent",
            CommandKind::Game => "game",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(CommandKind::Agent),
            "game" => Ok(CommandKind::Game),
            other => Err(format!("Unknown command type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "int", alias = "integer")]
    Number,
    #[serde(other)]
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Initial text shown in a parameter form field.
    pub fn initial_input(&self) -> String {
        match &self.default {
            Some(Value::String(value)) => value.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(rename = "type", default = "default_game_kind")]
    pub kind: CommandKind,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub dangerous: bool,
}

fn default_game_kind() -> CommandKind {
    CommandKind::Game
}

impl CommandDescriptor {
    pub fn agent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CommandKind::Agent,
            category: "lifecycle".to_string(),
            params: Vec::new(),
            dangerous: false,
        }
    }

    pub fn form_key(&self) -> String {
        form_key(self.kind, &self.name)
    }

    pub fn is_parameterized(&self) -> bool {
        !self.params.is_empty()
    }

    /// Palette group; blank categories fall under "general".
    pub fn category_label(&self) -> &str {
        let category = self.category.trim();
        if category.is_empty() {
            "general"
        } else {
            category
        }
    }
}

pub fn form_key(kind: CommandKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}

/// Static command catalog, fetched once per console start.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandCatalog {
    #[serde(default)]
    pub agent_commands: Vec<String>,
    #[serde(default)]
    pub game_commands: Vec<CommandDescriptor>,
}

impl CommandCatalog {
    pub fn find(&self, kind: CommandKind, name: &str) -> Option<CommandDescriptor> {
        match kind {
            CommandKind::Agent => self
                .agent_commands
                .iter()
                .find(|candidate| candidate.as_str() == name)
                .map(|name| CommandDescriptor::agent(name)),
            CommandKind::Game => self
                .game_commands
                .iter()
                .find(|descriptor| descriptor.name == name)
                .cloned(),
        }
    }

    /// Every command as a descriptor in palette order: agent commands first,
    /// then game commands grouped by category.
    pub fn entries(&self) -> Vec<CommandDescriptor> {
        let mut entries: Vec<CommandDescriptor> = self
            .agent_commands
            .iter()
            .map(|name| CommandDescriptor::agent(name))
            .collect();
        entries.extend(self.game_categories().into_values().flatten().cloned());
        entries
    }

    pub fn game_categories(&self) -> BTreeMap<&str, Vec<&CommandDescriptor>> {
        let mut grouped: BTreeMap<&str, Vec<&CommandDescriptor>> = BTreeMap::new();
        for descriptor in &self.game_commands {
            grouped
                .entry(descriptor.category_label())
                .or_default()
                .push(descriptor);
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.agent_commands.is_empty() && self.game_commands.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub key: char,
    pub name: &'static str,
    pub kind: CommandKind,
}

pub const QUICK_ACTIONS: [QuickAction; 4] = [
    QuickAction {
        key: 's',
        name: "start",
        kind: CommandKind::Agent,
    },
    QuickAction {
        key: 'x',
        name: "stop",
        kind: CommandKind::Agent,
    },
    QuickAction {
        key: 'R',
        name: "restart",
        kind: CommandKind::Agent,
    },
    QuickAction {
        key: 'u',
        name: "update",
        kind: CommandKind::Agent,
    },
];

pub fn quick_action_for_key(key: char) -> Option<QuickAction> {
    QUICK_ACTIONS.iter().copied().find(|action| action.key == key)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandArg {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub value: Value,
}

/// Best-effort coercion: never rejects, defaults instead.
pub fn coerce_param(spec: &ParamSpec, raw: Option<&str>) -> CommandArg {
    let raw = raw.unwrap_or_default();
    let value = match spec.kind {
        ParamKind::Boolean => Value::Bool(parse_bool_input(raw)),
        ParamKind::Number => Value::from(raw.trim().parse::<i64>().unwrap_or(0)),
        ParamKind::String => Value::String(raw.to_string()),
    };
    CommandArg {
        kind: spec.kind,
        value,
    }
}

pub fn coerce_params(specs: &[ParamSpec], inputs: &[String]) -> Vec<CommandArg> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| coerce_param(spec, inputs.get(index).map(String::as_str)))
        .collect()
}

fn parse_bool_input(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}

pub fn is_dangerous(descriptor: &CommandDescriptor) -> bool {
    descriptor.dangerous || DANGEROUS_COMMANDS.contains(&descriptor.name.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    None,
    Simple,
    Typed { expected: String },
}

impl ConfirmationPolicy {
    /// `confirm_simple` is the operator preference; it never relaxes the
    /// typed gate on dangerous commands.
    pub fn for_command(descriptor: &CommandDescriptor, confirm_simple: bool) -> Self {
        if is_dangerous(descriptor) {
            ConfirmationPolicy::Typed {
                expected: descriptor.name.clone(),
            }
        } else if confirm_simple {
            ConfirmationPolicy::Simple
        } else {
            ConfirmationPolicy::None
        }
    }

    pub fn prompt(&self, command: &str, target: CommandTarget) -> Option<String> {
        match self {
            ConfirmationPolicy::None => None,
            ConfirmationPolicy::Simple => Some(format!(
                "Execute '{command}' on {}? (y/n)",
                target.label()
            )),
            ConfirmationPolicy::Typed { expected } => Some(format!(
                "DANGEROUS: type '{expected}' to execute on {}",
                target.label()
            )),
        }
    }
}

/// Typed re-entry gate for dangerous commands. Exact, case-sensitive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedConfirmation {
    expected: String,
    input: String,
}

impl TypedConfirmation {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            input: String::new(),
        }
    }

    pub fn push(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn pop(&mut self) {
        self.input.pop();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn execute_enabled(&self) -> bool {
        self.input == self.expected
    }
}
