use crate::command_log::{CommandLog, CorrelationId};
use crate::commands::{
    coerce_params, CommandCatalog, CommandDescriptor, CommandKind, ConfirmationPolicy,
    TypedConfirmation,
};
use crate::dispatch::{apply_dispatch_result, DispatchRequest, DispatchResponse, PendingDispatch, Toast};
use crate::recent::{RecentCommands, RecentStore, RecentStoreError};
use crate::CommandTarget;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Inline parameter form for one parameterized command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamForm {
    descriptor: CommandDescriptor,
    inputs: Vec<String>,
    focus: usize,
}

impl ParamForm {
    pub fn new(descriptor: CommandDescriptor) -> Self {
        let inputs = descriptor
            .params
            .iter()
            .map(|param| param.initial_input())
            .collect();
        Self {
            descriptor,
            inputs,
            focus: 0,
        }
    }

    pub fn key(&self) -> String {
        self.descriptor.form_key()
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focus_next(&mut self) {
        if !self.inputs.is_empty() {
            self.focus = (self.focus + 1) % self.inputs.len();
        }
    }

    pub fn focus_prev(&mut self) {
        if !self.inputs.is_empty() {
            self.focus = (self.focus + self.inputs.len() - 1) % self.inputs.len();
        }
    }

    pub fn push_char(&mut self, ch: char) {
        if let Some(input) = self.inputs.get_mut(self.focus) {
            input.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(input) = self.inputs.get_mut(self.focus) {
            input.pop();
        }
    }
}

/// A dispatch waiting on the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    request: DispatchRequest,
    policy: ConfirmationPolicy,
    gate: Option<TypedConfirmation>,
    prompt: String,
}

impl PendingConfirmation {
    pub fn request(&self) -> &DispatchRequest {
        &self.request
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn typed_input(&self) -> Option<&str> {
        self.gate.as_ref().map(TypedConfirmation::input)
    }

    pub fn execute_enabled(&self) -> bool {
        self.gate
            .as_ref()
            .map(TypedConfirmation::execute_enabled)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleStep {
    /// No confirmation required; dispatch right away.
    Ready(DispatchRequest),
    NeedsConfirmation,
    FormOpened(String),
    Rejected(String),
}

/// Catalog, forms, confirmation and the dispatch bookkeeping around them.
#[derive(Debug)]
pub struct CommandConsole {
    catalog: CommandCatalog,
    recent: RecentCommands,
    store: Option<RecentStore>,
    log: CommandLog,
    form: Option<ParamForm>,
    confirmation: Option<PendingConfirmation>,
    in_flight: HashMap<CorrelationId, PendingDispatch>,
    confirm_simple: bool,
}

impl CommandConsole {
    pub fn new(recent: RecentCommands, store: Option<RecentStore>, confirm_simple: bool) -> Self {
        Self {
            catalog: CommandCatalog::default(),
            recent,
            store,
            log: CommandLog::default(),
            form: None,
            confirmation: None,
            in_flight: HashMap::new(),
            confirm_simple,
        }
    }

    pub fn set_catalog(&mut self, catalog: CommandCatalog) {
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn recent(&self) -> &RecentCommands {
        &self.recent
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn form(&self) -> Option<&ParamForm> {
        self.form.as_ref()
    }

    pub fn form_mut(&mut self) -> Option<&mut ParamForm> {
        self.form.as_mut()
    }

    pub fn confirmation(&self) -> Option<&PendingConfirmation> {
        self.confirmation.as_ref()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn descriptor(&self, kind: CommandKind, name: &str) -> Option<CommandDescriptor> {
        self.catalog.find(kind, name).or_else(|| match kind {
            // Lifecycle quick actions work before the catalog arrives.
            CommandKind::Agent => Some(CommandDescriptor::agent(name)),
            CommandKind::Game => None,
        })
    }

    pub fn close_form(&mut self) {
        self.form = None;
    }

    /// First step of running a command. Parameterized commands open their
    /// form; everything else goes straight to the confirmation policy.
    pub fn request(&mut self, kind: CommandKind, name: &str, target: CommandTarget) -> ConsoleStep {
        let Some(descriptor) = self.descriptor(kind, name) else {
            return ConsoleStep::Rejected(format!("unknown {kind} command: {name}"));
        };
        if descriptor.is_parameterized() {
            let key = descriptor.form_key();
            let already_open = self.form.as_ref().map(ParamForm::key).as_deref() == Some(key.as_str());
            if !already_open {
                self.form = Some(ParamForm::new(descriptor));
            }
            return ConsoleStep::FormOpened(key);
        }
        let request = DispatchRequest::new(target, kind, name, Vec::new());
        self.stage(&descriptor, request)
    }

    /// Coerces the open form into arguments and stages the dispatch.
    pub fn submit_form(&mut self, target: CommandTarget) -> ConsoleStep {
        let Some(form) = self.form.take() else {
            return ConsoleStep::Rejected("no command form open".to_string());
        };
        let args = coerce_params(&form.descriptor.params, &form.inputs);
        let request = DispatchRequest::new(
            target,
            form.descriptor.kind,
            form.descriptor.name.clone(),
            args,
        );
        self.stage(&form.descriptor, request)
    }

    pub fn request_recent(&mut self, index: usize, target: CommandTarget) -> ConsoleStep {
        let Some(item) = self.recent.get(index).cloned() else {
            return ConsoleStep::Rejected(format!("no recent command #{}", index + 1));
        };
        self.request(item.kind, &item.name, target)
    }

    fn stage(&mut self, descriptor: &CommandDescriptor, request: DispatchRequest) -> ConsoleStep {
        let policy = ConfirmationPolicy::for_command(descriptor, self.confirm_simple);
        let Some(prompt) = policy.prompt(&request.command, request.target) else {
            self.confirmation = None;
            return ConsoleStep::Ready(request);
        };
        let gate = match &policy {
            ConfirmationPolicy::Typed { expected } => Some(TypedConfirmation::new(expected.clone())),
            _ => None,
        };
        self.confirmation = Some(PendingConfirmation {
            request,
            policy,
            gate,
            prompt,
        });
        ConsoleStep::NeedsConfirmation
    }

    pub fn type_confirmation(&mut self, ch: char) {
        if let Some(gate) = self
            .confirmation
            .as_mut()
            .and_then(|pending| pending.gate.as_mut())
        {
            gate.push(ch);
        }
    }

    pub fn backspace_confirmation(&mut self) {
        if let Some(gate) = self
            .confirmation
            .as_mut()
            .and_then(|pending| pending.gate.as_mut())
        {
            gate.pop();
        }
    }

    /// Releases the staged request once the gate allows it. A typed gate
    /// that does not match keeps the confirmation open.
    pub fn confirm(&mut self) -> Option<DispatchRequest> {
        if !self.confirmation.as_ref()?.execute_enabled() {
            return None;
        }
        self.confirmation.take().map(|pending| pending.request)
    }

    pub fn cancel(&mut self) -> bool {
        if self.confirmation.take().is_some() {
            return true;
        }
        self.form.take().is_some()
    }

    /// Appends the pending log row and remembers the command.
    pub fn begin_dispatch(&mut self, request: DispatchRequest, now: DateTime<Utc>) -> PendingDispatch {
        let id = self.log.append_pending(&request.command, request.target, now);
        self.recent.push(&request.command, request.kind);
        let pending = PendingDispatch { id, request };
        self.in_flight.insert(id, pending.clone());
        pending
    }

    pub fn persist_recent(&self) -> Result<(), RecentStoreError> {
        match &self.store {
            Some(store) => store.save(&self.recent),
            None => Ok(()),
        }
    }

    pub fn complete_dispatch(
        &mut self,
        id: CorrelationId,
        result: Result<DispatchResponse, String>,
        now: DateTime<Utc>,
    ) -> Option<Toast> {
        let pending = self.in_flight.remove(&id)?;
        Some(apply_dispatch_result(&mut self.log, &pending, result, now))
    }
}
