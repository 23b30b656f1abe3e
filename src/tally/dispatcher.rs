//! Tally dispatcher
//!
//! Turns engine deltas into outbound tally messages:
//! - maps each [`SourceKey`] to a receiver address (collapsed to the source
//!   id, or qualified by bus in strict mode)
//! - suppresses no-op commands by reference counting lit addresses
//! - emits every activation before any deactivation, so a cut briefly shows
//!   both sources lit rather than none
//! - hands the messages to the pacer, which spaces them on the wire

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::pacer::PacerHandle;
use super::types::{Bus, SourceId, SourceKey, TallyCommand, TallyDelta};
use crate::osc::OscMessage;

/// Address template validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("address template must start with '/': {0:?}")]
    NotAnAddress(String),

    #[error("address template has no {{source}} placeholder: {0:?}")]
    MissingSource(String),

    #[error("strict per-row mode needs a {{bus}} placeholder in the address template: {0:?}")]
    MissingBus(String),

    #[error("{{bus}} placeholder is only available in strict per-row mode: {0:?}")]
    UnexpectedBus(String),
}

/// Receiver address of a tally light
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TallyAddress {
    /// `None` when addresses are collapsed to the source id
    pub bus: Option<Bus>,
    pub source: SourceId,
}

/// Validated address template with `{source}` and optional `{bus}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    template: String,
    strict: bool,
}

impl AddressTemplate {
    /// Validate a template for the given addressing mode
    pub fn parse(template: &str, strict: bool) -> Result<Self, TemplateError> {
        if !template.starts_with('/') {
            return Err(TemplateError::NotAnAddress(template.to_string()));
        }
        if !template.contains("{source}") {
            return Err(TemplateError::MissingSource(template.to_string()));
        }
        match (strict, template.contains("{bus}")) {
            (true, false) => return Err(TemplateError::MissingBus(template.to_string())),
            (false, true) => return Err(TemplateError::UnexpectedBus(template.to_string())),
            _ => {}
        }

        Ok(Self {
            template: template.to_string(),
            strict,
        })
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Address a key lights up under this template's mode
    pub fn address_for(&self, key: &SourceKey) -> TallyAddress {
        TallyAddress {
            bus: self.strict.then_some(key.bus),
            source: key.source,
        }
    }

    pub fn render(&self, address: &TallyAddress) -> String {
        let rendered = self.template.replace("{source}", &address.source.to_string());
        match address.bus {
            Some(bus) => rendered.replace("{bus}", &bus.to_string()),
            None => rendered,
        }
    }
}

/// Settings the dispatcher needs from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub template: AddressTemplate,
    pub spacing: Duration,
    /// Reset sweep covers source ids `1..=reset_range`
    pub reset_range: u16,
}

/// Idempotent, ordered tally emitter
pub struct TallyDispatcher {
    template: AddressTemplate,
    /// Number of on-air keys holding each address
    lit: BTreeMap<TallyAddress, usize>,
    outbound: PacerHandle,
}

impl TallyDispatcher {
    pub fn new(template: AddressTemplate, outbound: PacerHandle) -> Self {
        Self {
            template,
            lit: BTreeMap::new(),
            outbound,
        }
    }

    pub fn template(&self) -> &AddressTemplate {
        &self.template
    }

    /// Swap the template; callers re-run reconciliation afterwards
    pub fn set_template(&mut self, template: AddressTemplate) {
        self.template = template;
        self.lit.clear();
    }

    pub fn outbound(&self) -> &PacerHandle {
        &self.outbound
    }

    /// Whether an address is currently lit
    pub fn is_lit(&self, address: &TallyAddress) -> bool {
        self.lit.contains_key(address)
    }

    /// Work out which commands a delta needs, updating the lit addresses
    ///
    /// Activations come first. A command is produced only when an address
    /// changes between unlit and lit; deactivating an unlit address is
    /// suppressed.
    pub fn plan(&mut self, delta: &TallyDelta) -> Vec<TallyCommand> {
        let mut commands = Vec::with_capacity(delta.len());

        for key in &delta.to_activate {
            let address = self.template.address_for(key);
            let holders = self.lit.entry(address).or_insert(0);
            *holders += 1;
            if *holders == 1 {
                commands.push(self.command(key, &address, true));
            }
        }

        for key in &delta.to_deactivate {
            let address = self.template.address_for(key);
            let Some(holders) = self.lit.get_mut(&address) else {
                debug!(%key, "Suppressing off for an address that is not lit");
                continue;
            };
            *holders -= 1;
            if *holders == 0 {
                self.lit.remove(&address);
                commands.push(self.command(key, &address, false));
            }
        }

        commands
    }

    /// Plan and queue a delta; returns the number of messages queued
    pub fn dispatch(&mut self, delta: &TallyDelta) -> usize {
        let commands = self.plan(delta);
        for command in &commands {
            debug!(
                key = %command.key,
                address = %command.address,
                active = command.active,
                "Queueing tally command"
            );
            self.outbound
                .enqueue(OscMessage::tally(command.address.clone(), command.active));
        }
        commands.len()
    }

    /// Switch a fixed bank of lights off regardless of what is believed lit
    ///
    /// In strict mode the bank is repeated for every bus in `buses`.
    /// Forgets every lit address.
    pub fn reset_sweep(&mut self, buses: &[Bus], reset_range: u16) -> usize {
        self.lit.clear();

        let addresses: Vec<TallyAddress> = if self.template.is_strict() {
            buses
                .iter()
                .flat_map(|bus| {
                    (1..=reset_range).map(move |source| TallyAddress {
                        bus: Some(*bus),
                        source: SourceId(source),
                    })
                })
                .collect()
        } else {
            (1..=reset_range)
                .map(|source| TallyAddress {
                    bus: None,
                    source: SourceId(source),
                })
                .collect()
        };

        info!("Resetting {} tally lights", addresses.len());
        for address in &addresses {
            self.outbound
                .enqueue(OscMessage::tally(self.template.render(address), false));
        }
        addresses.len()
    }

    fn command(&self, key: &SourceKey, address: &TallyAddress, active: bool) -> TallyCommand {
        TallyCommand {
            key: *key,
            address: self.template.render(address),
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::pacer::PacerCommand;
    use crate::tally::Role;
    use tokio::sync::mpsc;

    fn collapsed() -> AddressTemplate {
        AddressTemplate::parse("/exec/1/{source}", false).unwrap()
    }

    fn strict() -> AddressTemplate {
        AddressTemplate::parse("/tally/{bus}/{source}", true).unwrap()
    }

    fn make_dispatcher(
        template: AddressTemplate,
    ) -> (TallyDispatcher, mpsc::UnboundedReceiver<PacerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TallyDispatcher::new(template, PacerHandle::new(tx)), rx)
    }

    fn delta(on: &[SourceKey], off: &[SourceKey]) -> TallyDelta {
        TallyDelta {
            to_activate: on.to_vec(),
            to_deactivate: off.to_vec(),
        }
    }

    fn summary(commands: &[TallyCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|c| format!("{}={}", c.address, u8::from(c.active)))
            .collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PacerCommand>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let PacerCommand::Send(msg) = cmd {
                out.push(msg.to_string());
            }
        }
        out
    }

    #[test]
    fn test_template_validation() {
        assert!(AddressTemplate::parse("/exec/1/{source}", false).is_ok());
        assert_eq!(
            AddressTemplate::parse("exec/{source}", false),
            Err(TemplateError::NotAnAddress("exec/{source}".into()))
        );
        assert!(matches!(
            AddressTemplate::parse("/exec/1", false),
            Err(TemplateError::MissingSource(_))
        ));
        assert!(matches!(
            AddressTemplate::parse("/exec/1/{source}", true),
            Err(TemplateError::MissingBus(_))
        ));
        assert!(matches!(
            AddressTemplate::parse("/exec/{bus}/{source}", false),
            Err(TemplateError::UnexpectedBus(_))
        ));
    }

    #[test]
    fn test_render() {
        let key = SourceKey::new(Bus::Downstream(1), Role::DownstreamKeyerFill, SourceId(12));
        let c = collapsed();
        assert_eq!(c.render(&c.address_for(&key)), "/exec/1/12");
        let s = strict();
        assert_eq!(s.render(&s.address_for(&key)), "/tally/D1/12");
    }

    #[test]
    fn test_activations_precede_deactivations() {
        let (mut dispatcher, _rx) = make_dispatcher(collapsed());
        dispatcher.plan(&delta(&[SourceKey::program(0, SourceId(1))], &[]));

        let commands = dispatcher.plan(&delta(
            &[SourceKey::program(0, SourceId(3))],
            &[SourceKey::program(0, SourceId(1))],
        ));
        assert_eq!(summary(&commands), vec!["/exec/1/3=1", "/exec/1/1=0"]);
    }

    #[test]
    fn test_no_off_for_unlit_address() {
        let (mut dispatcher, _rx) = make_dispatcher(collapsed());
        let commands = dispatcher.plan(&delta(&[], &[SourceKey::program(0, SourceId(9))]));
        assert!(commands.is_empty());
    }

    #[test]
    fn test_collapsed_mode_keeps_shared_source_lit() {
        let (mut dispatcher, _rx) = make_dispatcher(collapsed());
        let program = SourceKey::program(0, SourceId(4));
        let dsk = SourceKey::keyer_fill(Bus::Downstream(0), SourceId(4));

        assert_eq!(summary(&dispatcher.plan(&delta(&[program, dsk], &[]))), vec!["/exec/1/4=1"]);
        assert!(dispatcher.plan(&delta(&[], &[program])).is_empty());
        assert_eq!(summary(&dispatcher.plan(&delta(&[], &[dsk]))), vec!["/exec/1/4=0"]);
    }

    #[test]
    fn test_strict_mode_addresses_each_bus() {
        let (mut dispatcher, _rx) = make_dispatcher(strict());
        let me0 = SourceKey::program(0, SourceId(4));
        let me1 = SourceKey::program(1, SourceId(4));

        let commands = dispatcher.plan(&delta(&[me0, me1], &[]));
        assert_eq!(summary(&commands), vec!["/tally/M0/4=1", "/tally/M1/4=1"]);

        let commands = dispatcher.plan(&delta(&[], &[me0]));
        assert_eq!(summary(&commands), vec!["/tally/M0/4=0"]);
        assert!(dispatcher.is_lit(&TallyAddress {
            bus: Some(Bus::MixEffect(1)),
            source: SourceId(4)
        }));
    }

    #[test]
    fn test_dispatch_queues_osc_messages() {
        let (mut dispatcher, mut rx) = make_dispatcher(collapsed());
        let queued = dispatcher.dispatch(&delta(&[SourceKey::preview(0, SourceId(2))], &[]));
        assert_eq!(queued, 1);
        assert_eq!(drain(&mut rx), vec!["/exec/1/2 1f"]);
    }

    #[test]
    fn test_reset_sweep() {
        let (mut dispatcher, mut rx) = make_dispatcher(collapsed());
        dispatcher.dispatch(&delta(&[SourceKey::program(0, SourceId(2))], &[]));
        drain(&mut rx);

        assert_eq!(dispatcher.reset_sweep(&[Bus::MixEffect(0)], 3), 3);
        assert_eq!(
            drain(&mut rx),
            vec!["/exec/1/1 0f", "/exec/1/2 0f", "/exec/1/3 0f"]
        );
        // Baseline is now "all off": the same key lights again
        assert_eq!(
            dispatcher.dispatch(&delta(&[SourceKey::program(0, SourceId(2))], &[])),
            1
        );

        let (mut dispatcher, mut rx) = make_dispatcher(strict());
        dispatcher.reset_sweep(&[Bus::MixEffect(0), Bus::Downstream(0)], 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                "/tally/M0/1 0f",
                "/tally/M0/2 0f",
                "/tally/D0/1 0f",
                "/tally/D0/2 0f"
            ]
        );
    }
}
