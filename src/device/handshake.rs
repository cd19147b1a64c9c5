//! Drive identification handshake.
//!
//! Each candidate port is configured, opened, sent the power-up sequence and
//! asked for its model/firmware string. The first port whose reply matches
//! the expected identity is kept open; every other port is closed before the
//! next one is tried.

use crate::serial::{transport::LinkConfig, DriveProtocol, SerialInterface, Transport};

use super::{CandidatePort, DeviceError, DeviceIdentity, ModelRevision, Result};

/// Position of the handshake. `candidate` indexes the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Configuring { candidate: usize },
    Opening { candidate: usize },
    PoweringUp { candidate: usize },
    AwaitingIdentity { candidate: usize },
    Verifying { candidate: usize, reply: String },
    Bound { candidate: usize },
    Unbound,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Bound { .. } | HandshakeState::Unbound)
    }
}

/// How probing one candidate ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    OpenFailed(String),
    ExchangeFailed(String),
    ShortReply(String),
    Mismatch(ModelRevision),
    Matched(ModelRevision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub port_name: String,
    pub result: ProbeResult,
}

/// Result of a successful handshake: the open protocol and where it is bound
pub struct Binding<T: Transport> {
    pub protocol: DriveProtocol<T>,
    pub port: CandidatePort,
    pub revision: ModelRevision,
}

pub struct Handshake<T: Transport> {
    identity: DeviceIdentity,
    candidates: Vec<CandidatePort>,
    protocol: DriveProtocol<T>,
    state: HandshakeState,
    history: Vec<HandshakeState>,
    outcomes: Vec<ProbeOutcome>,
    revision: Option<ModelRevision>,
}

impl<T: Transport> Handshake<T> {
    pub fn new(identity: DeviceIdentity, candidates: Vec<CandidatePort>, transport: T, link: LinkConfig) -> Self {
        Self {
            identity,
            candidates,
            protocol: DriveProtocol::new(SerialInterface::new(transport, link)),
            state: HandshakeState::Idle,
            history: vec![HandshakeState::Idle],
            outcomes: Vec::new(),
            revision: None,
        }
    }

    /// Current state
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[HandshakeState] {
        &self.history
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }

    pub fn candidates(&self) -> &[CandidatePort] {
        &self.candidates
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance by one transition. Terminal states do not change.
    pub fn step(&mut self) -> &HandshakeState {
        let next = match self.state.clone() {
            HandshakeState::Idle => self.candidate_state(0),
            HandshakeState::Configuring { candidate } => {
                let port_name = self.candidates[candidate].port_name.clone();
                self.protocol.interface_mut().configure(&port_name);
                HandshakeState::Opening { candidate }
            }
            HandshakeState::Opening { candidate } => match self.protocol.interface_mut().open() {
                Ok(()) => HandshakeState::PoweringUp { candidate },
                Err(e) => {
                    log::warn!("Unable to open {}: {}", self.candidates[candidate].port_name, e);
                    self.record(candidate, ProbeResult::OpenFailed(e.to_string()));
                    self.candidate_state(candidate + 1)
                }
            },
            HandshakeState::PoweringUp { candidate } => {
                let identity = self.identity;
                match self.protocol.power_up(identity.firmware_version, identity.model_number) {
                    Ok(()) => HandshakeState::AwaitingIdentity { candidate },
                    Err(e) => self.reject(candidate, ProbeResult::ExchangeFailed(e.to_string())),
                }
            }
            HandshakeState::AwaitingIdentity { candidate } => match self.protocol.model_revision() {
                Ok(reply) => HandshakeState::Verifying { candidate, reply },
                Err(e) => self.reject(candidate, ProbeResult::ExchangeFailed(e.to_string())),
            },
            HandshakeState::Verifying { candidate, reply } => match ModelRevision::parse(&reply) {
                Some(revision) if self.identity.matches(&revision) => {
                    log::info!(
                        "Applied Motion drive detected on {} with firmware and model number {}",
                        self.candidates[candidate].port_name,
                        revision
                    );
                    self.record(candidate, ProbeResult::Matched(revision.clone()));
                    self.revision = Some(revision);
                    HandshakeState::Bound { candidate }
                }
                Some(revision) => self.reject(candidate, ProbeResult::Mismatch(revision)),
                None => self.reject(candidate, ProbeResult::ShortReply(reply)),
            },
            terminal @ (HandshakeState::Bound { .. } | HandshakeState::Unbound) => terminal,
        };

        if next != self.state {
            self.history.push(next.clone());
            self.state = next;
        }
        &self.state
    }

    /// Step until a terminal state, then hand over the bound protocol
    pub fn run(mut self) -> Result<Binding<T>> {
        while !self.is_finished() {
            self.step();
        }
        self.into_binding()
    }

    /// The binding if the handshake reached `Bound`, otherwise `NotFound`.
    ///
    /// Consuming an unfinished handshake releases whatever port it holds.
    pub fn into_binding(self) -> Result<Binding<T>> {
        match (self.state, self.revision) {
            (HandshakeState::Bound { candidate }, Some(revision)) => Ok(Binding {
                protocol: self.protocol,
                port: self.candidates[candidate].clone(),
                revision,
            }),
            _ => {
                log::warn!(
                    "No drive matching {} on {} candidate ports",
                    self.identity,
                    self.candidates.len()
                );
                Err(DeviceError::NotFound {
                    candidates: self.candidates.len(),
                })
            }
        }
    }

    fn candidate_state(&self, candidate: usize) -> HandshakeState {
        if candidate < self.candidates.len() {
            HandshakeState::Configuring { candidate }
        } else {
            HandshakeState::Unbound
        }
    }

    // Close the candidate's port and move on
    fn reject(&mut self, candidate: usize, result: ProbeResult) -> HandshakeState {
        log::warn!("Skipping {}: {:?}", self.candidates[candidate].port_name, result);
        self.protocol.interface_mut().disconnect();
        self.record(candidate, result);
        self.candidate_state(candidate + 1)
    }

    fn record(&mut self, candidate: usize, result: ProbeResult) {
        self.outcomes.push(ProbeOutcome {
            port_name: self.candidates[candidate].port_name.clone(),
            result,
        });
    }
}
