//! Protocol State Machines (§4.9, C13): contract-net, deliberation, and
//! auction — each a small tagged state machine whose transitions are gated
//! by `accepts(messageType)` and participant membership.
//!
//! Grounded in shape on `agenticlaw_core::protocol`'s tagged-enum wire types
//! and on the tool registry's "reject the unknown/disallowed case instead of
//! crashing" pattern (`ToolRegistry::execute`'s "Unknown tool" rejection).

use std::collections::BTreeSet;

use kais_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    ContractNet,
    Deliberation,
    Auction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractNetState {
    Open,
    Bidding,
    Awarded,
    Executing,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliberationState {
    Proposing,
    Debating,
    Deciding,
    Decided,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionState {
    Announcement,
    Bids,
    Sold,
    NoSale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    ContractNet(ContractNetState),
    Deliberation(DeliberationState),
    Auction(AuctionState),
}

impl ProtocolState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ContractNet(ContractNetState::Complete)
                | Self::Deliberation(DeliberationState::Decided)
                | Self::Auction(AuctionState::Sold)
                | Self::Auction(AuctionState::NoSale)
        )
    }

    /// `(accepted message types, next state)` pairs reachable from this
    /// state (§4.9). A message whose type isn't in `accepts` is rejected.
    fn transitions(&self) -> &'static [(&'static str, ProtocolState)] {
        use AuctionState::*;
        use ContractNetState::*;
        use DeliberationState::*;
        use ProtocolState as S;
        match self {
            S::ContractNet(Open) => &[("call_for_proposals", S::ContractNet(Bidding))],
            S::ContractNet(Bidding) => &[("bid", S::ContractNet(Bidding)), ("award", S::ContractNet(Awarded))],
            S::ContractNet(Awarded) => &[("result", S::ContractNet(Executing))],
            S::ContractNet(Executing) => &[("result", S::ContractNet(Complete))],
            S::ContractNet(Complete) => &[],
            S::Deliberation(Proposing) => &[("propose", S::Deliberation(Debating))],
            S::Deliberation(Debating) => &[("debate", S::Deliberation(Debating)), ("decide", S::Deliberation(Deciding))],
            S::Deliberation(Deciding) => &[("decide", S::Deliberation(Decided))],
            S::Deliberation(Decided) => &[],
            S::Auction(Announcement) => &[("bid", S::Auction(Bids))],
            S::Auction(Bids) => &[("bid", S::Auction(Bids)), ("sold", S::Auction(Sold)), ("no_sale", S::Auction(NoSale))],
            S::Auction(Sold) => &[],
            S::Auction(NoSale) => &[],
        }
    }

    fn accepts(&self, message_type: &str) -> Option<ProtocolState> {
        self.transitions().iter().find(|(t, _)| *t == message_type).map(|(_, next)| *next)
    }
}

impl ProtocolKind {
    pub fn initial_state(&self) -> ProtocolState {
        match self {
            Self::ContractNet => ProtocolState::ContractNet(ContractNetState::Open),
            Self::Deliberation => ProtocolState::Deliberation(DeliberationState::Proposing),
            Self::Auction => ProtocolState::Auction(AuctionState::Announcement),
        }
    }
}

/// A live run of a protocol: current state plus the set of participants
/// allowed to send messages into it (§4.9).
#[derive(Clone, Debug)]
pub struct ProtocolSession {
    pub kind: ProtocolKind,
    pub state: ProtocolState,
    pub participants: BTreeSet<String>,
}

impl ProtocolSession {
    pub fn new(kind: ProtocolKind, participants: impl IntoIterator<Item = String>) -> Self {
        Self { state: kind.initial_state(), kind, participants: participants.into_iter().collect() }
    }
}

/// An incoming protocol message: `from` a participant, carrying `message_type`.
#[derive(Clone, Debug)]
pub struct IncomingMessage<'a> {
    pub from: &'a str,
    pub message_type: &'a str,
}

#[derive(Clone, Debug)]
pub struct ValidationOutcome {
    pub allowed: bool,
    pub next_state: Option<ProtocolState>,
    pub reason: Option<String>,
}

/// `ProtocolEnforcer.validate(session, incoming)` (§4.9): rejects any
/// message whose type the current state doesn't accept, whose `from` isn't a
/// current participant, or that arrives after a terminal state — a rejection
/// raises `ProtocolViolation` rather than silently no-opping.
pub struct ProtocolEnforcer;

impl ProtocolEnforcer {
    /// Validates `incoming` against `session`'s current state without
    /// mutating it; returns the outcome the caller applies via `advance`.
    pub fn validate(session: &ProtocolSession, incoming: &IncomingMessage<'_>) -> Result<ValidationOutcome> {
        if !session.participants.contains(incoming.from) {
            return Err(Error::ProtocolViolation(format!(
                "{} is not a participant in this protocol session",
                incoming.from
            )));
        }
        if session.state.is_terminal() {
            return Err(Error::ProtocolViolation(format!(
                "protocol session already in terminal state {:?}",
                session.state
            )));
        }
        match session.state.accepts(incoming.message_type) {
            Some(next) => Ok(ValidationOutcome { allowed: true, next_state: Some(next), reason: None }),
            None => Err(Error::ProtocolViolation(format!(
                "message type '{}' not accepted in state {:?}",
                incoming.message_type, session.state
            ))),
        }
    }

    /// Validates then, on success, advances `session` in place. The offending
    /// message causes no state transition on rejection (§4.9, §8 invariant).
    pub fn advance(session: &mut ProtocolSession, incoming: &IncomingMessage<'_>) -> Result<ProtocolState> {
        let outcome = Self::validate(session, incoming)?;
        let next = outcome.next_state.expect("validate only returns Ok with a next state");
        session.state = next;
        Ok(next)
    }
}
