// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The closed set of collective algorithms a session can run.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use tern_engine::types::SimError;
use tern_track::entity::Entity;

use crate::completion::CompletionKey;
use crate::session::Session;
use crate::topology::{RingDirection, RingTopology};
use crate::trivance::Trivance;
use crate::types::{AlgorithmEvent, CollectiveType};

/// Names the algorithm to build, e.g. from configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AlgorithmKind {
    #[default]
    Trivance,
}

impl FromStr for AlgorithmKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trivance" => Ok(Self::Trivance),
            _ => Err(SimError(format!("unknown collective algorithm '{s}'"))),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AlgorithmKind::Trivance => write!(f, "trivance"),
        }
    }
}

pub enum CollectiveAlgorithm {
    Trivance(Trivance),
}

impl CollectiveAlgorithm {
    /// Build the algorithm `kind` for the participant at the origin of
    /// `topology`.
    pub fn new(
        kind: AlgorithmKind,
        parent: &Rc<Entity>,
        collective: CollectiveType,
        topology: Rc<RingTopology>,
        data_size: u64,
    ) -> Result<Self, SimError> {
        match kind {
            AlgorithmKind::Trivance => Ok(Self::Trivance(Trivance::new(
                parent, collective, topology, data_size,
            )?)),
        }
    }

    /// Deliver an event to the algorithm.
    ///
    /// Returns whether the scheduler should keep delivering events.
    pub fn on_event(
        &mut self,
        event: AlgorithmEvent,
        session: &mut dyn Session,
    ) -> Result<bool, SimError> {
        match event {
            AlgorithmEvent::Init => self.on_init(session),
            AlgorithmEvent::CreditReturn => self.on_credit_return(session),
            AlgorithmEvent::ExchangeCompleted(key) => self.on_exchange_completed(key, session),
        }
    }

    pub fn on_init(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        match self {
            Self::Trivance(algorithm) => algorithm.on_init(session),
        }
    }

    pub fn on_credit_return(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        match self {
            Self::Trivance(algorithm) => algorithm.on_credit_return(session),
        }
    }

    pub fn on_exchange_completed(
        &mut self,
        key: CompletionKey,
        session: &mut dyn Session,
    ) -> Result<bool, SimError> {
        match self {
            Self::Trivance(algorithm) => algorithm.on_exchange_completed(key, session),
        }
    }

    #[must_use]
    pub fn specify_direction(&self) -> RingDirection {
        match self {
            Self::Trivance(algorithm) => algorithm.specify_direction(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Trivance(_) => AlgorithmKind::Trivance,
        }
    }

    /// Whether the algorithm has handed its channel back to the session.
    #[must_use]
    pub fn is_released(&self) -> bool {
        match self {
            Self::Trivance(algorithm) => algorithm.flow().is_released(),
        }
    }
}
