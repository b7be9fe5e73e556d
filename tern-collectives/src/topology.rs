// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A logical ring of participants.

use tern_engine::sim_error;
use tern_engine::types::SimError;

use crate::types::Transmission;

/// Which part of the system the ring spans.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingDimension {
    /// All participants share a package; transfers use the fast path.
    Local,
    Vertical,
    Horizontal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingDirection {
    Clockwise,
    Anticlockwise,
}

/// A ring of `nodes_in_ring` participants, as seen from participant `id`.
#[derive(Clone, Debug)]
pub struct RingTopology {
    id: usize,
    nodes_in_ring: usize,
    dimension: RingDimension,
}

impl RingTopology {
    pub fn new(id: usize, nodes_in_ring: usize, dimension: RingDimension) -> Result<Self, SimError> {
        if nodes_in_ring == 0 {
            return sim_error!("a ring must contain at least one node");
        }
        if id >= nodes_in_ring {
            return sim_error!(format!(
                "participant {id} is not part of a ring of {nodes_in_ring} nodes"
            ));
        }
        Ok(Self {
            id,
            nodes_in_ring,
            dimension,
        })
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn nodes_in_ring(&self) -> usize {
        self.nodes_in_ring
    }

    #[must_use]
    pub fn dimension(&self) -> RingDimension {
        self.dimension
    }

    /// Transmission class used for all traffic on this ring.
    #[must_use]
    pub fn transmission(&self) -> Transmission {
        match self.dimension {
            RingDimension::Local => Transmission::Fast,
            RingDimension::Vertical | RingDimension::Horizontal => Transmission::Usual,
        }
    }

    /// The node `distance` positions away from `node` in `direction`.
    #[must_use]
    pub fn node_at_distance(&self, node: usize, distance: u64, direction: RingDirection) -> usize {
        let n = self.nodes_in_ring as u64;
        let offset = distance % n;
        let node = node as u64 % n;
        let result = match direction {
            RingDirection::Clockwise => (node + offset) % n,
            RingDirection::Anticlockwise => (node + n - offset) % n,
        };
        result as usize
    }

    #[must_use]
    pub fn next_node(&self, node: usize, direction: RingDirection) -> usize {
        self.node_at_distance(node, 1, direction)
    }

    #[must_use]
    pub fn previous_node(&self, node: usize, direction: RingDirection) -> usize {
        let opposite = match direction {
            RingDirection::Clockwise => RingDirection::Anticlockwise,
            RingDirection::Anticlockwise => RingDirection::Clockwise,
        };
        self.node_at_distance(node, 1, opposite)
    }
}
