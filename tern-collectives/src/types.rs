// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::fmt;
use std::str::FromStr;

use tern_engine::types::SimError;

use crate::completion::CompletionKey;

/// Number of exchanges issued per step, one to each ring direction.
pub const PARALLEL_REDUCE: usize = 2;

/// The kind of collective being run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectiveType {
    AllReduce,
    ReduceScatter,
    AllGather,
    AllToAll,
}

impl FromStr for CollectiveType {
    type Err = SimError;

    /// Accepts names ignoring case, `-` and `_`, e.g. `all-reduce`,
    /// `ALL_REDUCE`, `allreduce`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match compact.as_str() {
            "allreduce" => Ok(Self::AllReduce),
            "reducescatter" => Ok(Self::ReduceScatter),
            "allgather" => Ok(Self::AllGather),
            "alltoall" => Ok(Self::AllToAll),
            _ => Err(SimError(format!("unknown collective type '{s}'"))),
        }
    }
}

impl fmt::Display for CollectiveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollectiveType::AllReduce => write!(f, "AllReduce"),
            CollectiveType::ReduceScatter => write!(f, "ReduceScatter"),
            CollectiveType::AllGather => write!(f, "AllGather"),
            CollectiveType::AllToAll => write!(f, "AllToAll"),
        }
    }
}

/// The two phases of a ternary AllReduce.
///
/// A collective only ever moves from `ReduceScatter` to `AllGather`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    ReduceScatter,
    AllGather,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::ReduceScatter => write!(f, "ReduceScatter"),
            Phase::AllGather => write!(f, "AllGather"),
        }
    }
}

/// Events delivered to a collective algorithm by the scheduler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlgorithmEvent {
    /// The collective is starting.
    Init,

    /// The resources of a previously released bundle have been reclaimed.
    CreditReturn,

    /// A registered receive has completed.
    ExchangeCompleted(CompletionKey),
}

/// Transmission speed class of a bundle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transmission {
    Fast,
    Usual,
}

/// Where a bundle is forwarded to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BundleRoute {
    /// From the compute unit to the memory accelerator.
    NpuToMa,

    /// From the memory accelerator back to the compute unit.
    MaToNpu,
}

/// Lifecycle of the session (stream) that owns a collective.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Created,
    Ready,
    Executing,
    Zombie,
    Dead,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            StreamState::Created => "Created",
            StreamState::Ready => "Ready",
            StreamState::Executing => "Executing",
            StreamState::Zombie => "Zombie",
            StreamState::Dead => "Dead",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collective_aliases() {
        assert_eq!(
            "allreduce".parse::<CollectiveType>().unwrap(),
            CollectiveType::AllReduce
        );
        assert_eq!(
            "All-Reduce".parse::<CollectiveType>().unwrap(),
            CollectiveType::AllReduce
        );
        assert_eq!(
            "reduce_scatter".parse::<CollectiveType>().unwrap(),
            CollectiveType::ReduceScatter
        );
        assert_eq!(
            "ALL_GATHER".parse::<CollectiveType>().unwrap(),
            CollectiveType::AllGather
        );
        assert_eq!(
            "all_to_all".parse::<CollectiveType>().unwrap(),
            CollectiveType::AllToAll
        );
        assert!("broadcast".parse::<CollectiveType>().is_err());
    }
}
