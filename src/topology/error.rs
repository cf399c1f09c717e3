use crate::provider::ProviderError;
use crate::topology::types::{EdgeId, NodeId};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("{collection} has no declared coordinate reference")]
    Missing { collection: &'static str },
    #[error("{collection} declares unrecognised coordinate reference '{crs}'")]
    Unrecognized {
        collection: &'static str,
        crs: String,
    },
    #[error("{collection} produced a non-finite coordinate after reprojection from {crs}")]
    NonFinite {
        collection: &'static str,
        crs: String,
    },
}

/// Fatal build failures. No output file is left behind when one of these is returned.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("no custom edges and no reference edges are available for the region")]
    EmptyInput,
    #[error("reference network provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to write interchange document '{path}': {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why the Endpoint Assigner gave up on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnresolvedStart,
    UnresolvedEnd,
    UnresolvedBoth,
    /// Both endpoints matched the same node.
    SelfLoop,
    /// Fewer than two vertices; nothing to match.
    EmptyGeometry,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::UnresolvedStart => "no node within radius of start vertex",
            DropReason::UnresolvedEnd => "no node within radius of end vertex",
            DropReason::UnresolvedBoth => "no node within radius of either vertex",
            DropReason::SelfLoop => "start and end resolve to the same node",
            DropReason::EmptyGeometry => "geometry has fewer than two vertices",
        };
        f.write_str(text)
    }
}

/// Non-fatal conditions, accumulated and returned with a successful build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildWarning {
    /// `edge` is the row index in the post-split working table.
    UnresolvedEndpoint { edge: usize, reason: DropReason },
    ReferentialIntegrity { edge: EdgeId, missing: NodeId },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::UnresolvedEndpoint { edge, reason } => {
                write!(f, "dropped working edge {}: {}", edge, reason)
            }
            BuildWarning::ReferentialIntegrity { edge, missing } => {
                write!(f, "edge {} references missing node {}", edge, missing)
            }
        }
    }
}
