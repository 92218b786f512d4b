use thiserror::Error;

use crate::dom::NodeId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("invalid selector \"{selector}\": {reason}")]
    Invalid { selector: String, reason: String },

    #[error("invalid selector override for store '{store_id}': {source}")]
    StoreOverride {
        store_id: String,
        #[source]
        source: Box<SelectorError>,
    },
}

/// A page operation that could not be carried out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("node {0:?} is no longer in the document")]
    Detached(NodeId),

    #[error("node {node:?} <{tag}> does not accept text input")]
    NotEditable { node: NodeId, tag: String },

    #[error("page bridge error: {0}")]
    Bridge(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    #[error("a coupon batch is already running on this page")]
    AlreadyInProgress,
}
