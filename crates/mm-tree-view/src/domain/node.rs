//! Rendered tree nodes.
//!
//! Strictly binary: a filled node always renders two child slots, each
//! either another filled node or an annotated empty placeholder.

use serde::{Deserialize, Serialize};
use shared_types::{ChainAddress, SlotPos};

/// One rendered node of a bounded-depth subtree view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// A materialized place.
    Filled {
        address: ChainAddress,
        parent_address: Option<ChainAddress>,
        pos: SlotPos,
        place_number: u32,
        clone: bool,
        created_at: i64,
        login: String,
        /// Places in this node's subtree, the node itself excluded.
        descendants: u64,
        locked: bool,
        can_lock: bool,
        is_lock: bool,
        is_root: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        children: Option<Box<[TreeNode; 2]>>,
    },
    /// An open slot, annotated for presentation.
    Empty {
        pos: SlotPos,
        parent_address: Option<ChainAddress>,
        locked: bool,
        can_lock: bool,
        is_lock: bool,
        is_next_position: bool,
        can_buy: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        children: Option<Box<[TreeNode; 2]>>,
    },
}

impl TreeNode {
    pub fn is_filled(&self) -> bool {
        matches!(self, TreeNode::Filled { .. })
    }

    /// Child slots of this node, when rendered.
    pub fn children(&self) -> Option<&[TreeNode; 2]> {
        match self {
            TreeNode::Filled { children, .. } | TreeNode::Empty { children, .. } => {
                children.as_deref()
            }
        }
    }
}
