//! Arena holding the nodes of every buffered trace.
//!
//! Nodes are addressed by [`NodeId`]. A container node owns the ordered list
//! of its children's ids; every node other than a trace root records the id of
//! its parent. The parent link is only used to walk back up on conclude, never
//! to traverse from the root.

use crate::error::{GalileoError, Result};
use crate::schema::{SpanRecord, Step, StepType, TraceRecord};
use crate::traces::params::{
    ConcludeParams, LlmSpanParams, ProtectSpanParams, RetrieverSpanParams, ToolSpanParams,
    WorkflowSpanParams,
};
use tracing::debug;

/// Handle to a node in a [`SpanTree`]
///
/// Ids stay valid until the tree is cleared; ids from before a clear are
/// rejected rather than aliasing new nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    epoch: u64,
}

/// How `conclude` treats the status code when the caller passes none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCodeOnConclude {
    /// Keep the existing status code unless a new one is given
    #[default]
    Preserve,
    /// Always overwrite, clearing the status code when none is given
    Reset,
}

#[derive(Debug, Clone)]
struct Node {
    step: Step,
    parent: Option<NodeId>,
    /// `Some` exactly for container steps
    children: Option<Vec<NodeId>>,
}

#[derive(Debug, Default)]
pub struct SpanTree {
    nodes: Vec<Node>,
    epoch: u64,
}

impl SpanTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node and invalidate all outstanding ids.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.epoch += 1;
    }

    /// Insert a parentless trace step.
    pub fn add_root(&mut self, step: Step) -> Result<NodeId> {
        if step.step_type != StepType::Trace {
            return Err(GalileoError::InvalidState(format!(
                "Only a trace can be a root, got a {} step",
                step.step_type
            )));
        }
        Ok(self.insert(step, None))
    }

    pub fn add_llm(&mut self, parent: NodeId, params: LlmSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step()?)
    }

    pub fn add_retriever(&mut self, parent: NodeId, params: RetrieverSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step()?)
    }

    pub fn add_tool(&mut self, parent: NodeId, params: ToolSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step()?)
    }

    pub fn add_protect(&mut self, parent: NodeId, params: ProtectSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step()?)
    }

    pub fn add_workflow(&mut self, parent: NodeId, params: WorkflowSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step(StepType::Workflow)?)
    }

    pub fn add_agent(&mut self, parent: NodeId, params: WorkflowSpanParams) -> Result<NodeId> {
        self.attach(parent, params.into_step(StepType::Agent)?)
    }

    /// Append `step` as the last child of `parent`.
    pub fn attach(&mut self, parent: NodeId, step: Step) -> Result<NodeId> {
        if step.step_type == StepType::Trace {
            return Err(GalileoError::InvalidState(
                "A trace cannot be nested inside another step".to_string(),
            ));
        }
        let parent_node = self.node(parent)?;
        if parent_node.children.is_none() {
            return Err(GalileoError::InvalidState(format!(
                "A {} step cannot have child steps",
                parent_node.step.step_type
            )));
        }

        let child = self.insert(step, Some(parent));
        if let Some(children) = self.node_mut(parent)?.children.as_mut() {
            children.push(child);
        }
        Ok(child)
    }

    /// Apply the given fields to a container and return its parent.
    ///
    /// Only fields present in `params` are overwritten; the status code
    /// follows `status_policy`.
    pub fn conclude(
        &mut self,
        id: NodeId,
        params: ConcludeParams,
        status_policy: StatusCodeOnConclude,
    ) -> Result<Option<NodeId>> {
        let node = self.node_mut(id)?;
        if node.children.is_none() {
            return Err(GalileoError::InvalidState(format!(
                "Only container steps can be concluded, got a {} step",
                node.step.step_type
            )));
        }

        let step = &mut node.step;
        if let Some(output) = params.output {
            step.output = Some(output);
        }
        if let Some(duration_ns) = params.duration_ns {
            step.duration_ns = Some(duration_ns);
        }
        match status_policy {
            StatusCodeOnConclude::Preserve => {
                if params.status_code.is_some() {
                    step.status_code = params.status_code;
                }
            }
            StatusCodeOnConclude::Reset => step.status_code = params.status_code,
        }
        debug!(step_type = %step.step_type, name = %step.name, "Concluded step");

        Ok(node.parent)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn step(&self, id: NodeId) -> Option<&Step> {
        self.node(id).ok().map(|n| &n.step)
    }

    /// Mutable access to a step's data; the tree structure stays untouchable.
    pub fn step_mut(&mut self, id: NodeId) -> Option<&mut Step> {
        self.node_mut(id).ok().map(|n| &mut n.step)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    /// Children in insertion order; empty for leaves and unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .ok()
            .and_then(|n| n.children.as_deref())
            .unwrap_or(&[])
    }

    /// Export the trace rooted at `root` as an owned record tree.
    pub fn export(&self, root: NodeId) -> Result<TraceRecord> {
        let node = self.node(root)?;
        if node.step.step_type != StepType::Trace || node.parent.is_some() {
            return Err(GalileoError::CorruptedTree(format!(
                "Node {} is not a trace root",
                root.index
            )));
        }
        Ok(TraceRecord {
            step: node.step.clone(),
            spans: self.export_children(root, node.children.as_deref().unwrap_or(&[]))?,
        })
    }

    fn export_children(&self, parent: NodeId, ids: &[NodeId]) -> Result<Vec<SpanRecord>> {
        ids.iter().map(|&id| self.export_span(parent, id)).collect()
    }

    fn export_span(&self, parent: NodeId, id: NodeId) -> Result<SpanRecord> {
        let node = self.node(id).map_err(|_| {
            GalileoError::CorruptedTree(format!("Dangling child id {}", id.index))
        })?;
        if node.parent != Some(parent) {
            return Err(GalileoError::CorruptedTree(format!(
                "Child {} does not point back to its parent {}",
                id.index, parent.index
            )));
        }
        let spans = match node.children.as_deref() {
            Some(children) => Some(self.export_children(id, children)?),
            None => None,
        };
        Ok(SpanRecord {
            step: node.step.clone(),
            spans,
        })
    }

    fn insert(&mut self, step: Step, parent: Option<NodeId>) -> NodeId {
        let id = NodeId {
            index: self.nodes.len(),
            epoch: self.epoch,
        };
        let children = step.is_container().then(Vec::new);
        self.nodes.push(Node {
            step,
            parent,
            children,
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        if id.epoch != self.epoch {
            return Err(stale(id));
        }
        self.nodes.get(id.index).ok_or_else(|| stale(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        if id.epoch != self.epoch {
            return Err(stale(id));
        }
        self.nodes.get_mut(id.index).ok_or_else(|| stale(id))
    }

    #[cfg(test)]
    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Ok(node) = self.node_mut(id) {
            node.parent = parent;
        }
    }
}

fn stale(id: NodeId) -> GalileoError {
    GalileoError::InvalidState(format!(
        "Step {} does not exist or was already flushed",
        id.index
    ))
}
