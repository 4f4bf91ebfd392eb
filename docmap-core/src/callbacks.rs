//! Lifecycle hooks and the ordered stage chain wrapped around every insert.
//!
//! An insert runs five stages, outermost first:
//!
//! 1. [`Stage::Save`] - the document's own `save` hooks
//! 2. [`Stage::Create`] - the document's own `create` hooks
//! 3. [`Stage::PersistParent`] - the document's own `persist_parent` hooks
//! 4. [`Stage::ChildSave`] - `save` hooks of cascading embedded descendants
//! 5. [`Stage::ChildCreate`] - `create` hooks of cascading embedded descendants
//!
//! `before` hooks run from the outermost stage inwards, the write happens in the middle,
//! and `after` hooks run from the innermost stage outwards. A `before` hook returning
//! [`HookFlow::Halt`] stops the chain right there: no further hooks, no write, and no
//! `after` hook of any enclosing stage.
//!
//! Child stages skip documents that are "in flight", meaning their own insert is currently
//! executing further up the call stack. That happens when an embedded document inserts
//! its new parent: the parent's child stages must not fire the originating document's
//! hooks a second time.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::Arc,
};

use crate::{
    backend::Session,
    document::{DocumentNode, DocumentTree, NodeId},
};

/// The hook categories a model can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Runs on every persistence operation.
    Save,
    /// Runs only when a new record is inserted.
    Create,
    /// Runs when persistence cascades towards ancestors.
    PersistParent,
}

impl Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackKind::Save => write!(f, "save"),
            CallbackKind::Create => write!(f, "create"),
            CallbackKind::PersistParent => write!(f, "persist_parent"),
        }
    }
}

/// One named phase of the insert chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Save,
    Create,
    PersistParent,
    ChildSave,
    ChildCreate,
}

impl Stage {
    /// The fixed order in which an insert enters the stages.
    pub const INSERT_ORDER: [Stage; 5] = [
        Stage::Save,
        Stage::Create,
        Stage::PersistParent,
        Stage::ChildSave,
        Stage::ChildCreate,
    ];

    /// The hook category this stage fires.
    pub fn kind(&self) -> CallbackKind {
        match self {
            Stage::Save | Stage::ChildSave => CallbackKind::Save,
            Stage::Create | Stage::ChildCreate => CallbackKind::Create,
            Stage::PersistParent => CallbackKind::PersistParent,
        }
    }

    /// Whether the stage runs on descendants rather than on the document itself.
    pub fn is_cascade(&self) -> bool {
        matches!(self, Stage::ChildSave | Stage::ChildCreate)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cascade() {
            write!(f, "child {}", self.kind())
        } else {
            write!(f, "{}", self.kind())
        }
    }
}

/// What a `before` hook wants the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    Halt,
}

/// Information handed to every hook invocation.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// The hook category being run.
    pub kind: CallbackKind,
    /// `true` when the hook fires because an ancestor is being persisted.
    pub cascaded: bool,
    /// `true` while a batch create is in progress.
    pub creating: bool,
    /// The session every write of this insert goes through, if any.
    pub session: Option<&'a Session>,
}

pub type BeforeHook = Arc<dyn Fn(&mut DocumentNode, &HookContext<'_>) -> HookFlow + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&mut DocumentNode, &HookContext<'_>) + Send + Sync>;

/// The hooks a model registered, grouped by kind in registration order.
#[derive(Clone, Default)]
pub struct Callbacks {
    before: HashMap<CallbackKind, Vec<BeforeHook>>,
    after: HashMap<CallbackKind, Vec<AfterHook>>,
}

impl Callbacks {
    pub fn add_before(&mut self, kind: CallbackKind, hook: BeforeHook) {
        self.before.entry(kind).or_default().push(hook);
    }

    pub fn add_after(&mut self, kind: CallbackKind, hook: AfterHook) {
        self.after.entry(kind).or_default().push(hook);
    }

    pub fn before(&self, kind: CallbackKind) -> &[BeforeHook] {
        self.before
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn after(&self, kind: CallbackKind) -> &[AfterHook] {
        self.after
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A stage resolved against a concrete tree: which documents it fires hooks on.
#[derive(Debug, Clone)]
pub(crate) struct StagePlan {
    stage: Stage,
    targets: Vec<NodeId>,
}

/// The resolved stage chain for one insert.
#[derive(Debug, Clone)]
pub(crate) struct Chain {
    plans: Vec<StagePlan>,
}

impl Chain {
    /// Resolves every stage for inserting `node`.
    ///
    /// Targets are computed once, before any hook runs, so the `after` half of the chain
    /// visits exactly the documents the `before` half did even though the write flips
    /// their persisted state in between.
    pub(crate) fn resolve(tree: &DocumentTree, node: NodeId, in_flight: &[NodeId]) -> Self {
        let plans = Stage::INSERT_ORDER
            .iter()
            .map(|stage| StagePlan {
                stage: *stage,
                targets: if stage.is_cascade() {
                    cascading_descendants(tree, node, in_flight)
                } else {
                    vec![node]
                },
            })
            .collect();

        Self { plans }
    }

    /// Runs the `before` hooks of every stage, outermost first.
    ///
    /// Returns the halting stage if a hook asked to stop.
    pub(crate) fn run_before(
        &self,
        tree: &mut DocumentTree,
        creating: bool,
        session: Option<&Session>,
    ) -> Result<(), Stage> {
        for plan in &self.plans {
            for target in &plan.targets {
                let model = Arc::clone(tree.node(*target).model());
                let context = HookContext {
                    kind: plan.stage.kind(),
                    cascaded: plan.stage.is_cascade(),
                    creating,
                    session,
                };

                for hook in model.callbacks().before(plan.stage.kind()) {
                    if hook(tree.node_mut(*target), &context) == HookFlow::Halt {
                        return Err(plan.stage);
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs the `after` hooks of every stage, innermost first.
    pub(crate) fn run_after(&self, tree: &mut DocumentTree, creating: bool, session: Option<&Session>) {
        for plan in self.plans.iter().rev() {
            for target in &plan.targets {
                let model = Arc::clone(tree.node(*target).model());
                let context = HookContext {
                    kind: plan.stage.kind(),
                    cascaded: plan.stage.is_cascade(),
                    creating,
                    session,
                };

                for hook in model.callbacks().after(plan.stage.kind()) {
                    hook(tree.node_mut(*target), &context);
                }
            }
        }
    }
}

/// Collects, depth first, the descendants of `node` whose hooks a cascading stage fires.
///
/// A child is visited when its relation cascades callbacks, it is a new record, and it is
/// not in flight. A skipped child hides its whole subtree.
fn cascading_descendants(tree: &DocumentTree, node: NodeId, in_flight: &[NodeId]) -> Vec<NodeId> {
    let mut targets = Vec::new();

    for child in tree.children(node) {
        let cascades = tree
            .relation_of(*child)
            .is_some_and(|relation| relation.cascades_callbacks());

        if !cascades || in_flight.contains(child) || !tree.node(*child).is_new_record() {
            continue;
        }

        targets.push(*child);
        targets.extend(cascading_descendants(tree, *child, in_flight));
    }

    targets
}
