//! The insert pipeline: validation gate, callback chain, write routing and
//! post-processing.
//!
//! [`insert`] drives a single document of a [`DocumentTree`] to persistence. The write it
//! issues depends on where the document lives:
//!
//! - a top-level document is written whole with [`StoreBackend::insert_one`]
//! - an embedded document whose parent is still new inserts the parent instead, and the
//!   parent's write carries the child along
//! - an embedded document whose parent is persisted is added with a positional
//!   [`StoreBackend::update_one`] against the root's record
//!
//! Validation failures and halting hooks are ordinary outcomes, reported through the
//! document's state; only contract violations and storage failures are returned as errors.

use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};

use crate::{
    atomic,
    backend::{Session, StoreBackend},
    callbacks::Chain,
    document::{DocumentTree, NodeId},
    error::{DocumentStoreError, DocumentStoreResult},
    validation::{self, ValidationContext},
};

/// Per-call options for [`insert`].
#[derive(Debug, Clone)]
pub struct InsertOptions {
    validate: bool,
    context: Option<ValidationContext>,
    session: Option<Session>,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the validation gate.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Validates in `context` instead of [`ValidationContext::Create`].
    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Routes every write of the call, recursive ones included, through `session`.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn validates(&self) -> bool {
        self.validate
    }

    pub fn context(&self) -> Option<&ValidationContext> {
        self.context.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            validate: true,
            context: None,
            session: None,
        }
    }
}

/// State shared by one top-level insert and every insert it triggers recursively.
#[derive(Debug)]
pub(crate) struct InsertScope {
    session: Option<Session>,
    creating: bool,
    /// Documents whose insert is currently executing, outermost first.
    in_flight: Vec<NodeId>,
}

impl InsertScope {
    fn new(session: Option<Session>, creating: bool) -> Self {
        Self {
            session,
            creating,
            in_flight: Vec::new(),
        }
    }
}

/// Inserts `node` as a new record.
///
/// On success the document and everything embedded in it are flagged persisted. If
/// validation fails the document's errors are populated and nothing is written; if a
/// `before` hook halts, the halting stage is recorded on the document. Both cases return
/// `Ok(())` with the document still a new record.
///
/// # Errors
///
/// - [`DocumentStoreError::MissingParent`] if `node` is of an embedded model but has no
///   parent
/// - any error reported by the backend's write
pub async fn insert<B: StoreBackend>(
    backend: &B,
    tree: &mut DocumentTree,
    node: NodeId,
    options: InsertOptions,
) -> DocumentStoreResult<()> {
    let mut scope = InsertScope::new(options.session, false);
    insert_node(backend, tree, node, options, &mut scope).await
}

/// Like [`insert`], with hooks told a batch create is in progress.
pub(crate) async fn insert_creating<B: StoreBackend>(
    backend: &B,
    tree: &mut DocumentTree,
    node: NodeId,
    options: InsertOptions,
) -> DocumentStoreResult<()> {
    let mut scope = InsertScope::new(options.session, true);
    insert_node(backend, tree, node, options, &mut scope).await
}

/// Persists `node`, inserting it if it is a new record.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Unsupported`] for documents that are already persisted,
/// plus every error [`insert`] can return.
pub async fn save<B: StoreBackend>(
    backend: &B,
    tree: &mut DocumentTree,
    node: NodeId,
    options: InsertOptions,
) -> DocumentStoreResult<()> {
    if tree.node(node).is_new_record() {
        insert(backend, tree, node, options).await
    } else {
        Err(DocumentStoreError::Unsupported(format!(
            "updating a persisted {} is not supported",
            tree.node(node).model().name()
        )))
    }
}

fn insert_node<'a, B: StoreBackend>(
    backend: &'a B,
    tree: &'a mut DocumentTree,
    node: NodeId,
    options: InsertOptions,
    scope: &'a mut InsertScope,
) -> BoxFuture<'a, DocumentStoreResult<()>> {
    async move {
        let document = tree.node(node);

        if document.is_embedded() && tree.parent(node).is_none() {
            return Err(DocumentStoreError::MissingParent(
                document.model().name().to_string(),
            ));
        }

        tree.node_mut(node).begin_attempt();

        if options.validate {
            let context = options.context.unwrap_or_default();
            let verdict = validation::validate(tree, node, &context);

            if !verdict.passed {
                debug!(
                    "Not inserting {} {}: {}",
                    tree.node(node).model().name(),
                    tree.node(node).id(),
                    verdict.errors
                );
                tree.node_mut(node).reject(verdict.errors);
                return Ok(());
            }
        }

        let chain = Chain::resolve(tree, node, &scope.in_flight);

        scope.in_flight.push(node);
        let outcome = run_chain(backend, tree, node, &chain, scope).await;
        scope.in_flight.pop();

        outcome
    }
    .boxed()
}

async fn run_chain<B: StoreBackend>(
    backend: &B,
    tree: &mut DocumentTree,
    node: NodeId,
    chain: &Chain,
    scope: &mut InsertScope,
) -> DocumentStoreResult<()> {
    let session = scope.session;
    let creating = scope.creating;

    if let Err(stage) = chain.run_before(tree, creating, session.as_ref()) {
        warn!(
            "Insert of {} {} halted by a {} callback",
            tree.node(node).model().name(),
            tree.node(node).id(),
            stage
        );
        tree.node_mut(node).halt(stage);
        return Ok(());
    }

    if !route(backend, tree, node, scope).await? {
        return Ok(());
    }

    tree.flag_persisted(node);
    chain.run_after(tree, creating, session.as_ref());

    Ok(())
}

/// Issues the write for `node`. Returns whether the document ended up written.
///
/// A positional update that matches no record stored nothing, so it counts as not written.
async fn route<B: StoreBackend>(
    backend: &B,
    tree: &mut DocumentTree,
    node: NodeId,
    scope: &mut InsertScope,
) -> DocumentStoreResult<bool> {
    let session = scope.session;

    let Some(parent) = tree.parent(node) else {
        let collection = tree.node(node).model().collection_name().to_string();
        debug!("Inserting {} into {}", tree.node(node).id(), collection);

        backend
            .insert_one(&collection, tree.as_attributes(node), session.as_ref())
            .await?;

        return Ok(true);
    };

    if tree.node(parent).is_new_record() {
        debug!(
            "Parent {} of {} is new, inserting it instead",
            tree.node(parent).id(),
            tree.node(node).id()
        );

        insert_node(backend, tree, parent, InsertOptions::default(), scope).await?;

        return Ok(tree.node(parent).is_persisted());
    }

    let operation = atomic::compose(tree, node)?;
    let selector = atomic::atomic_selector(tree, parent);
    let update = atomic::positionally(&selector, operation.to_update());
    let collection = tree
        .node(tree.root_of(node))
        .model()
        .collection_name()
        .to_string();

    debug!(
        "Applying {} at {} in {} with selector {}",
        operation.operator, operation.position, collection, selector
    );

    let matched = backend
        .update_one(&collection, selector, update, session.as_ref())
        .await?;

    if matched == 0 {
        warn!(
            "No {} record matched while embedding {} at {}, leaving it a new record",
            collection,
            tree.node(node).id(),
            operation.position
        );
    }

    Ok(matched > 0)
}
