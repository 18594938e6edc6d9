use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use netplay_codec::{from_envelope, NetworkRecord};
use netplay_frame::{DeflateFilter, Envelope, Options, PayloadFilter};
use tracing::{debug, error, warn};

use crate::error::{PeerError, Result};
use crate::id::ConnectionId;

/// A received envelope tagged with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct Incoming {
    envelope: Envelope,
    sender: ConnectionId,
}

impl Incoming {
    pub fn new(envelope: Envelope, sender: ConnectionId) -> Self {
        Self { envelope, sender }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sender(&self) -> &ConnectionId {
        &self.sender
    }

    pub fn type_id(&self) -> u16 {
        self.envelope.type_id()
    }

    pub fn options(&self) -> Options {
        self.envelope.options()
    }

    pub fn payload(&self) -> &Bytes {
        self.envelope.payload()
    }
}

/// What happened to one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler for the type id; dropped.
    Unhandled,
    /// Handler (or record decoding) returned an error.
    Failed,
    /// Handler panicked; the panic was contained.
    Panicked,
}

type Handler<C> = Box<dyn Fn(&C, &Incoming, &dyn PayloadFilter) -> Result<()> + Send + Sync>;

/// Message type id → handler table.
///
/// `C` is the context handed to every handler: a
/// [`ServerHandle`](crate::ServerHandle) or [`ClientHandle`](crate::ClientHandle).
/// Built once at startup; the first registration for a type id wins.
pub struct Registry<C> {
    handlers: HashMap<u16, Handler<C>>,
    filter: Arc<dyn PayloadFilter>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("type_ids", &self.type_ids())
            .finish_non_exhaustive()
    }
}

impl<C> Registry<C> {
    /// Empty registry decompressing with [`DeflateFilter`].
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            filter: Arc::new(DeflateFilter::default()),
        }
    }

    /// Replace the filter used for compressed payloads.
    pub fn with_filter(mut self, filter: Arc<dyn PayloadFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &dyn PayloadFilter {
        self.filter.as_ref()
    }

    /// Register a raw handler for `type_id`.
    pub fn register<F>(&mut self, type_id: u16, handler: F) -> Result<()>
    where
        F: Fn(&C, &Incoming) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(
            type_id,
            Box::new(move |ctx: &C, incoming: &Incoming, _: &dyn PayloadFilter| {
                handler(ctx, incoming)
            }),
        )
    }

    /// Register a handler that receives the payload decoded as `T`.
    ///
    /// Compressed payloads are run through the registry's filter first.
    pub fn register_record<T, F>(&mut self, type_id: u16, handler: F) -> Result<()>
    where
        T: NetworkRecord + 'static,
        F: Fn(&C, &ConnectionId, T) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(
            type_id,
            Box::new(
                move |ctx: &C, incoming: &Incoming, filter: &dyn PayloadFilter| {
                    let record = from_envelope::<T>(incoming.envelope(), filter)?;
                    handler(ctx, incoming.sender(), record)
                },
            ),
        )
    }

    fn insert(&mut self, type_id: u16, handler: Handler<C>) -> Result<()> {
        if self.handlers.contains_key(&type_id) {
            warn!(type_id, "duplicate handler registration rejected");
            return Err(PeerError::DuplicateRegistration(type_id));
        }
        self.handlers.insert(type_id, handler);
        Ok(())
    }

    /// Decode the payload of `incoming` as `T` with the registry's filter.
    pub fn create<T: NetworkRecord>(&self, incoming: &Incoming) -> Result<T> {
        Ok(from_envelope::<T>(incoming.envelope(), self.filter())?)
    }

    /// Run the handler for `incoming`. Never panics or fails outward.
    pub fn dispatch(&self, ctx: &C, incoming: &Incoming) -> DispatchOutcome {
        let type_id = incoming.type_id();
        let Some(handler) = self.handlers.get(&type_id) else {
            warn!(
                type_id,
                sender = %incoming.sender(),
                "no handler for message type, dropping"
            );
            return DispatchOutcome::Unhandled;
        };

        debug!(
            type_id,
            sender = %incoming.sender(),
            size = incoming.payload().len(),
            "dispatching message"
        );
        let filter = self.filter();
        match catch_unwind(AssertUnwindSafe(|| handler(ctx, incoming, filter))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(err)) => {
                error!(type_id, sender = %incoming.sender(), error = %err, "handler failed");
                DispatchOutcome::Failed
            }
            Err(_) => {
                error!(type_id, sender = %incoming.sender(), "handler panicked");
                DispatchOutcome::Panicked
            }
        }
    }

    pub fn contains(&self, type_id: u16) -> bool {
        self.handlers.contains_key(&type_id)
    }

    /// Registered type ids, ascending.
    pub fn type_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
