//! Operation registry and dispatcher
//!
//! Interfaces are assembled with [`InterfaceBuilder`], collected into an
//! immutable [`Registry`] and shared behind an `Arc`. A dispatcher may name
//! a base dispatcher together with a threshold: every opnum below the
//! threshold is resolved by the base, so derived interfaces inherit the
//! methods of the interface they extend.
//!
//! Each call walks `AwaitingRequest -> Decoding -> Invoking -> Encoding ->
//! Complete`; any of the three middle states may end in `Failed`. Decoding
//! and encoding happen in synchronous helpers, so no codec state lives
//! across the handler's await point.

use crate::dcerpc::{SyntaxId, Uuid};
use crate::error::{Result, RpcError};
use crate::operation::{self, HandlerError, Operation, ResultCode};
use async_trait::async_trait;
use bytes::Bytes;
use midl_ndr::{NdrContext, TransferSyntax};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Per-call progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    AwaitingRequest,
    Decoding,
    Invoking,
    Encoding,
    Complete,
    Failed,
}

impl CallState {
    pub fn can_transition(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (AwaitingRequest, Decoding)
                | (Decoding, Invoking)
                | (Invoking, Encoding)
                | (Encoding, Complete)
                | (Decoding, Failed)
                | (Invoking, Failed)
                | (Encoding, Failed)
        )
    }
}

/// Tracks the state of one call and logs its transitions
#[derive(Debug)]
pub struct CallTracker {
    name: String,
    state: CallState,
}

impl CallTracker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: CallState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Move to `next`. An invalid transition is logged and refused; the
    /// state is left unchanged and `false` returned.
    pub fn advance(&mut self, next: CallState) -> bool {
        if !self.state.can_transition(next) {
            warn!(
                operation = %self.name,
                from = ?self.state,
                to = ?next,
                "invalid call state transition"
            );
            return false;
        }
        trace!(operation = %self.name, from = ?self.state, to = ?next, "call state");
        self.state = next;
        true
    }

    /// Move to `Failed`, passing the error through
    pub fn fail(&mut self, err: RpcError) -> RpcError {
        debug!(operation = %self.name, state = ?self.state, error = %err, "call failed");
        self.advance(CallState::Failed);
        err
    }
}

/// Everything the server knows about an incoming call
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub syntax: SyntaxId,
    pub opnum: u16,
    /// Object UUID from the request PDU, if any
    pub object: Option<Uuid>,
    pub transfer_syntax: TransferSyntax,
    pub call_id: u32,
}

impl CallContext {
    pub fn new(syntax: SyntaxId, opnum: u16) -> Self {
        Self {
            syntax,
            opnum,
            object: None,
            transfer_syntax: TransferSyntax::Ndr20,
            call_id: 0,
        }
    }

    pub fn with_object(mut self, object: Uuid) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_transfer_syntax(mut self, transfer_syntax: TransferSyntax) -> Self {
        self.transfer_syntax = transfer_syntax;
        self
    }

    pub fn ndr_context(&self) -> NdrContext {
        NdrContext::with_syntax(self.transfer_syntax)
    }
}

/// Something the server can route requests to
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Whether an interface with this identity can be bound
    fn supports(&self, syntax: &SyntaxId) -> bool;

    async fn dispatch(&self, call: CallContext, stub: Bytes) -> Result<Bytes>;
}

type InvokeFuture = Pin<Box<dyn Future<Output = Result<Bytes>> + Send>>;
type Invoke = Arc<dyn Fn(CallTracker, NdrContext, Bytes) -> InvokeFuture + Send + Sync>;

#[derive(Clone)]
enum OperationKind {
    Handler { invoke: Invoke, has_prepare: bool },
    NotUsedOnWire,
}

/// A registered operation
#[derive(Clone)]
pub struct OperationDescriptor {
    pub opnum: u16,
    /// Full name, `/Interface/vMajor/Method`
    pub name: String,
    kind: OperationKind,
}

impl OperationDescriptor {
    pub fn is_used_on_wire(&self) -> bool {
        matches!(self.kind, OperationKind::Handler { .. })
    }

    pub fn has_prepare(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Handler {
                has_prepare: true,
                ..
            }
        )
    }

    /// Decode `stub`, run the handler and encode its response
    pub async fn invoke(&self, ctx: NdrContext, stub: Bytes) -> Result<Bytes> {
        match &self.kind {
            OperationKind::Handler { invoke, .. } => {
                invoke(CallTracker::new(self.name.clone()), ctx, stub).await
            }
            OperationKind::NotUsedOnWire => Err(RpcError::NotUsedOnWire {
                name: self.name.clone(),
                opnum: self.opnum,
            }),
        }
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("opnum", &self.opnum)
            .field("name", &self.name)
            .field("used_on_wire", &self.is_used_on_wire())
            .finish()
    }
}

fn typed_invoke<Op, F, Fut>(handler: F, prepare: Option<fn(&mut Op::Response)>) -> Invoke
where
    Op: Operation,
    F: Fn(Op::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Op::Response, HandlerError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |mut call: CallTracker, ctx: NdrContext, stub: Bytes| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            call.advance(CallState::Decoding);
            let request = operation::request_from_bytes::<Op>(stub, ctx)
                .map_err(|e| call.fail(e))?;

            call.advance(CallState::Invoking);
            let mut response = match handler(request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(operation = Op::NAME, code = err.code, "handler error: {}", err.message);
                    let mut response = Op::Response::default();
                    response.set_result_code(err.code);
                    response
                }
            };
            if let Some(prepare) = prepare {
                prepare(&mut response);
            }

            call.advance(CallState::Encoding);
            let stub = operation::response_to_bytes::<Op>(&response, ctx)
                .map_err(|e| call.fail(e))?;
            call.advance(CallState::Complete);
            Ok::<_, RpcError>(stub)
        }) as InvokeFuture
    })
}

/// Operations of one interface version
pub struct InterfaceDispatcher {
    name: String,
    syntax: SyntaxId,
    base: Option<(Arc<InterfaceDispatcher>, u16)>,
    operations: HashMap<u16, OperationDescriptor>,
}

impl InterfaceDispatcher {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syntax(&self) -> SyntaxId {
        self.syntax
    }

    /// Find the descriptor for `opnum`, delegating below the base threshold
    pub fn resolve(&self, opnum: u16) -> Result<&OperationDescriptor> {
        if let Some((base, threshold)) = &self.base {
            if opnum < *threshold {
                return base.resolve(opnum);
            }
        }
        self.operations
            .get(&opnum)
            .ok_or(RpcError::UnknownOperation {
                syntax: self.syntax,
                opnum,
            })
    }

    /// Own operations, sorted by opnum
    pub fn operations(&self) -> Vec<&OperationDescriptor> {
        let mut ops: Vec<_> = self.operations.values().collect();
        ops.sort_by_key(|op| op.opnum);
        ops
    }

    pub async fn invoke(&self, opnum: u16, ctx: NdrContext, stub: Bytes) -> Result<Bytes> {
        let descriptor = self.resolve(opnum)?;
        debug!(operation = %descriptor.name, opnum, stub_len = stub.len(), "dispatching");
        descriptor.invoke(ctx, stub).await
    }
}

impl fmt::Debug for InterfaceDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceDispatcher")
            .field("name", &self.name)
            .field("syntax", &self.syntax)
            .field("base", &self.base.as_ref().map(|(b, t)| (b.name(), *t)))
            .field("operations", &self.operations.len())
            .finish()
    }
}

/// Builder for an [`InterfaceDispatcher`]
pub struct InterfaceBuilder {
    name: String,
    syntax: SyntaxId,
    base: Option<(Arc<InterfaceDispatcher>, u16)>,
    operations: HashMap<u16, OperationDescriptor>,
}

impl InterfaceBuilder {
    pub fn new(name: impl Into<String>, syntax: SyntaxId) -> Self {
        Self {
            name: name.into(),
            syntax,
            base: None,
            operations: HashMap::new(),
        }
    }

    /// Delegate every opnum below `threshold` to `base`
    pub fn base(mut self, base: Arc<InterfaceDispatcher>, threshold: u16) -> Self {
        self.base = Some((base, threshold));
        self
    }

    fn full_name(&self, method: &str) -> String {
        format!("/{}/v{}/{}", self.name, self.syntax.major_version(), method)
    }

    fn insert(&mut self, descriptor: OperationDescriptor) {
        if let Some((_, threshold)) = &self.base {
            if descriptor.opnum < *threshold {
                warn!(
                    operation = %descriptor.name,
                    threshold,
                    "opnum is shadowed by the base range"
                );
            }
        }
        if let Some(previous) = self.operations.insert(descriptor.opnum, descriptor) {
            warn!(operation = %previous.name, "operation replaced");
        }
    }

    pub fn operation<Op, F, Fut>(mut self, handler: F) -> Self
    where
        Op: Operation,
        F: Fn(Op::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Op::Response, HandlerError>> + Send + 'static,
    {
        let descriptor = OperationDescriptor {
            opnum: Op::OPNUM,
            name: self.full_name(Op::NAME),
            kind: OperationKind::Handler {
                invoke: typed_invoke::<Op, F, Fut>(handler, None),
                has_prepare: false,
            },
        };
        self.insert(descriptor);
        self
    }

    /// Register an operation whose response passes through `prepare`
    /// before it is encoded
    pub fn operation_with_prepare<Op, F, Fut>(
        mut self,
        handler: F,
        prepare: fn(&mut Op::Response),
    ) -> Self
    where
        Op: Operation,
        F: Fn(Op::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Op::Response, HandlerError>> + Send + 'static,
    {
        let descriptor = OperationDescriptor {
            opnum: Op::OPNUM,
            name: self.full_name(Op::NAME),
            kind: OperationKind::Handler {
                invoke: typed_invoke::<Op, F, Fut>(handler, Some(prepare)),
                has_prepare: true,
            },
        };
        self.insert(descriptor);
        self
    }

    /// Reserve an opnum that exists in the interface but never travels
    pub fn not_used_on_wire(mut self, opnum: u16, method: &str) -> Self {
        let descriptor = OperationDescriptor {
            opnum,
            name: self.full_name(method),
            kind: OperationKind::NotUsedOnWire,
        };
        self.insert(descriptor);
        self
    }

    pub fn build(self) -> InterfaceDispatcher {
        InterfaceDispatcher {
            name: self.name,
            syntax: self.syntax,
            base: self.base,
            operations: self.operations,
        }
    }
}

type InterfaceKey = (Uuid, u16);

fn key_of(syntax: &SyntaxId) -> InterfaceKey {
    (syntax.uuid, syntax.major_version())
}

/// Collects interfaces before the registry is frozen
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    interfaces: HashMap<InterfaceKey, Arc<InterfaceDispatcher>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, dispatcher: InterfaceDispatcher) -> Result<Self> {
        self.register_shared(Arc::new(dispatcher))
    }

    pub fn register_shared(mut self, dispatcher: Arc<InterfaceDispatcher>) -> Result<Self> {
        let syntax = dispatcher.syntax();
        if self.interfaces.contains_key(&key_of(&syntax)) {
            return Err(RpcError::DuplicateInterface(syntax.to_string()));
        }
        info!(
            "Registering interface: {} ({}) version {}.{}",
            dispatcher.name(),
            syntax.uuid,
            syntax.major_version(),
            syntax.minor_version()
        );
        self.interfaces.insert(key_of(&syntax), dispatcher);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            interfaces: self.interfaces,
        }
    }
}

/// Immutable set of interfaces keyed by UUID and major version
#[derive(Debug)]
pub struct Registry {
    interfaces: HashMap<InterfaceKey, Arc<InterfaceDispatcher>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up an interface; the minor version is not significant
    pub fn lookup(&self, syntax: &SyntaxId) -> Result<&Arc<InterfaceDispatcher>> {
        self.interfaces
            .get(&key_of(syntax))
            .ok_or_else(|| RpcError::InterfaceNotFound(syntax.to_string()))
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Route an NDR 2.0 stub to `opnum` of the interface `syntax`
    pub async fn dispatch(&self, syntax: &SyntaxId, opnum: u16, stub: Bytes) -> Result<Bytes> {
        self.lookup(syntax)?
            .invoke(opnum, NdrContext::default(), stub)
            .await
    }
}

#[async_trait]
impl Dispatch for Registry {
    fn supports(&self, syntax: &SyntaxId) -> bool {
        self.interfaces.contains_key(&key_of(syntax))
    }

    async fn dispatch(&self, call: CallContext, stub: Bytes) -> Result<Bytes> {
        self.lookup(&call.syntax)?
            .invoke(call.opnum, call.ndr_context(), stub)
            .await
    }
}
