//! Name-keyed dispatch table.
//!
//! # Responsibilities
//! - List the callable method names
//! - Produce a fresh, zero-valued input record for a method
//! - Invoke a method and hand back its record stream
//!
//! # Design Decisions
//! - The table is built once at startup and shared read-only
//! - Typed registration adapts `Fn(CallContext, I) -> Future` invokers, so
//!   generated or hand-written services never touch `dyn Record` directly

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::rpc::context::CallContext;
use crate::rpc::receiver::Receiver;
use crate::rpc::record::Record;
use crate::rpc::status::Status;

/// Per-call options passed to the invoker.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Metadata sent along with the call (credentials and the like).
    pub metadata: BTreeMap<String, String>,
}

/// Result of starting a call.
pub type CallResult = Result<Box<dyn Receiver>, Status>;

/// The consumed dispatch contract.
#[async_trait]
pub trait DispatchTable: Send + Sync {
    /// Method names, in a stable order.
    fn list(&self) -> Vec<&str>;

    /// A new zero-valued input record, or `None` for an unknown method.
    fn input(&self, name: &str) -> Option<Box<dyn Record>>;

    async fn call(
        &self,
        name: &str,
        ctx: CallContext,
        input: Box<dyn Record>,
        opts: CallOptions,
    ) -> CallResult;
}

type InputFactory = Box<dyn Fn() -> Box<dyn Record> + Send + Sync>;
type Invoker =
    Arc<dyn Fn(CallContext, Box<dyn Record>, CallOptions) -> BoxFuture<'static, CallResult> + Send + Sync>;

struct MethodEntry {
    input: InputFactory,
    invoke: Invoker,
}

/// Static dispatch table built from `(name, input factory, invoker)` entries.
#[derive(Default)]
pub struct MethodTable {
    methods: BTreeMap<String, MethodEntry>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method whose input type is `I`.
    pub fn method<I, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        I: Record + Default,
        F: Fn(CallContext, I, CallOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let f = Arc::new(f);
        let invoke: Invoker = Arc::new(
            move |ctx: CallContext, input: Box<dyn Record>, opts: CallOptions| -> BoxFuture<'static, CallResult> {
                let f = f.clone();
                let method = method.clone();
                Box::pin(async move {
                    let input = match input.downcast::<I>() {
                        Ok(input) => input,
                        Err(_) => {
                            return Err(Status::internal(format!(
                                "input of wrong type for {}",
                                method
                            )))
                        }
                    };
                    f(ctx, *input, opts).await
                })
            },
        );
        self.methods.insert(
            name,
            MethodEntry {
                input: Box::new(|| Box::new(I::default()) as Box<dyn Record>),
                invoke,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[async_trait]
impl DispatchTable for MethodTable {
    fn list(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    fn input(&self, name: &str) -> Option<Box<dyn Record>> {
        self.methods.get(name).map(|m| (m.input)())
    }

    async fn call(
        &self,
        name: &str,
        ctx: CallContext,
        input: Box<dyn Record>,
        opts: CallOptions,
    ) -> CallResult {
        let invoke = match self.methods.get(name) {
            Some(m) => m.invoke.clone(),
            None => return Err(Status::not_found(format!("no method {:?}", name))),
        };
        invoke(ctx, input, opts).await
    }
}
