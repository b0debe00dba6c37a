//! Callbacks and actions
//!
//! A [`Callback`] is a named handler plus a matcher deciding whether it runs
//! for a given context. Controllers keep four ordered callback lists, one per
//! pipeline stage (authorizers, validators, decorators, notifiers).
//!
//! An [`Action`] is a custom endpoint living next to the standard intents.

use async_trait::async_trait;
use axum::http::Method;
use axum::response::Response;
use std::fmt;
use std::sync::Arc;

use crate::core::context::Context;
use crate::core::error::CallbackError;
use crate::core::operation::Operation;

/// Decides whether a callback runs for a context
pub type Matcher = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Callback body
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<(), CallbackError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Context) -> Result<(), CallbackError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        (self.0)(ctx)
    }
}

/// A named, matched callback
///
/// ```rust,ignore
/// let stamp = Callback::from_fn("stamp", |ctx| {
///     ctx.set_attribute("updated_at", json!(Utc::now().to_rfc3339()))?;
///     Ok(())
/// })
/// .only(&[Operation::Create, Operation::Update]);
/// ```
#[derive(Clone)]
pub struct Callback {
    name: String,
    matcher: Matcher,
    handler: Arc<dyn Handler>,
}

impl Callback {
    /// Callback running for every operation
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(|_| true),
            handler: Arc::new(handler),
        }
    }

    /// Callback from a synchronous closure
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        Self::new(name, FnHandler(f))
    }

    /// Replace the matcher
    pub fn matching<M>(mut self, matcher: M) -> Self
    where
        M: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Run only for the listed operations
    pub fn only(self, operations: &[Operation]) -> Self {
        let operations = operations.to_vec();
        self.matching(move |ctx| operations.contains(&ctx.operation))
    }

    /// Run for every operation except the listed ones
    pub fn except(self, operations: &[Operation]) -> Self {
        let operations = operations.to_vec();
        self.matching(move |ctx| !operations.contains(&ctx.operation))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, ctx: &Context) -> bool {
        (self.matcher)(ctx)
    }

    pub async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        self.handler.handle(ctx).await
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("name", &self.name).finish()
    }
}

/// Action body, produces the raw response
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Result<Response, CallbackError>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&mut Context) -> Result<Response, CallbackError> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context) -> Result<Response, CallbackError> {
        (self.0)(ctx)
    }
}

/// Default body limit of actions (4 MiB)
pub const DEFAULT_ACTION_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// A method restricted custom endpoint
#[derive(Clone)]
pub struct Action {
    methods: Vec<Method>,
    body_limit: usize,
    handler: Arc<dyn ActionHandler>,
}

impl Action {
    pub fn new(methods: &[Method], handler: impl ActionHandler + 'static) -> Self {
        Self {
            methods: methods.to_vec(),
            body_limit: DEFAULT_ACTION_BODY_LIMIT,
            handler: Arc::new(handler),
        }
    }

    pub fn from_fn<F>(methods: &[Method], f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<Response, CallbackError> + Send + Sync + 'static,
    {
        Self::new(methods, FnAction(f))
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn limit(&self) -> usize {
        self.body_limit
    }

    pub async fn call(&self, ctx: &mut Context) -> Result<Response, CallbackError> {
        self.handler.call(ctx).await
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("methods", &self.methods)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::tests::context_for;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_only_and_except_matchers() {
        let ctx = context_for(Operation::Create);
        let noop = |_: &mut Context| -> Result<(), CallbackError> { Ok(()) };

        assert!(Callback::from_fn("a", noop).matches(&ctx));
        assert!(Callback::from_fn("b", noop).only(&[Operation::Create]).matches(&ctx));
        assert!(!Callback::from_fn("c", noop).only(&[Operation::List]).matches(&ctx));
        assert!(!Callback::from_fn("d", noop).except(&[Operation::Create]).matches(&ctx));
        assert!(
            Callback::from_fn("e", noop)
                .matching(|ctx| ctx.operation.is_write())
                .matches(&ctx)
        );
    }

    #[tokio::test]
    async fn test_run_sync_callback() {
        let mut ctx = context_for(Operation::Create);
        let cb = Callback::from_fn("deny", |_| Err(CallbackError::safe("nope")));
        let err = cb.run(&mut ctx).await.unwrap_err();
        assert!(err.is_safe());
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_action_methods() {
        let action = Action::from_fn(&[Method::POST], |_| {
            Ok(axum::http::StatusCode::NO_CONTENT.into_response())
        })
        .body_limit(16);
        assert!(action.allows(&Method::POST));
        assert!(!action.allows(&Method::GET));
        assert_eq!(action.limit(), 16);
    }
}
