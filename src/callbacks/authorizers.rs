//! Ready-made authorizers built on the request's [`AuthContext`]
//!
//! The caller identity is read from the request extensions, where an upstream
//! layer (a tower middleware, a gateway adapter) is expected to insert it.

use crate::core::auth::AuthPolicy;
use crate::core::callback::Callback;
use crate::core::context::Context;
use crate::core::error::CallbackError;
use crate::core::operation::Operation;
use crate::core::query::Filter;

/// Reject the request unless the caller satisfies `policy`
///
/// ```rust,ignore
/// let posts = Controller::new(posts_meta(), store)
///     .authorizer(policy_authorizer("writers", "role:writer".parse()?)
///         .only(&[Operation::Create, Operation::Update, Operation::Delete]));
/// ```
pub fn policy_authorizer(name: impl Into<String>, policy: AuthPolicy) -> Callback {
    Callback::from_fn(name, move |ctx| {
        let auth = ctx.auth();
        if policy.check(&auth) {
            Ok(())
        } else if auth.is_anonymous() {
            Err(CallbackError::safe("authentication required"))
        } else {
            Err(CallbackError::safe(format!(
                "not allowed to {} {}",
                ctx.operation,
                ctx.meta().name
            )))
        }
    })
}

/// Scope every operation to the records owned by the caller
///
/// `field` is a to-one relationship or attribute holding the owner's user id.
/// Admins and services see everything. Creation is left alone, pair it with a
/// validator that stamps the owner.
pub fn owner_authorizer(field: impl Into<String>) -> Callback {
    let field = field.into();
    let name = format!("owner:{}", field);
    Callback::from_fn(name, move |ctx| {
        let auth = ctx.auth();
        if auth.is_admin() || auth.is_service() {
            return Ok(());
        }
        let user_id = auth
            .user_id()
            .ok_or_else(|| CallbackError::safe("authentication required"))?;
        let key = store_key(ctx, &field)?;
        ctx.filters.push(Filter::eq(key, user_id.to_string()));
        Ok(())
    })
    .except(&[Operation::Create, Operation::CollectionAction])
}

/// Drop `fields` from the writable whitelist of callers failing `policy`
///
/// Combined with soft protection this lets regular users submit full
/// documents while only privileged callers change the protected fields.
pub fn protected_fields_authorizer(fields: &[&str], policy: AuthPolicy) -> Callback {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    let name = format!("protect:{}", fields.join(","));
    Callback::from_fn(name, move |ctx| {
        if !policy.check(&ctx.auth()) {
            ctx.writable_fields.retain(|f| !fields.contains(f));
        }
        Ok(())
    })
    .only(&[Operation::Create, Operation::Update])
}

/// Hide `fields` from callers failing `policy`
pub fn hidden_fields_authorizer(fields: &[&str], policy: AuthPolicy) -> Callback {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    let name = format!("hide:{}", fields.join(","));
    Callback::from_fn(name, move |ctx| {
        if !policy.check(&ctx.auth()) {
            ctx.readable_fields.retain(|f| !fields.contains(f));
        }
        Ok(())
    })
}

fn store_key(ctx: &Context, field: &str) -> Result<String, CallbackError> {
    ctx.meta()
        .get(field)
        .map(|f| f.store_key.clone())
        .ok_or_else(|| anyhow::anyhow!("unknown field '{}' on '{}'", field, ctx.meta().name).into())
}
