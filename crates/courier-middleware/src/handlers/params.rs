//! Type-driven argument binding.
//!
//! Every handler method and container constructor declares its non-payload
//! parameters as a type implementing [`HandlerParams`]. Binding is driven
//! entirely by the parameter type:
//!
//! | Parameter | Bound to |
//! |---|---|
//! | `Option<Arc<T>>` | the resolver's `T`, or `None` when unbound |
//! | `Inject<T>` | the resolver's `T`; unbound is an error |
//! | `CancellationToken` | the caller's token, or a never-cancelled one |
//! | `MessageData` | a copy of the message side channel |
//! | `()` and tuples of the above | each element in turn |

use courier_core::di::{Inject, ResolutionError};
use courier_core::{CancellationToken, MessageContext, MessageData};
use std::sync::Arc;

/// A set of parameters that can be bound from a message context.
pub trait HandlerParams: Sized + Send + 'static {
    /// Binds the parameters.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` when a required dependency has no binding.
    fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError>;
}

impl HandlerParams for () {
    fn bind(_ctx: &MessageContext) -> Result<Self, ResolutionError> {
        Ok(())
    }
}

impl<T: Send + Sync + 'static> HandlerParams for Option<Arc<T>> {
    fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError> {
        Ok(ctx.resolver().try_resolve::<T>())
    }
}

impl<T: Send + Sync + 'static> HandlerParams for Inject<T> {
    fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError> {
        Inject::from_resolver(ctx.resolver())
    }
}

impl HandlerParams for CancellationToken {
    fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError> {
        Ok(ctx.cancellation().clone())
    }
}

impl HandlerParams for MessageData {
    fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError> {
        Ok(ctx.message().data().cloned().unwrap_or_default())
    }
}

macro_rules! impl_handler_params_tuple {
    ($($name:ident),+) => {
        impl<$($name: HandlerParams),+> HandlerParams for ($($name,)+) {
            fn bind(ctx: &MessageContext) -> Result<Self, ResolutionError> {
                Ok(($($name::bind(ctx)?,)+))
            }
        }
    };
}

impl_handler_params_tuple!(A);
impl_handler_params_tuple!(A, B);
impl_handler_params_tuple!(A, B, C);
impl_handler_params_tuple!(A, B, C, D);
impl_handler_params_tuple!(A, B, C, D, E);
impl_handler_params_tuple!(A, B, C, D, E, F);
impl_handler_params_tuple!(A, B, C, D, E, F, G);
impl_handler_params_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::di::Container;
    use courier_core::{Message, MessageKind};

    #[derive(Debug)]
    struct Clock(u64);

    #[derive(Debug)]
    struct Mailer;

    fn context(container: Container) -> MessageContext {
        let mut data = MessageData::new();
        data.insert("tenant".into(), "acme".into());
        MessageContext::new(
            Message::new(MessageKind::Command, 1_u32).with_data(data),
            Arc::new(container),
        )
    }

    #[test]
    fn test_optional_binding_is_best_effort() {
        let mut container = Container::new();
        container.register(Arc::new(Clock(5)));
        let ctx = context(container);

        let (clock, mailer) = <(Option<Arc<Clock>>, Option<Arc<Mailer>>)>::bind(&ctx).unwrap();
        assert_eq!(clock.unwrap().0, 5);
        assert!(mailer.is_none());
    }

    #[test]
    fn test_inject_is_required() {
        let ctx = context(Container::new());
        assert!(<Inject<Mailer>>::bind(&ctx).is_err());
    }

    #[test]
    fn test_cancellation_and_data() {
        let token = CancellationToken::new();
        let ctx = context(Container::new()).with_cancellation(token.clone());

        let (bound, data) = <(CancellationToken, MessageData)>::bind(&ctx).unwrap();
        token.cancel();
        assert!(bound.is_cancelled());
        assert_eq!(data.get("tenant").map(String::as_str), Some("acme"));
    }
}
