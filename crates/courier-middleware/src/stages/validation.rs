//! Message validation middleware.
//!
//! Validation runs before handler location. A message that fails validation
//! is `Rejected`: it never reaches a handler and the caller receives
//! `PipelineError::Rejected`.
//!
//! # Modes
//!
//! - Allow-all (the default; nothing is checked)
//! - Reject-all (for testing rejection paths)
//! - Rules registered per payload type
//!
//! # Example
//!
//! ```
//! use courier_middleware::stages::ValidationMiddleware;
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize)]
//! struct Transfer {
//!     amount: i64,
//! }
//!
//! let validation = ValidationMiddleware::with_rules()
//!     .rule(|t: &Transfer| {
//!         if t.amount > 0 {
//!             Ok(())
//!         } else {
//!             Err("amount must be positive".to_string())
//!         }
//!     })
//!     .build();
//! assert_eq!(validation.rule_count(), 1);
//! ```

use crate::middleware::{BoxFuture, Middleware};
use courier_core::{MessageContext, Payload, PipelineResult, ProcessingStatus};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Rule = Arc<dyn Fn(&dyn Payload) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
enum ValidationMode {
    AllowAll,
    RejectAll,
    Rules(Arc<HashMap<TypeId, Vec<Rule>>>),
}

impl ValidationMode {
    fn name(&self) -> &'static str {
        match self {
            Self::AllowAll => "allow_all",
            Self::RejectAll => "reject_all",
            Self::Rules(_) => "rules",
        }
    }
}

/// Validates messages before they reach a handler.
#[derive(Clone)]
pub struct ValidationMiddleware {
    mode: ValidationMode,
}

impl fmt::Debug for ValidationMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationMiddleware")
            .field("mode", &self.mode.name())
            .field("rules", &self.rule_count())
            .finish()
    }
}

impl Default for ValidationMiddleware {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl ValidationMiddleware {
    /// Accepts every message.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            mode: ValidationMode::AllowAll,
        }
    }

    /// Rejects every message.
    #[must_use]
    pub fn reject_all() -> Self {
        Self {
            mode: ValidationMode::RejectAll,
        }
    }

    /// Starts a rule-based validator.
    #[must_use]
    pub fn with_rules() -> ValidationBuilder {
        ValidationBuilder::default()
    }

    /// Returns the number of registered rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        match &self.mode {
            ValidationMode::Rules(rules) => rules.values().map(Vec::len).sum(),
            _ => 0,
        }
    }

    /// Checks a payload, returning the first rule violation.
    ///
    /// # Errors
    ///
    /// Returns the violation text.
    pub fn check(&self, payload: &dyn Payload) -> Result<(), String> {
        match &self.mode {
            ValidationMode::AllowAll => Ok(()),
            ValidationMode::RejectAll => Err("validation rejects all messages".to_string()),
            ValidationMode::Rules(rules) => rules
                .get(&payload.as_any().type_id())
                .map_or(Ok(()), |rules| rules.iter().try_for_each(|rule| rule(payload))),
        }
    }

    fn validate(&self, ctx: &mut MessageContext) -> PipelineResult<()> {
        if ctx.status() != ProcessingStatus::Processing {
            return Ok(());
        }
        match self.check(ctx.message().content()) {
            Ok(()) => Ok(()),
            Err(reason) => {
                tracing::info!(
                    message_id = %ctx.message_id(),
                    content_type = ctx.content_type(),
                    reason = %reason,
                    "message rejected"
                );
                ctx.reject(reason)
            }
        }
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn process<'a>(&'a self, ctx: &'a mut MessageContext) -> BoxFuture<'a, PipelineResult<()>> {
        Box::pin(std::future::ready(self.validate(ctx)))
    }
}

/// Builder for rule-based validation.
#[derive(Default)]
pub struct ValidationBuilder {
    rules: HashMap<TypeId, Vec<Rule>>,
}

impl ValidationBuilder {
    /// Adds a rule for payloads of type `T`.
    #[must_use]
    pub fn rule<T, F>(mut self, rule: F) -> Self
    where
        T: Payload,
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        let erased: Rule = Arc::new(move |payload: &dyn Payload| {
            payload.downcast_ref::<T>().map_or(Ok(()), &rule)
        });
        self.rules.entry(TypeId::of::<T>()).or_default().push(erased);
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> ValidationMiddleware {
        ValidationMiddleware {
            mode: ValidationMode::Rules(Arc::new(self.rules)),
        }
    }
}

impl fmt::Debug for ValidationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationBuilder")
            .field("types", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::di::NullResolver;
    use courier_core::{Message, MessageKind, PipelineError};
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Deposit {
        amount: i64,
    }

    #[derive(Debug, Serialize)]
    struct Other;

    fn positive() -> ValidationMiddleware {
        ValidationMiddleware::with_rules()
            .rule(|d: &Deposit| {
                if d.amount > 0 {
                    Ok(())
                } else {
                    Err(format!("amount {} is not positive", d.amount))
                }
            })
            .build()
    }

    fn validate<T: Payload>(validation: &ValidationMiddleware, payload: T) -> MessageContext {
        let mut ctx = MessageContext::new(Message::new(MessageKind::Command, payload), Arc::new(NullResolver));
        ctx.begin().unwrap();
        futures::executor::block_on(validation.process(&mut ctx)).unwrap();
        ctx
    }

    #[test]
    fn test_allow_all() {
        let ctx = validate(&ValidationMiddleware::allow_all(), Deposit { amount: -1 });
        assert_eq!(ctx.status(), ProcessingStatus::Processing);
    }

    #[test]
    fn test_reject_all() {
        let mut ctx = validate(&ValidationMiddleware::reject_all(), Other);
        assert_eq!(ctx.status(), ProcessingStatus::Rejected);
        assert!(matches!(ctx.take_failure(), Some(PipelineError::Rejected { .. })));
    }

    #[test]
    fn test_rule_rejects_invalid_payload() {
        let mut ctx = validate(&positive(), Deposit { amount: 0 });
        assert_eq!(ctx.status(), ProcessingStatus::Rejected);
        match ctx.take_failure() {
            Some(PipelineError::Rejected { reason, .. }) => {
                assert_eq!(reason, "amount 0 is not positive");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rules_only_apply_to_their_type() {
        let validation = positive();
        assert_eq!(validate(&validation, Deposit { amount: 5 }).status(), ProcessingStatus::Processing);
        assert_eq!(validate(&validation, Other).status(), ProcessingStatus::Processing);
    }
}
