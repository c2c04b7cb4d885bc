//! The invocation context threaded through the dispatch pipeline.
//!
//! An [`InvocationContext`] is created once per incoming message and is
//! refined phase by phase: first the prefix, then alias and parameter string,
//! then the resolved command. Every refinement produces a *new* context; the
//! previous value is never mutated, so a transformer or command that kept a
//! clone of an earlier context keeps seeing exactly what it saw.
//!
//! ```rust,ignore
//! let ctx = InvocationContext::new(message, "!ping hello");
//! let refined = ctx.with_prefix("!");
//!
//! assert_eq!(ctx.prefix(), None);
//! assert_eq!(refined.prefix(), Some("!"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::command::BoxedCommand;

/// A value stored in the additional-data side channel.
pub type DataValue = Arc<dyn Any + Send + Sync>;

/// Per-message state of a command invocation.
///
/// The message itself is opaque to the dispatcher and shared behind an `Arc`,
/// so cloning a context never clones the platform message.
pub struct InvocationContext<M> {
    message: Arc<M>,
    text: Arc<str>,
    prefix: Option<String>,
    alias: Option<String>,
    parameter_string: Option<String>,
    command: Option<BoxedCommand<M>>,
    additional_data: HashMap<String, DataValue>,
}

impl<M> InvocationContext<M> {
    /// Creates a minimal context from a message and its textual content.
    pub fn new(message: M, text: impl Into<Arc<str>>) -> Self {
        Self::from_shared(Arc::new(message), text)
    }

    /// Creates a minimal context from an already shared message.
    pub fn from_shared(message: Arc<M>, text: impl Into<Arc<str>>) -> Self {
        Self {
            message,
            text: text.into(),
            prefix: None,
            alias: None,
            parameter_string: None,
            command: None,
            additional_data: HashMap::new(),
        }
    }

    /// Returns the message that triggered this invocation.
    pub fn message(&self) -> &M {
        &self.message
    }

    /// Returns a clone of the shared message handle.
    pub fn message_arc(&self) -> Arc<M> {
        Arc::clone(&self.message)
    }

    /// Returns the textual content extracted from the message.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the prefix, once computed.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the alias the message was matched against, once computed.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns the raw parameter string following the alias, once computed.
    pub fn parameter_string(&self) -> Option<&str> {
        self.parameter_string.as_deref()
    }

    /// Returns the resolved command, once computed.
    pub fn command(&self) -> Option<&BoxedCommand<M>> {
        self.command.as_ref()
    }

    /// Looks up a side-channel value by key and type.
    ///
    /// Returns `None` when the key is absent or holds a value of another type.
    pub fn data<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.additional_data
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns the raw side-channel entry for `key`.
    pub fn data_value(&self, key: &str) -> Option<&DataValue> {
        self.additional_data.get(key)
    }

    /// Returns `true` if the side channel holds an entry for `key`.
    pub fn has_data(&self, key: &str) -> bool {
        self.additional_data.contains_key(key)
    }

    /// Returns the side-channel keys in no particular order.
    pub fn data_keys(&self) -> impl Iterator<Item = &str> {
        self.additional_data.keys().map(String::as_str)
    }

    /// Starts a builder pre-populated with this context's fields.
    pub fn to_builder(&self) -> InvocationContextBuilder<M> {
        InvocationContextBuilder {
            inner: self.clone(),
        }
    }

    /// Returns a derived context with the prefix set.
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        self.to_builder().prefix(prefix).build()
    }

    /// Returns a derived context with the alias set.
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        self.to_builder().alias(alias).build()
    }

    /// Returns a derived context with the parameter string set.
    pub fn with_parameter_string(&self, parameter_string: impl Into<String>) -> Self {
        self.to_builder().parameter_string(parameter_string).build()
    }

    /// Returns a derived context with the command set.
    pub fn with_command(&self, command: BoxedCommand<M>) -> Self {
        self.to_builder().command(command).build()
    }

    /// Returns a derived context with an additional side-channel entry.
    pub fn with_data<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Self {
        self.to_builder().data(key, value).build()
    }
}

impl<M> Clone for InvocationContext<M> {
    fn clone(&self) -> Self {
        Self {
            message: Arc::clone(&self.message),
            text: Arc::clone(&self.text),
            prefix: self.prefix.clone(),
            alias: self.alias.clone(),
            parameter_string: self.parameter_string.clone(),
            command: self.command.clone(),
            additional_data: self.additional_data.clone(),
        }
    }
}

impl<M> fmt::Debug for InvocationContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.data_keys().collect();
        keys.sort_unstable();
        let command = self.command.as_ref().map(|c| c.name().to_string());
        f.debug_struct("InvocationContext")
            .field("text", &self.text)
            .field("prefix", &self.prefix)
            .field("alias", &self.alias)
            .field("parameter_string", &self.parameter_string)
            .field("command", &command)
            .field("additional_data", &keys)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// InvocationContextBuilder
// =============================================================================

/// Builder for deriving a new [`InvocationContext`] from an existing one.
///
/// Use this when a transformer needs to change several fields at once or
/// explicitly clear one; the `with_*` shortcuts on the context cover the
/// single-field case.
pub struct InvocationContextBuilder<M> {
    inner: InvocationContext<M>,
}

impl<M> InvocationContextBuilder<M> {
    /// Sets the prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner.prefix = Some(prefix.into());
        self
    }

    /// Clears the prefix.
    pub fn clear_prefix(mut self) -> Self {
        self.inner.prefix = None;
        self
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.inner.alias = Some(alias.into());
        self
    }

    /// Clears the alias.
    pub fn clear_alias(mut self) -> Self {
        self.inner.alias = None;
        self
    }

    /// Sets the parameter string.
    pub fn parameter_string(mut self, parameter_string: impl Into<String>) -> Self {
        self.inner.parameter_string = Some(parameter_string.into());
        self
    }

    /// Clears the parameter string.
    pub fn clear_parameter_string(mut self) -> Self {
        self.inner.parameter_string = None;
        self
    }

    /// Sets the resolved command.
    pub fn command(mut self, command: BoxedCommand<M>) -> Self {
        self.inner.command = Some(command);
        self
    }

    /// Clears the resolved command.
    pub fn clear_command(mut self) -> Self {
        self.inner.command = None;
        self
    }

    /// Inserts a side-channel entry, replacing any previous value for `key`.
    pub fn data<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.inner
            .additional_data
            .insert(key.into(), Arc::new(value));
        self
    }

    /// Removes a side-channel entry.
    pub fn remove_data(mut self, key: &str) -> Self {
        self.inner.additional_data.remove(key);
        self
    }

    /// Finishes the derived context.
    pub fn build(self) -> InvocationContext<M> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_minimal() {
        let ctx = InvocationContext::new(42u32, "!ping");
        assert_eq!(*ctx.message(), 42);
        assert_eq!(ctx.text(), "!ping");
        assert!(ctx.prefix().is_none());
        assert!(ctx.alias().is_none());
        assert!(ctx.parameter_string().is_none());
        assert!(ctx.command().is_none());
        assert_eq!(ctx.data_keys().count(), 0);
    }

    #[test]
    fn test_derived_context_leaves_original_untouched() {
        let original = InvocationContext::new((), "!ping hello");
        let derived = original
            .to_builder()
            .prefix("!")
            .alias("ping")
            .parameter_string("hello")
            .data("attempt", 1u8)
            .build();

        assert!(original.prefix().is_none());
        assert!(original.alias().is_none());
        assert!(!original.has_data("attempt"));

        assert_eq!(derived.prefix(), Some("!"));
        assert_eq!(derived.alias(), Some("ping"));
        assert_eq!(derived.parameter_string(), Some("hello"));
        assert_eq!(derived.data::<u8>("attempt"), Some(&1));
    }

    #[test]
    fn test_side_channel_is_copied_not_shared() {
        let first = InvocationContext::new((), "x").with_data("key", "a".to_string());
        let second = first.to_builder().data("key", "b".to_string()).build();

        assert_eq!(first.data::<String>("key").map(String::as_str), Some("a"));
        assert_eq!(second.data::<String>("key").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_data_with_wrong_type_is_none() {
        let ctx = InvocationContext::new((), "x").with_data("count", 3i64);
        assert!(ctx.data::<u32>("count").is_none());
        assert!(ctx.data_value("count").is_some());
    }

    #[test]
    fn test_builder_clears_fields_explicitly() {
        let ctx = InvocationContext::new((), "x")
            .with_prefix("!")
            .with_alias("a");
        let cleared = ctx.to_builder().clear_prefix().clear_alias().build();
        assert!(cleared.prefix().is_none());
        assert!(cleared.alias().is_none());
        assert_eq!(ctx.prefix(), Some("!"));
    }

    #[test]
    fn test_message_is_shared_between_clones() {
        let ctx = InvocationContext::new(String::from("payload"), "x");
        let derived = ctx.with_prefix("!");
        assert!(Arc::ptr_eq(&ctx.message_arc(), &derived.message_arc()));
    }
}
