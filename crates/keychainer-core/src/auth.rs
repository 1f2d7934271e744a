//! Authentication-context handles.
//!
//! A context decides how the platform prompts the user (the reason shown in
//! the prompt, how long a successful authentication may be reused). The
//! keychain layer never inspects it: the handle is attached to queries and
//! handed to the backend unchanged.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Platform authentication context, treated as opaque by the compiler.
pub trait AuthenticationContext: Send + Sync {
    /// How long a successful authentication may be reused without a new
    /// prompt.
    fn reuse_duration(&self) -> Duration;

    /// Reason shown to the user in the authentication prompt.
    fn localized_reason(&self) -> Option<&str>;

    /// Pointer to the native context object, for backends that forward it.
    fn platform_handle(&self) -> Option<*const c_void> {
        None
    }
}

/// Shared, cheaply cloneable handle to an [`AuthenticationContext`].
///
/// Two handles are equal only when they point at the same context.
#[derive(Clone)]
pub struct ContextHandle(Arc<dyn AuthenticationContext>);

impl ContextHandle {
    pub fn new(context: impl AuthenticationContext + 'static) -> Self {
        Self(Arc::new(context))
    }

    pub fn from_arc(context: Arc<dyn AuthenticationContext>) -> Self {
        Self(context)
    }

    pub fn context(&self) -> &dyn AuthenticationContext {
        self.0.as_ref()
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ContextHandle {}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("reuse_duration", &self.0.reuse_duration())
            .field("localized_reason", &self.0.localized_reason())
            .finish()
    }
}

/// A context that only carries prompt settings.
///
/// Backends without a native context object (such as the in-memory vault)
/// use this directly.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    reuse_duration: Duration,
    reason: Option<String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reuse_duration(mut self, duration: Duration) -> Self {
        self.reuse_duration = duration;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl AuthenticationContext for PromptContext {
    fn reuse_duration(&self) -> Duration {
        self.reuse_duration
    }

    fn localized_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}
