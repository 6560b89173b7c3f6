//! Invocation configuration

/// The user-default locale.
pub const LOCALE_USER_DEFAULT: u32 = 0x0400;

/// Configuration for late-bound calls.
///
/// Handed to every [`Invoker`](crate::Invoker) and controls the locale
/// names are resolved in, enumeration batching, and identifier caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeConfig {
    /// Locale passed to name resolution and dispatch
    pub locale: u32,

    /// Items fetched per `next` call when walking an enumeration
    pub enum_batch_size: u32,

    /// Whether bound objects cache resolved member identifiers
    pub cache_member_ids: bool,

    /// Whether to trace every call phase (for debugging)
    pub trace_calls: bool,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            locale: LOCALE_USER_DEFAULT,
            enum_batch_size: 100,
            cache_member_ids: true,
            trace_calls: false,
        }
    }
}

impl InvokeConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different locale.
    pub fn with_locale(self, locale: u32) -> Self {
        Self { locale, ..self }
    }

    /// Use a different enumeration batch size. Zero is treated as one.
    pub fn with_enum_batch_size(self, size: u32) -> Self {
        Self {
            enum_batch_size: size.max(1),
            ..self
        }
    }

    /// Turn the per-instance identifier cache on or off.
    pub fn with_member_id_cache(self, enabled: bool) -> Self {
        Self {
            cache_member_ids: enabled,
            ..self
        }
    }

    /// Turn call tracing on or off.
    pub fn with_trace(self, enabled: bool) -> Self {
        Self {
            trace_calls: enabled,
            ..self
        }
    }
}
