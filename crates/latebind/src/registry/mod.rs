//! The conversion registry
//!
//! Maps native types to tagged values (keyed by `TypeId`) and tagged values
//! back to native values (keyed by [`Tag`]). One registry is built at
//! startup, shared as `Arc<ConversionRegistry>`, and handed to every packer
//! and invoker. Lookups take a read lock; registration takes the write lock
//! and updates both directions under the same guard.

mod array;
mod builtins;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ConversionError;
use crate::heap::ForeignHeap;
use crate::tag::Tag;
use crate::value::Value;
use crate::variant::TaggedValue;

/// What an encoder or decoder can reach while it runs.
///
/// Nested conversions (array elements, by-reference referents) go back
/// through `registry`.
#[derive(Clone, Copy)]
pub struct CodecContext<'a> {
    /// The registry running the conversion
    pub registry: &'a ConversionRegistry,
    /// Where strings, arrays, slots and object keys are allocated
    pub heap: &'a ForeignHeap,
}

/// Native value to tagged value.
pub trait Encoder: Send + Sync {
    /// Encode `native`, whose concrete type is the one this encoder was
    /// registered for.
    fn encode(&self, native: &dyn Any, cx: &CodecContext<'_>)
        -> Result<TaggedValue, ConversionError>;
}

impl<F> Encoder for F
where
    F: Fn(&dyn Any, &CodecContext<'_>) -> Result<TaggedValue, ConversionError> + Send + Sync,
{
    fn encode(
        &self,
        native: &dyn Any,
        cx: &CodecContext<'_>,
    ) -> Result<TaggedValue, ConversionError> {
        self(native, cx)
    }
}

/// Tagged value to native value.
///
/// Decoders never take ownership of the tagged value: strings are copied
/// and object handles acquire their own reference.
pub trait Decoder: Send + Sync {
    /// Decode `value`, whose tag is the one this decoder was registered for.
    fn decode(&self, value: &TaggedValue, cx: &CodecContext<'_>) -> Result<Value, ConversionError>;
}

impl<F> Decoder for F
where
    F: Fn(&TaggedValue, &CodecContext<'_>) -> Result<Value, ConversionError> + Send + Sync,
{
    fn decode(&self, value: &TaggedValue, cx: &CodecContext<'_>) -> Result<Value, ConversionError> {
        self(value, cx)
    }
}

#[derive(Clone)]
struct EncodeEntry {
    tag: Tag,
    type_name: &'static str,
    encoder: Arc<dyn Encoder>,
}

#[derive(Default)]
struct Tables {
    encoders: HashMap<TypeId, EncodeEntry>,
    decoders: HashMap<Tag, Arc<dyn Decoder>>,
}

/// Bidirectional native/tagged conversion table.
#[derive(Default)]
pub struct ConversionRegistry {
    tables: RwLock<Tables>,
}

/// Adapts a typed encoding function to the type-erased [`Encoder`].
struct TypedEncoder<T, E> {
    encode: E,
    _native: PhantomData<fn(&T)>,
}

impl<T, E> TypedEncoder<T, E> {
    fn new(encode: E) -> Self {
        TypedEncoder {
            encode,
            _native: PhantomData,
        }
    }
}

impl<T, E> Encoder for TypedEncoder<T, E>
where
    T: Any,
    E: Fn(&T, &CodecContext<'_>) -> Result<TaggedValue, ConversionError> + Send + Sync,
{
    fn encode(
        &self,
        native: &dyn Any,
        cx: &CodecContext<'_>,
    ) -> Result<TaggedValue, ConversionError> {
        (self.encode)(downcast::<T>(native)?, cx)
    }
}

fn downcast<'a, T: Any>(native: &'a dyn Any) -> Result<&'a T, ConversionError> {
    native
        .downcast_ref::<T>()
        .ok_or_else(|| ConversionError::UnsupportedNativeType {
            type_name: std::any::type_name::<T>().to_string(),
        })
}

impl ConversionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in conversion.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtins::install(&registry);
        registry
    }

    /// Built-in registry, ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::with_builtins())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════

    /// Install both directions at once. Registering an existing key
    /// replaces the previous entry.
    pub fn register(
        &self,
        tag: Tag,
        type_id: TypeId,
        type_name: &'static str,
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
    ) {
        let mut tables = self.tables.write();
        tables.encoders.insert(
            type_id,
            EncodeEntry {
                tag,
                type_name,
                encoder,
            },
        );
        tables.decoders.insert(tag, decoder);
        tracing::debug!(%tag, type_name, "registered conversion");
    }

    /// Typed form of [`ConversionRegistry::register`].
    pub fn register_type<T, E, D>(&self, tag: Tag, encode: E, decode: D)
    where
        T: Any,
        E: Fn(&T, &CodecContext<'_>) -> Result<TaggedValue, ConversionError> + Send + Sync + 'static,
        D: Fn(&TaggedValue, &CodecContext<'_>) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.register(
            tag,
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Arc::new(TypedEncoder::new(encode)),
            Arc::new(decode),
        );
    }

    /// Install an encoder only. `tag` is the tag it produces.
    pub fn register_encoder<T, E>(&self, tag: Tag, encode: E)
    where
        T: Any,
        E: Fn(&T, &CodecContext<'_>) -> Result<TaggedValue, ConversionError> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        self.tables.write().encoders.insert(
            TypeId::of::<T>(),
            EncodeEntry {
                tag,
                type_name,
                encoder: Arc::new(TypedEncoder::new(encode)),
            },
        );
        tracing::debug!(%tag, type_name, "registered encoder");
    }

    /// Install a decoder only.
    pub fn register_decoder<D>(&self, tag: Tag, decode: D)
    where
        D: Fn(&TaggedValue, &CodecContext<'_>) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.tables.write().decoders.insert(tag, Arc::new(decode));
        tracing::debug!(%tag, "registered decoder");
    }

    /// Remove the encoder for `T`. Returns whether one was installed.
    pub fn deregister<T: Any>(&self) -> bool {
        let removed = self.tables.write().encoders.remove(&TypeId::of::<T>()).is_some();
        tracing::debug!(type_name = std::any::type_name::<T>(), removed, "deregistered encoder");
        removed
    }

    /// Remove the decoder for `tag`. Returns whether one was installed.
    pub fn deregister_tag(&self, tag: Tag) -> bool {
        let removed = self.tables.write().decoders.remove(&tag).is_some();
        tracing::debug!(%tag, removed, "deregistered decoder");
        removed
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════

    /// Check for an encoder for `T`
    pub fn encodes<T: Any>(&self) -> bool {
        self.tables.read().encoders.contains_key(&TypeId::of::<T>())
    }

    /// Check for a decoder for `tag`
    pub fn decodes(&self, tag: Tag) -> bool {
        self.tables.read().decoders.contains_key(&tag)
    }

    /// The tag `T` encodes to
    pub fn tag_for<T: Any>(&self) -> Option<Tag> {
        self.tables
            .read()
            .encoders
            .get(&TypeId::of::<T>())
            .map(|e| e.tag)
    }

    /// Names of every type with an encoder, sorted.
    pub fn native_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .tables
            .read()
            .encoders
            .values()
            .map(|e| e.type_name)
            .collect();
        names.sort_unstable();
        names
    }

    // ═══════════════════════════════════════════════════════════════════
    // Conversion
    // ═══════════════════════════════════════════════════════════════════

    /// Encode a native value. `None` always encodes to the null tag.
    pub fn encode(
        &self,
        native: Option<&dyn Any>,
        heap: &ForeignHeap,
    ) -> Result<TaggedValue, ConversionError> {
        let Some(native) = native else {
            return Ok(TaggedValue::null());
        };
        let entry = self.tables.read().encoders.get(&native.type_id()).cloned();
        let entry = entry.ok_or_else(|| ConversionError::UnsupportedNativeType {
            type_name: format!("{:?}", native.type_id()),
        })?;
        let cx = CodecContext {
            registry: self,
            heap,
        };
        let encoded = entry.encoder.encode(native, &cx)?;
        tracing::trace!(type_name = entry.type_name, tag = %encoded.tag(), "encoded");
        Ok(encoded)
    }

    /// Encode a [`Value`].
    pub fn encode_value(&self, value: &Value, heap: &ForeignHeap) -> Result<TaggedValue, ConversionError> {
        self.encode(value.as_native(), heap)
            .map_err(|e| match e {
                ConversionError::UnsupportedNativeType { .. } => ConversionError::UnsupportedNativeType {
                    type_name: value.type_name().to_string(),
                },
                other => other,
            })
    }

    /// Encode a concrete native value.
    pub fn encode_native<T: Any>(&self, native: &T, heap: &ForeignHeap) -> Result<TaggedValue, ConversionError> {
        self.encode(Some(native), heap)
            .map_err(|e| match e {
                ConversionError::UnsupportedNativeType { .. } => ConversionError::UnsupportedNativeType {
                    type_name: std::any::type_name::<T>().to_string(),
                },
                other => other,
            })
    }

    /// Decode a tagged value. The value keeps ownership of its payload.
    pub fn decode(&self, value: &TaggedValue, heap: &ForeignHeap) -> Result<Value, ConversionError> {
        let tag = value.tag();
        let decoder = self.tables.read().decoders.get(&tag).cloned();
        let decoder = decoder.ok_or(ConversionError::UnsupportedVariantType { tag })?;
        let cx = CodecContext {
            registry: self,
            heap,
        };
        decoder.decode(value, &cx)
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("ConversionRegistry")
            .field("encoders", &tables.encoders.len())
            .field("decoders", &tables.decoders.len())
            .finish()
    }
}
