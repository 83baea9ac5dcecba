//! Isolate scopes and per-scope payload encoder resolution.
//!
//! An isolate identifies whose encoding rules currently apply to a
//! region of the object graph: the host process, the build being
//! configured, or one specific project. Encoder resolution is dynamic
//! scoping made explicit: a stack of (owner, encoder set) frames where
//! only the top frame is consulted, pushed and popped around nested
//! graph regions.

use crate::context::{ReadContext, WriteContext};
use crate::error::CodecError;
use quarry_common::ProjectPath;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The scope identity that owns the object graph region being encoded
/// or decoded. Exactly one owner is active at any point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IsolateOwner {
    /// The host process itself (fingerprint data, cache bookkeeping).
    Host,
    /// The build being configured (build-scoped subscriptions).
    Build,
    /// One specific project within the build.
    Project(ProjectPath),
}

impl fmt::Display for IsolateOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolateOwner::Host => f.write_str("host"),
            IsolateOwner::Build => f.write_str("build"),
            IsolateOwner::Project(path) => write!(f, "project {path}"),
        }
    }
}

/// An opaque domain value that can travel through the cache stream.
///
/// Concrete value types are supplied by the host; the engine only knows
/// their type tag, which selects the codec within the active isolate's
/// encoder set.
pub trait PayloadValue: Any + fmt::Debug + Send + Sync {
    /// The tag identifying this value's type on the wire.
    fn type_tag(&self) -> &str;

    /// Downcasting access for hosts that know the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Encodes and decodes one payload type.
pub trait PayloadCodec: Send + Sync {
    /// Writes the payload body (the tag has already been written).
    fn encode(
        &self,
        value: &dyn PayloadValue,
        ctx: &mut WriteContext<'_>,
    ) -> Result<(), CodecError>;

    /// Reads a payload body (the tag has already been read).
    fn decode(&self, ctx: &mut ReadContext<'_>) -> Result<Box<dyn PayloadValue>, CodecError>;
}

/// The set of payload codecs resolvable within one isolate scope.
#[derive(Default)]
pub struct EncoderSet {
    codecs: BTreeMap<String, Arc<dyn PayloadCodec>>,
}

impl EncoderSet {
    /// Creates an empty encoder set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec under the given tag, replacing any previous one.
    pub fn register(&mut self, tag: impl Into<String>, codec: Arc<dyn PayloadCodec>) {
        self.codecs.insert(tag.into(), codec);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_codec(mut self, tag: impl Into<String>, codec: Arc<dyn PayloadCodec>) -> Self {
        self.register(tag, codec);
        self
    }

    /// Looks up the codec for a tag.
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn PayloadCodec>> {
        self.codecs.get(tag).cloned()
    }

    /// Returns the number of registered codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns `true` if no codecs are registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

/// Resolves the encoder set to use for a given isolate owner.
///
/// Implemented by the host: project scopes may expose different codecs
/// than the build scope (e.g. project-relative file references).
pub trait EncoderResolver: Send + Sync {
    /// Returns the encoder set bound to the given owner.
    fn encoder_set_for(&self, owner: &IsolateOwner) -> Arc<EncoderSet>;
}

struct Frame {
    owner: IsolateOwner,
    set: Arc<EncoderSet>,
}

/// The stack of active isolate frames during one encode or decode pass.
///
/// Entering a nested owner is strictly stack-like: a frame pushed for a
/// nested graph region is popped when the region ends, restoring the
/// enclosing frame on every exit path.
#[derive(Default)]
pub struct IsolateContext {
    frames: Vec<Frame>,
}

impl IsolateContext {
    /// Creates an empty isolate context.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, owner: IsolateOwner, set: Arc<EncoderSet>) {
        self.frames.push(Frame { owner, set });
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Returns the currently active owner, if any isolate has been
    /// entered.
    pub fn owner(&self) -> Option<&IsolateOwner> {
        self.frames.last().map(|f| &f.owner)
    }

    /// Returns the current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Resolves a payload codec against the active frame's encoder set.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn PayloadCodec>, CodecError> {
        let frame = self.frames.last().ok_or(CodecError::NoIsolate)?;
        frame.set.resolve(tag).ok_or_else(|| CodecError::UnknownTag {
            tag: tag.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Marker;

    impl PayloadValue for Marker {
        fn type_tag(&self) -> &str {
            "test.marker"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct MarkerCodec;

    impl PayloadCodec for MarkerCodec {
        fn encode(
            &self,
            _value: &dyn PayloadValue,
            _ctx: &mut WriteContext<'_>,
        ) -> Result<(), CodecError> {
            Ok(())
        }
        fn decode(&self, _ctx: &mut ReadContext<'_>) -> Result<Box<dyn PayloadValue>, CodecError> {
            Ok(Box::new(Marker))
        }
    }

    #[test]
    fn owner_display() {
        assert_eq!(IsolateOwner::Host.to_string(), "host");
        assert_eq!(IsolateOwner::Build.to_string(), "build");
        let project = IsolateOwner::Project(":app".parse().unwrap());
        assert_eq!(project.to_string(), "project :app");
    }

    #[test]
    fn empty_context_has_no_owner() {
        let ctx = IsolateContext::new();
        assert!(ctx.owner().is_none());
        assert_eq!(ctx.depth(), 0);
        assert!(matches!(ctx.resolve("any"), Err(CodecError::NoIsolate)));
    }

    #[test]
    fn resolution_uses_top_frame_only() {
        let outer = Arc::new(EncoderSet::new().with_codec("test.marker", Arc::new(MarkerCodec)));
        let inner = Arc::new(EncoderSet::new());

        let mut ctx = IsolateContext::new();
        ctx.push(IsolateOwner::Build, outer);
        assert!(ctx.resolve("test.marker").is_ok());

        ctx.push(IsolateOwner::Project(":app".parse().unwrap()), inner);
        // The inner frame has no codecs; the outer frame is shadowed.
        assert!(matches!(
            ctx.resolve("test.marker"),
            Err(CodecError::UnknownTag { .. })
        ));

        ctx.pop();
        assert!(ctx.resolve("test.marker").is_ok());
        assert_eq!(ctx.owner(), Some(&IsolateOwner::Build));
    }

    #[test]
    fn encoder_set_replaces_on_reregister() {
        let mut set = EncoderSet::new();
        set.register("t", Arc::new(MarkerCodec));
        set.register("t", Arc::new(MarkerCodec));
        assert_eq!(set.len(), 1);
        assert!(!set.is_empty());
    }
}
