use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A provider-native message that the agent carries in the history
/// without interpreting it.
///
/// The message types this crate defines are lossy for some providers.
/// A chat-completions assistant turn that requested tool calls, for
/// example, must be echoed back verbatim in the next request for the
/// tool results to be accepted. `OpaqueMessage` lets a provider park
/// its own wire type in the conversation and recover it later when the
/// history is serialized again.
pub struct OpaqueMessage(Arc<dyn OpaqueMessageObject>);

impl OpaqueMessage {
    /// Creates a new `OpaqueMessage`.
    ///
    /// The `id` identifies the message and should be unique across the
    /// conversation. Comparing `OpaqueMessage` is just trivially
    /// comparing the `id`.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        let id = id.into();
        Self(Arc::new(OpaqueMessageInner { id, value }))
    }

    /// Converts the `OpaqueMessage` back into its raw type.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl Clone for OpaqueMessage {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debug for OpaqueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueMessage")
            .field("id", &self.0.id())
            .finish()
    }
}

impl PartialEq for OpaqueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for OpaqueMessage {}

impl Hash for OpaqueMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

trait OpaqueMessageObject: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

struct OpaqueMessageInner<T> {
    id: String,
    value: T,
}

impl<T: Send + Sync + 'static> OpaqueMessageObject for OpaqueMessageInner<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Clone)]
    struct WireMessage(String);

    #[test]
    fn test_round_trip() {
        let raw = WireMessage("report".to_string());
        let opaque = OpaqueMessage::new("msg:0", raw);
        let raw_back = opaque.to_raw::<WireMessage>().unwrap();
        assert_eq!(raw_back.0, "report");
    }

    #[test]
    fn test_wrong_type_downcast() {
        let opaque = OpaqueMessage::new("msg:0", WireMessage("x".to_string()));
        assert!(opaque.to_raw::<String>().is_none());
    }

    #[test]
    fn test_identity_by_id() {
        let opaque_0 = OpaqueMessage::new("msg:0", WireMessage("a".into()));
        let opaque_1 = OpaqueMessage::new("msg:1", WireMessage("b".into()));

        let opaque_0_clone = opaque_0.clone();
        assert_eq!(opaque_0, opaque_0_clone);
        assert_ne!(opaque_0, opaque_1);

        let mut set = HashSet::new();
        set.insert(opaque_0);
        set.insert(opaque_0_clone);
        set.insert(opaque_1);
        assert_eq!(set.len(), 2);
    }
}
