//! Build-scoped event-listener subscriptions.

use quarry_codec::PayloadValue;

/// One build-scoped event-listener subscription.
///
/// The provider is an opaque host value (typically a listener provider)
/// serialized through the build-scope encoder set and re-attached to the
/// materialized build on load.
#[derive(Debug)]
pub struct EventSubscription {
    /// The opaque encoded listener provider.
    pub provider: Box<dyn PayloadValue>,
}

impl EventSubscription {
    /// Creates a subscription wrapping the given provider.
    pub fn new(provider: Box<dyn PayloadValue>) -> Self {
        Self { provider }
    }
}
