//! Type-safe cache key builders
//!
//! Keys are `{VERSION}:{namespace}:...`; bumping [`VERSION`] orphans every
//! entry written by an older layout.

use std::fmt;
use uuid::Uuid;

pub const VERSION: &str = "v1";

pub mod merchant_rate {
    use super::*;

    pub const NAMESPACE: &str = "merchant_rate";

    /// Cached `MerchantRateSettings` for one merchant
    #[derive(Debug, Clone)]
    pub struct SettingsKey {
        pub merchant_id: Uuid,
    }

    impl SettingsKey {
        pub fn new(merchant_id: Uuid) -> Self {
            Self { merchant_id }
        }
    }

    impl fmt::Display for SettingsKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:settings:{}", VERSION, NAMESPACE, self.merchant_id)
        }
    }
}
