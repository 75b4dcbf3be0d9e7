//! Unguessable bundle identifiers.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};

use crate::errors::BundleError;

/// Length of a generated bundle id.
pub const BUNDLE_ID_LEN: usize = 15;

/// Opaque alphanumeric token naming a bundle directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(String);

impl BundleId {
    /// Accept an externally supplied id (e.g. a route segment).
    ///
    /// Only ASCII letters and digits are allowed so an id can never name
    /// anything outside the bundle root.
    pub fn parse(raw: &str) -> Result<Self, BundleError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(BundleError::InvalidBundleId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draws bundle ids from an explicitly owned cryptographic RNG.
pub struct BundleIdAllocator<R = OsRng> {
    rng: std::sync::Mutex<R>,
}

impl BundleIdAllocator<OsRng> {
    /// Allocator backed by the operating system's entropy source.
    pub fn from_os() -> Self {
        Self::new(OsRng)
    }
}

impl Default for BundleIdAllocator<OsRng> {
    fn default() -> Self {
        Self::from_os()
    }
}

impl<R: RngCore + CryptoRng> BundleIdAllocator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: std::sync::Mutex::new(rng),
        }
    }

    /// Generate a fresh id of [`BUNDLE_ID_LEN`] alphanumerics.
    pub fn allocate(&self) -> BundleId {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id: String = (0..BUNDLE_ID_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect();
        BundleId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_length_and_alphabet() {
        let allocator = BundleIdAllocator::from_os();
        for _ in 0..100 {
            let id = allocator.allocate();
            assert_eq!(id.as_str().len(), BUNDLE_ID_LEN);
            assert!(id.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_allocate_is_deterministic_with_seeded_rng() {
        let a = BundleIdAllocator::new(StdRng::seed_from_u64(7));
        let b = BundleIdAllocator::new(StdRng::seed_from_u64(7));
        assert_eq!(a.allocate(), b.allocate());
        assert_eq!(a.allocate(), b.allocate());
    }

    #[test]
    fn test_allocate_does_not_repeat() {
        let allocator = BundleIdAllocator::from_os();
        let ids: HashSet<BundleId> = (0..1000).map(|_| allocator.allocate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_parse_accepts_alphanumerics() {
        let id = BundleId::parse("aB3dE5gH7jK9mN1").unwrap();
        assert_eq!(id.to_string(), "aB3dE5gH7jK9mN1");
    }

    #[test]
    fn test_parse_rejects_traversal_and_empty() {
        for bad in ["", "..", "a/b", "a.b", "abc%2F", "ab c"] {
            assert!(BundleId::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }
}
