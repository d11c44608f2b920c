//! Process-local signature fingerprints for cross-checking typed calls.
//!
//! A fingerprint is a 64-bit hash over a call signature: return type first,
//! then parameters in order. It is stable within one running process and
//! build, and explicitly **not** stable across compilers, platforms or runs
//! (`TypeId` makes no such promise) — never persist or serialize it.
//!
//! The check is heuristic: two distinct signatures may collide, which is
//! tolerated. The fingerprint only guards the type-erasure boundary of
//! unboxed calls; the hard guarantee comes from the typed-entry downcast in
//! [`crate::adapters`].

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Multiplier applied per signature position so that argument order matters.
pub(crate) const POSITION_WEIGHT: u64 = 1_000_000;

/// Hash of a single type's process-local identity.
///
/// `TypeId` already distinguishes `T`, `&T` and `&mut T`, so reference and
/// mutability qualifiers are part of the identity rather than separate bits.
pub fn type_fingerprint<T: 'static>() -> u64 {
    let mut hasher = DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

/// Tuple of parameter types that can contribute to a signature fingerprint.
///
/// Implemented for tuples of arity 0 through 8.
pub trait SignatureTuple: 'static {
    /// Accumulate the fingerprint contribution of every element, starting at
    /// `position`. The empty tuple contributes zero.
    fn accumulate(position: u64) -> u64;
}

macro_rules! impl_signature_tuple {
    () => {
        impl SignatureTuple for () {
            fn accumulate(_position: u64) -> u64 {
                0
            }
        }
    };
    ($($param:ident),+) => {
        impl<$($param: 'static),+> SignatureTuple for ($($param,)+) {
            fn accumulate(position: u64) -> u64 {
                let mut hash = 0u64;
                let mut position = position;
                $(
                    hash = hash.wrapping_add(
                        POSITION_WEIGHT
                            .wrapping_mul(position)
                            .wrapping_mul(type_fingerprint::<$param>()),
                    );
                    position += 1;
                )+
                let _ = position;
                hash
            }
        }
    };
}

impl_signature_tuple!();
impl_signature_tuple!(A1);
impl_signature_tuple!(A1, A2);
impl_signature_tuple!(A1, A2, A3);
impl_signature_tuple!(A1, A2, A3, A4);
impl_signature_tuple!(A1, A2, A3, A4, A5);
impl_signature_tuple!(A1, A2, A3, A4, A5, A6);
impl_signature_tuple!(A1, A2, A3, A4, A5, A6, A7);
impl_signature_tuple!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Fingerprint of a full call signature: return type at position 1,
/// parameters from position 2 onwards.
pub fn signature_fingerprint<Ret: 'static, Args: SignatureTuple>() -> u64 {
    POSITION_WEIGHT
        .wrapping_mul(type_fingerprint::<Ret>())
        .wrapping_add(Args::accumulate(2))
}
