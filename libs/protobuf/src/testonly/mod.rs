//! Testonly utilities.
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};

use super::{decode, encode, ProtoFmt};

/// Tests that `x` survives an encode/decode cycle unchanged.
#[track_caller]
pub fn test_encode<T: ProtoFmt + std::fmt::Debug + PartialEq>(x: &T) {
    let bytes = encode(x);
    assert_eq!(x, &decode::<T>(&bytes).unwrap());
}

/// Syntax sugar for `test_encode`,
/// because `test_encode(&rng.gen())` doesn't read well in tests.
#[track_caller]
pub fn test_encode_random<T: ProtoFmt + std::fmt::Debug + PartialEq>(rng: &mut impl Rng)
where
    Standard: Distribution<T>,
{
    for _ in 0..10 {
        let msg = rng.gen::<T>();
        test_encode(&msg);
    }
}
