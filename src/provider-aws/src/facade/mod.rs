//! The two `CloudServices` implementations: `real`, backed by the vendor
//! AWS SDKs, and `test_double`, an in-memory stand-in used by this crate's
//! own test suite (`SPEC_FULL.md` §4.3, §9 "Interface polymorphism").

pub mod real;
pub mod test_double;

pub use real::RealCloudServices;
pub use test_double::TestDoubleServices;
