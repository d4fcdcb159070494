// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Consistency checks
//!
//! The merger assumes the corpus describes one well-defined program. These checks
//! certify that before merging; each fails with the offending trace and signature.

mod constant_agreement;
mod isomorphism;
mod signature_uniqueness;

pub use constant_agreement::check_constant_agreement;
pub use isomorphism::check_isomorphism;
pub use signature_uniqueness::check_signature_uniqueness;
