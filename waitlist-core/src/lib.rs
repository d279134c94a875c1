#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! waitlist-core

pub mod claims;
pub mod limiter;
pub mod presence;
pub mod token;
