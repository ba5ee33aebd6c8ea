//! Protocol Buffer definitions and generated code for the event relay.
//!
//! Generated from `proto/relay.proto` with [`tonic-build`] and checked in.

pub mod relay {
    include!("relay.rs");
}
