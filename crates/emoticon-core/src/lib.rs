//! emoticon-core — Pure domain logic, no transport adapters.
//!
//! A named catalogue of content-addressed emoticons in which several names can
//! be declared synonyms of one another. Frontends drive it through
//! [`service::EmoticonService`] and listen for out-of-band failures on its
//! [`events::ErrorReporter`].

pub mod audit;
pub mod config;
pub mod content;
pub mod equivalence;
pub mod error;
pub mod events;
pub mod journal;
pub mod locks;
pub mod repository;
pub mod service;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
