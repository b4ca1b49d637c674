pub mod cleaner;
pub mod docker;
pub mod error;
pub mod prune;
pub mod reference;
pub mod store;
pub(crate) mod util;

#[cfg(test)]
pub(crate) mod test;
