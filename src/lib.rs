//! Incremental hyperlink harvesting across a document and its frames, with a
//! deduplicating shared store and reactive panels rendering the collection.

pub mod cli;
pub mod config;
pub mod constants;
pub mod dom;
pub mod extract;
pub mod links;
pub mod logging;
pub mod panel;
pub mod pipeline;
pub mod replay;
pub mod store;
pub mod synchronizer;
pub mod util;
pub mod watcher;
