//! # Reflection Broker
//!
//! Static reflection over PHP-style sources: discovers source units, tokenizes
//! each one once, and answers memoized lookups of the namespaces, classes,
//! functions and constants they declare. Nothing is executed.
//!
//! ## Pipeline
//!
//! ```text
//! Path
//!     │
//!     ├──> SourceDiscovery (file / directory / archive bundle)
//!     │      └─> Unit paths
//!     │
//!     ├──> TokenStreamProvider (skipped for processed units)
//!     │      └─> Token stream
//!     │
//!     ├──> EntityBuilder
//!     │      └─> Source unit reflection
//!     │
//!     └──> Backend (register + index)
//!            └─> Lookups through the ReflectionCache
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use refbroker::{Broker, BrokerConfig, ClassFilter};
//!
//! fn main() -> refbroker::Result<()> {
//!     let mut broker = Broker::new(BrokerConfig::default());
//!     broker.process("/path/to/project/src")?;
//!
//!     for class in broker.get_classes(ClassFilter::default()) {
//!         println!("{}", class.name);
//!     }
//!     Ok(())
//! }
//! ```

mod archive;
mod backend;
mod broker;
mod builder;
mod cache;
mod config;
mod discovery;
mod entity;
mod error;
mod memory_backend;
mod path;
mod provider;
mod source;
mod stats;

pub use archive::{archive_support_available, ArchiveMount};
pub use backend::Backend;
pub use broker::{Broker, Processed, ProcessedUnits};
pub use builder::{DeclarationBuilder, EntityBuilder};
pub use cache::ReflectionCache;
pub use config::BrokerConfig;
pub use discovery::{SourceDiscovery, SourceFiles, SourceShape};
pub use entity::{
    normalize_name, ClassFilter, ClassFlavor, Entity, EntityKind, EntityOrigin,
    SourceUnitReflection,
};
pub use error::{
    ArchiveError, BackendError, BrokerError, BuildError, ErrorKind, ProcessingCause, Result,
    TokenizeError,
};
pub use memory_backend::MemoryBackend;
pub use path::{get_real_path, SourcePath, ARCHIVE_SCHEME};
pub use provider::{FileTokenizer, TokenStreamProvider};
pub use source::read_source;
pub use stats::ProcessStats;

pub use refbroker_lexer::{Lexer, Token, TokenKind, TokenStream};
