#![deny(missing_docs)]
// This is an HTML/XML parser. Its input can be untrusted data from the internet.
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

/// Ordered attribute storage.
pub mod attributes;
/// Character-reference (entity) resolution.
pub mod entities;
/// Parse error kinds and the `Failure` abort type.
pub mod error;
/// HTML tree construction: insertion modes, adoption agency, foster parenting.
pub mod html_tree_builder;
/// The orchestrator: `Parser`, `ParserConfig`, `Document`.
pub mod parser;
/// Thread-local scratch-buffer pools.
pub mod pool;
/// Source position and range tracking.
pub mod position;
/// Buffered, rewindable character reader.
pub mod reader;
/// Tree-to-text serialization.
pub mod serializer;
/// Per-namespace tag descriptors.
pub mod tag;
/// The token data model.
pub mod token;
/// The HTML tokenizer state machine.
pub mod tokenizer;
/// The arena-based node tree.
pub mod tree;
/// XML tree construction: namespace-scope-stack tree building.
#[cfg(feature = "xml")]
pub mod xml_tree_builder;

mod utils;

pub use error::{Error, Failure, ParseError};
pub use html_tree_builder::{HtmlTreeBuilder, TreeBuilderAction};
pub use parser::{Document, Parser, ParserConfig, QuirksMode};
pub use reader::{CharReader, ReadSource, Source, StringSource};
pub use serializer::OutputSettings;
pub use token::Token;
pub use tokenizer::{State, Tokenizer};
pub use tree::{NodeId, NodeKind, NodeTree, XmlNamespace};

#[cfg(feature = "xml")]
pub use xml_tree_builder::XmlTreeBuilder;
