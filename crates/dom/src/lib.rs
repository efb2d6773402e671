//! In-memory document model for hosting custom elements outside a browser.
//!
//! The [`Document`] owns a tree of element nodes with attributes, a `hidden` flag and text
//! content. Tags registered through [`Document::define`] get a [`CustomElement`] controller
//! whose [`CustomElement::connected`] / [`CustomElement::disconnected`] callbacks fire as
//! nodes enter and leave the connected tree, in document order and in whatever order the
//! embedder mutates the tree.
//!
//! Lookups use a small CSS subset (see [`Selector`]): type, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, the descendant combinator and `,` lists.

mod document;
mod element;
mod error;
mod event;
mod selector;

pub use document::{Document, NodeId, WeakDocument};
pub use element::{CustomElement, ElementFactory};
pub use error::{DomError, Result};
pub use event::DomEvent;
pub use selector::Selector;
