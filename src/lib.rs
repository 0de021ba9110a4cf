//! Streaming content-defined chunker and DAG-construction pipeline for
//! content-addressable storage: bytes in, a content-addressed tree of
//! immutable blocks out.

pub mod block;
pub mod carheader;
pub mod cbor;
pub mod chunker;
pub mod cid;
pub mod collector;
pub mod encoder;
pub mod error;
pub mod hasher;
pub mod limits;
pub mod pipeline;
pub mod qrb;
pub mod rope;
pub mod sanity;
pub mod seen;
pub mod sink;
pub mod stats;

pub use block::{DataSource, Header};
pub use encoder::{Encoder, EncoderConfig, NodeEncoder, NodeOrigin, SeenLog};
pub use error::DaggerError;
pub use pipeline::Dagger;
pub use qrb::QrbConfig;
