//! Sequence model components.
//!
//! - [`SequenceModel`](sequence::SequenceModel): create, train, predict, save, load
//! - [`Weights`](network::Weights): embedding -> LSTM -> dense network and its gradients
//! - [`Adam`](optimizer::Adam): optimiser state
//! - [`Logits`](logits::Logits): softmax, cross-entropy and arg-max
//! - [`bundle`]: model directories with manifest and token index

pub mod bundle;
pub mod logits;
pub mod network;
pub mod optimizer;
pub mod sequence;

// Re-export commonly used types
pub use bundle::{list_bundles, load_bundle, save_bundle, Manifest};
pub use logits::Logits;
pub use network::Weights;
pub use optimizer::Adam;
pub use sequence::{EpochStats, ModelState, SequenceModel, TIMESTAMP_FORMAT};
