//! CKE model components: padded embedding tables, the item tower, scorers,
//! and the tensor bridge between plain id vectors and burn tensors.

pub mod bridge;
pub mod cke;
pub mod embedding;
pub mod encoder;
pub mod scorer;
