//! # Sparse system assembly
//!
//! Power-flow systems are extremely sparse: each bus couples only to its
//! electrical neighbours, so a network with N unknowns carries O(N)
//! non-zeros. Devices stamp into a [`MatrixBuilder`] as flat triplets and
//! the builder materializes a CSR matrix once per Newton iteration.
//!
//! ## Usage
//!
//! ```
//! use nrpf_algo::sparse::MatrixBuilder;
//!
//! let mut y = MatrixBuilder::new(2);
//! y.add(0, 0, 10.0);
//! y.add(1, 1, 10.0);
//! let baseline = y.get_usage();
//!
//! y.add(0, 1, -1.0); // per-iteration stamp
//! y.assert_valid(true)?;
//! let matrix = y.to_matrix()?;
//! assert_eq!(matrix.nnz(), 3);
//!
//! y.clear(baseline);
//! assert_eq!(y.get_usage(), 2);
//! # Ok::<(), nrpf_core::NrpfError>(())
//! ```

pub mod matrix_builder;

pub use matrix_builder::{MatrixBuilder, StampError};
