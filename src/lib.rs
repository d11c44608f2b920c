//! op-dispatch: type-erased operator kernel dispatch.
//!
//! The core of an operator-dispatch table for a numerical runtime: kernels
//! are registered either as strongly-typed functions/functors or as boxed
//! functions over a generic argument stack, and a single [`KernelFunction`]
//! handle invokes either kind through either convention:
//! - **Uniform invocation**: typed and boxed registrations share one handle
//!   type with automatic bridging between calling conventions
//! - **Checked type erasure**: a downcastable typed-entry cell plus an
//!   optional signature fingerprint, no raw pointer reinterpretation
//! - **Deferred construction**: kernel storage instances can be materialized
//!   lazily on first call, exactly once, safely under concurrency
//!
//! # Quick Start
//!
//! ```ignore
//! use op_dispatch::{KernelFunction, Stack};
//!
//! let func = KernelFunction::from_function(|a: i64, b: i64| a + b);
//!
//! // Typed fast path.
//! let sum: i64 = func.call_unboxed((2, 3));
//! assert_eq!(sum, 5);
//!
//! // Generic boxed path.
//! let mut stack = Stack::new();
//! stack.push(2i64);
//! stack.push(3i64);
//! func.call_boxed(&mut stack);
//! assert_eq!(stack.pop().unwrap().take::<i64>(), 5);
//! ```

// Calling-convention primitives
pub mod signature;
pub mod stack;

// Kernel storage and the generated adapters between conventions
pub mod adapters;
pub mod kernel;

// The type-erased handle composing all of the above
pub mod kernel_function;

pub use adapters::{BoxedKernelFn, StackArgs, StackResult};
pub use kernel::{FnKernel, OperatorKernel, TypedKernel};
pub use kernel_function::KernelFunction;
pub use signature::{signature_fingerprint, type_fingerprint, SignatureTuple};
pub use stack::{Stack, Value, ValueError};
