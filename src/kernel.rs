//! Kernel storage types: the receiver objects behind every dispatch.
//!
//! [`OperatorKernel`] is the capability marker every concrete kernel type
//! must implement — it exists purely so the dispatcher can hold kernels of
//! different concrete types behind one trait object and recover the concrete
//! type at the adapter boundary. [`TypedKernel`] adds the statically-typed
//! call operator that the boxing/unboxing adapters are generated from.
//! [`FnKernel`] wraps plain functions, function pointers and closures into a
//! kernel storage type so they can go through the same machinery.

use std::any::Any;
use std::marker::PhantomData;

use crate::adapters::{StackArgs, StackResult};

/// Base capability every concrete kernel storage type must implement.
///
/// No behavior beyond downcasting is imposed: a kernel holds whatever
/// captured state it needs (weights, handles, precomputed tables) and is
/// responsible for its own internal synchronization, since one instance is
/// shared across all concurrent callers for the process lifetime.
pub trait OperatorKernel: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

/// Implements the [`OperatorKernel`] downcast boilerplate for a kernel type.
///
/// # Example
///
/// ```ignore
/// struct SumKernel;
/// op_dispatch::operator_kernel!(SumKernel);
/// ```
#[macro_export]
macro_rules! operator_kernel {
    ($kernel:ty) => {
        impl $crate::OperatorKernel for $kernel {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

/// A kernel storage type with a statically-typed call operator.
///
/// `Args` is the parameter list as a tuple (arity 0 through 8) and `Ret` the
/// return type, with `()` meaning "no value". Both calling conventions are
/// generated from this one method at registration time.
pub trait TypedKernel: OperatorKernel {
    type Args: StackArgs;
    type Ret: StackResult;

    fn invoke(&self, args: Self::Args) -> Self::Ret;
}

/// Kernel storage adapter for plain callables.
///
/// Wraps any `Fn(A1, ..) -> R` — a function item, a function pointer or a
/// capturing closure — into a [`TypedKernel`] so the typed factories of
/// [`crate::KernelFunction`] can treat it like any other kernel storage
/// instance. The `Args`/`Ret` parameters pin the signature so the wrapper
/// has a unique [`TypedKernel`] impl per callable.
pub struct FnKernel<F, Args, Ret> {
    func: F,
    _signature: PhantomData<fn(Args) -> Ret>,
}

impl<F, Args, Ret> FnKernel<F, Args, Ret> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _signature: PhantomData,
        }
    }
}

impl<F, Args, Ret> OperatorKernel for FnKernel<F, Args, Ret>
where
    F: Send + Sync + 'static,
    Args: 'static,
    Ret: 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

macro_rules! impl_fn_kernel {
    () => {
        impl<F, R> TypedKernel for FnKernel<F, (), R>
        where
            F: Fn() -> R + Send + Sync + 'static,
            R: Send + 'static,
        {
            type Args = ();
            type Ret = R;

            fn invoke(&self, _args: ()) -> R {
                (self.func)()
            }
        }
    };
    ($($arg:ident),+) => {
        impl<F, $($arg,)+ R> TypedKernel for FnKernel<F, ($($arg,)+), R>
        where
            F: Fn($($arg),+) -> R + Send + Sync + 'static,
            $($arg: Send + 'static,)+
            R: Send + 'static,
        {
            type Args = ($($arg,)+);
            type Ret = R;

            fn invoke(&self, args: Self::Args) -> R {
                #[allow(non_snake_case)]
                let ($($arg,)+) = args;
                (self.func)($($arg),+)
            }
        }
    };
}

impl_fn_kernel!();
impl_fn_kernel!(A1);
impl_fn_kernel!(A1, A2);
impl_fn_kernel!(A1, A2, A3);
impl_fn_kernel!(A1, A2, A3, A4);
impl_fn_kernel!(A1, A2, A3, A4, A5);
impl_fn_kernel!(A1, A2, A3, A4, A5, A6);
impl_fn_kernel!(A1, A2, A3, A4, A5, A6, A7);
impl_fn_kernel!(A1, A2, A3, A4, A5, A6, A7, A8);
