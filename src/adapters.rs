//! Boxing/unboxing adapters: the bridge between calling conventions.
//!
//! For every concrete [`TypedKernel`] type two entry points are generated at
//! registration time:
//!
//! - [`boxed_adapter`] pops the kernel's declared arguments off a [`Stack`],
//!   invokes the kernel, and pushes the result back — used when a generic
//!   caller invokes a kernel that was registered in typed form.
//! - [`unboxed_adapter`] forwards typed arguments straight to the kernel's
//!   call operator — the fast path, no stack allocation.
//!
//! [`bridge_unboxed_call`] is the reverse direction: a typed caller invoking
//! a kernel that only has a boxed entry. It boxes the arguments into a
//! transient stack and enforces the single-result invariant afterwards.
//!
//! The unboxed entry is stored type-erased inside [`UnboxedEntry`], a
//! downcastable cell holding the typed function pointer. Recovering it with
//! the wrong signature fails the downcast, which is the fatal
//! wrong-argument-types path — no raw pointer reinterpretation anywhere.

use std::any::{type_name, Any, TypeId};

use crate::kernel::{OperatorKernel, TypedKernel};
use crate::signature::SignatureTuple;
use crate::stack::Stack;

/// Entry-point shape of the boxed calling convention.
///
/// The receiver is `None` only for kernels registered as bare boxed
/// functions, which carry no storage instance.
pub type BoxedKernelFn = fn(Option<&dyn OperatorKernel>, &mut Stack);

/// Argument tuple usable with both calling conventions.
///
/// Implemented for tuples of arity 0 through 8 whose elements are
/// `Send + 'static`.
pub trait StackArgs: SignatureTuple + Send + Sized + 'static {
    const ARITY: usize;

    /// Push every element in declaration order (last argument ends on top).
    fn push_onto(self, stack: &mut Stack);

    /// Pop the argument suffix off the stack and reassemble the tuple.
    fn pop_from(stack: &mut Stack) -> Self;
}

macro_rules! impl_stack_args {
    () => {
        impl StackArgs for () {
            const ARITY: usize = 0;

            fn push_onto(self, _stack: &mut Stack) {}

            fn pop_from(_stack: &mut Stack) -> Self {}
        }
    };
    ($count:expr => $($arg:ident),+) => {
        impl<$($arg: Send + 'static),+> StackArgs for ($($arg,)+) {
            const ARITY: usize = $count;

            fn push_onto(self, stack: &mut Stack) {
                #[allow(non_snake_case)]
                let ($($arg,)+) = self;
                $( stack.push($arg); )+
            }

            fn pop_from(stack: &mut Stack) -> Self {
                // split_off_suffix already panicked if the stack was short.
                let mut args = stack.split_off_suffix(Self::ARITY).into_iter();
                ($( args.next().unwrap().take::<$arg>(), )+)
            }
        }
    };
}

impl_stack_args!();
impl_stack_args!(1 => A1);
impl_stack_args!(2 => A1, A2);
impl_stack_args!(3 => A1, A2, A3);
impl_stack_args!(4 => A1, A2, A3, A4);
impl_stack_args!(5 => A1, A2, A3, A4, A5);
impl_stack_args!(6 => A1, A2, A3, A4, A5, A6);
impl_stack_args!(7 => A1, A2, A3, A4, A5, A6, A7);
impl_stack_args!(8 => A1, A2, A3, A4, A5, A6, A7, A8);

/// Return type of a kernel under the boxed convention.
///
/// A unit return leaves zero values on the stack; any other type leaves
/// exactly one. The blanket impl distinguishes the two by `TypeId` at
/// runtime, which monomorphizes to a constant branch.
pub trait StackResult: Send + Sized + 'static {
    /// Number of stack slots this result occupies: 0 for `()`, 1 otherwise.
    fn arity() -> usize;

    /// Push the result onto the stack (no-op for unit).
    fn push_result(self, stack: &mut Stack);

    /// Pop the result off the stack (no-op for unit).
    fn take_result(stack: &mut Stack) -> Self;
}

impl<T: Send + 'static> StackResult for T {
    fn arity() -> usize {
        usize::from(TypeId::of::<T>() != TypeId::of::<()>())
    }

    fn push_result(self, stack: &mut Stack) {
        if Self::arity() == 1 {
            stack.push(self);
        }
    }

    fn take_result(stack: &mut Stack) -> Self {
        if Self::arity() == 0 {
            // T is (); rebuild it through Any so the blanket impl stays generic.
            let unit: Box<dyn Any> = Box::new(());
            return *unit.downcast::<T>().unwrap();
        }
        match stack.pop() {
            Some(value) => value.take::<T>(),
            None => panic!(
                "boxed kernel returned no value, caller expected `{}`",
                type_name::<T>()
            ),
        }
    }
}

fn resolve_receiver<K: TypedKernel>(kernel: Option<&dyn OperatorKernel>) -> &K {
    let kernel = kernel.unwrap_or_else(|| {
        panic!(
            "kernel storage instance missing for `{}`",
            type_name::<K>()
        )
    });
    kernel.as_any().downcast_ref::<K>().unwrap_or_else(|| {
        panic!(
            "kernel storage instance is not a `{}`",
            type_name::<K>()
        )
    })
}

/// Generated boxed entry for a typed kernel: pop args, invoke, push result.
pub(crate) fn boxed_adapter<K: TypedKernel>(
    kernel: Option<&dyn OperatorKernel>,
    stack: &mut Stack,
) {
    let kernel = resolve_receiver::<K>(kernel);
    let args = K::Args::pop_from(stack);
    kernel.invoke(args).push_result(stack);
}

/// Generated unboxed entry for a typed kernel: forward typed args directly.
pub(crate) fn unboxed_adapter<K: TypedKernel>(
    kernel: Option<&dyn OperatorKernel>,
    args: K::Args,
) -> K::Ret {
    resolve_receiver::<K>(kernel).invoke(args)
}

/// Typed function-pointer cell recovered by downcast at call time.
struct TypedEntry<Args, Ret> {
    call: fn(Option<&dyn OperatorKernel>, Args) -> Ret,
}

/// Type-erased container for a typed entry point.
///
/// Holds a [`TypedEntry`] behind `dyn Any`; the caller's declared `Args`/
/// `Ret` must downcast back to the registered cell type for the call to
/// proceed. This replaces the classic untyped-function-pointer
/// reinterpretation with a checked cast.
pub(crate) struct UnboxedEntry {
    entry: Box<dyn Any + Send + Sync>,
    registered: &'static str,
}

impl UnboxedEntry {
    pub(crate) fn new<K: TypedKernel>() -> Self {
        let call: fn(Option<&dyn OperatorKernel>, K::Args) -> K::Ret = unboxed_adapter::<K>;
        Self {
            entry: Box::new(TypedEntry { call }),
            registered: type_name::<fn(K::Args) -> K::Ret>(),
        }
    }

    pub(crate) fn invoke<Ret: StackResult, Args: StackArgs>(
        &self,
        kernel: Option<&dyn OperatorKernel>,
        args: Args,
    ) -> Ret {
        let typed = self
            .entry
            .downcast_ref::<TypedEntry<Args, Ret>>()
            .unwrap_or_else(|| {
                panic!(
                    "unboxed call declared `{}` but the kernel was registered as `{}`",
                    type_name::<fn(Args) -> Ret>(),
                    self.registered
                )
            });
        (typed.call)(kernel, args)
    }
}

/// Reverse bridge: invoke a boxed entry from a typed call site.
///
/// Builds a transient stack, pushes the caller's arguments in order, runs
/// the boxed entry and enforces the single-result invariant. An arity
/// mismatch here means the kernel itself is broken, not the caller's input,
/// so it is fatal.
pub(crate) fn bridge_unboxed_call<Ret: StackResult, Args: StackArgs>(
    boxed: BoxedKernelFn,
    kernel: Option<&dyn OperatorKernel>,
    args: Args,
) -> Ret {
    let mut stack = Stack::with_capacity(Args::ARITY);
    args.push_onto(&mut stack);
    boxed(kernel, &mut stack);
    if stack.len() != Ret::arity() {
        panic!(
            "boxed kernel left {} value(s) on the stack, expected {}",
            stack.len(),
            Ret::arity()
        );
    }
    Ret::take_result(&mut stack)
}
