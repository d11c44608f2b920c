//! The type-erased kernel handle: one wrapper, three call paths.
//!
//! A [`KernelFunction`] is built once from a boxed or unboxed
//! function/functor/closure and can be called in a boxed or unboxed way.
//! When the construction form does not match the call form, the adapters in
//! [`crate::adapters`] box or unbox transparently.
//!
//! Registration tables hold these wrappers for the process lifetime; the
//! wrapper is immutable after construction except for the one-time lazy
//! materialization of a deferred kernel storage instance, which is
//! exactly-once and race-free (`OnceLock`).

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::debug;

use crate::adapters::{
    boxed_adapter, bridge_unboxed_call, BoxedKernelFn, StackArgs, StackResult, UnboxedEntry,
};
use crate::kernel::{FnKernel, OperatorKernel, TypedKernel};
use crate::signature::signature_fingerprint;
use crate::stack::Stack;

type FunctorCreator = Box<dyn Fn() -> Arc<dyn OperatorKernel> + Send + Sync>;

/// Lazily-materialized, shared kernel storage instance.
///
/// Many kernels are registered during process startup but hold members that
/// cannot be constructed that early (they depend on runtime subsystems that
/// are not up yet). Those register a creator closure instead of an instance;
/// the instance is built on the first call, at most once, and every caller
/// observes the same `Arc`.
struct LazyFunctor {
    creator: Option<FunctorCreator>,
    cell: OnceLock<Arc<dyn OperatorKernel>>,
}

impl LazyFunctor {
    fn absent() -> Self {
        Self {
            creator: None,
            cell: OnceLock::new(),
        }
    }

    fn eager(functor: Arc<dyn OperatorKernel>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(functor);
        Self {
            creator: None,
            cell,
        }
    }

    fn deferred(creator: FunctorCreator) -> Self {
        Self {
            creator: Some(creator),
            cell: OnceLock::new(),
        }
    }

    fn resolve(&self) -> Option<&dyn OperatorKernel> {
        if let Some(functor) = self.cell.get() {
            return Some(functor.as_ref());
        }
        let creator = self.creator.as_ref()?;
        let functor = self.cell.get_or_init(|| {
            debug!("materializing deferred kernel storage on first call");
            creator()
        });
        Some(functor.as_ref())
    }

    fn is_resolvable(&self) -> bool {
        self.cell.get().is_some() || self.creator.is_some()
    }
}

/// Type-erased handle to an operator kernel, callable both ways.
///
/// Built from one of the factory forms below; every factory fixes which call
/// paths are available:
///
/// | factory                     | `call_boxed` | `call_unboxed` | `call_unboxed_only` |
/// |-----------------------------|--------------|----------------|---------------------|
/// | [`from_boxed_function`]     | yes          | yes (bridged)  | fatal               |
/// | [`from_functor`]            | yes          | yes            | yes                 |
/// | [`from_functor_factory`]    | yes          | yes            | yes                 |
/// | [`from_unboxed_only_functor`]| fatal       | yes            | yes                 |
/// | [`from_function`] / [`from_closure`] | yes | yes            | yes                 |
///
/// Calling a path the wrapper does not support is a registration bug and
/// fails fatally — there is nothing to recover at runtime.
///
/// [`from_boxed_function`]: KernelFunction::from_boxed_function
/// [`from_functor`]: KernelFunction::from_functor
/// [`from_functor_factory`]: KernelFunction::from_functor_factory
/// [`from_unboxed_only_functor`]: KernelFunction::from_unboxed_only_functor
/// [`from_function`]: KernelFunction::from_function
/// [`from_closure`]: KernelFunction::from_closure
pub struct KernelFunction {
    functor: LazyFunctor,
    boxed_entry: Option<BoxedKernelFn>,
    unboxed_entry: Option<UnboxedEntry>,
    fingerprint: Option<u64>,
}

impl Default for KernelFunction {
    /// The empty, invalid wrapper registration tables start from.
    fn default() -> Self {
        Self {
            functor: LazyFunctor::absent(),
            boxed_entry: None,
            unboxed_entry: None,
            fingerprint: None,
        }
    }
}

impl fmt::Debug for KernelFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelFunction")
            .field("boxed_entry", &self.boxed_entry.is_some())
            .field("unboxed_entry", &self.unboxed_entry.is_some())
            .field("functor_resolvable", &self.functor.is_resolvable())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl KernelFunction {
    fn with_parts(
        functor: LazyFunctor,
        boxed_entry: Option<BoxedKernelFn>,
        unboxed_entry: Option<UnboxedEntry>,
        fingerprint: Option<u64>,
    ) -> Self {
        Self {
            functor,
            boxed_entry,
            unboxed_entry,
            fingerprint,
        }
    }

    /// Whether this wrapper was populated with at least one entry point.
    pub fn is_valid(&self) -> bool {
        self.boxed_entry.is_some() || self.unboxed_entry.is_some()
    }

    /// Call the kernel through the boxed convention.
    ///
    /// The stack must hold the kernel's arguments as its top suffix, in
    /// declaration order; on return it holds the result value (or nothing
    /// for unit-returning kernels).
    pub fn call_boxed(&self, stack: &mut Stack) {
        let Some(boxed) = self.boxed_entry else {
            if self.unboxed_entry.is_some() {
                panic!(
                    "tried to call call_boxed() on a kernel function that only supports \
                     the unboxed calling convention"
                );
            }
            panic!("tried to call call_boxed() on an uninitialized kernel function");
        };
        boxed(self.functor.resolve(), stack);
    }

    /// Call the kernel through its unboxed entry, and only that.
    ///
    /// Fastest path: no stack, no bridging. Fails fatally if the wrapper has
    /// no unboxed entry — use [`call_unboxed`](Self::call_unboxed) when the
    /// kernel may have been registered in boxed form.
    pub fn call_unboxed_only<Ret, Args>(&self, args: Args) -> Ret
    where
        Ret: StackResult,
        Args: StackArgs,
    {
        self.check_signature::<Ret, Args>();
        match &self.unboxed_entry {
            Some(entry) => entry.invoke(self.functor.resolve(), args),
            None if self.boxed_entry.is_some() => panic!(
                "tried to call call_unboxed_only() on a kernel function that only supports \
                 the boxed calling convention; use call_unboxed() instead"
            ),
            None => {
                panic!("tried to call call_unboxed_only() on an uninitialized kernel function")
            }
        }
    }

    /// Call the kernel with typed arguments, bridging if necessary.
    ///
    /// Prefers the unboxed entry; if the kernel only has a boxed entry, the
    /// arguments are pushed onto a transient stack and the result popped
    /// back off, transparently.
    pub fn call_unboxed<Ret, Args>(&self, args: Args) -> Ret
    where
        Ret: StackResult,
        Args: StackArgs,
    {
        self.check_signature::<Ret, Args>();
        if let Some(entry) = &self.unboxed_entry {
            return entry.invoke(self.functor.resolve(), args);
        }
        match self.boxed_entry {
            Some(boxed) => bridge_unboxed_call(boxed, self.functor.resolve(), args),
            None => panic!("tried to call call_unboxed() on an uninitialized kernel function"),
        }
    }

    /// Cross-check the caller's declared signature against the fingerprint
    /// recorded at construction. Skipped when the wrapper was built from a
    /// bare boxed function, whose static signature is unknown.
    fn check_signature<Ret: StackResult, Args: StackArgs>(&self) {
        let Some(registered) = self.fingerprint else {
            return;
        };
        let declared = signature_fingerprint::<Ret, Args>();
        if declared != registered {
            panic!(
                "unboxed call with wrong argument types: declared signature fingerprint \
                 {declared:#018x} does not match registered {registered:#018x}"
            );
        }
    }

    /// Build from a bare boxed function.
    ///
    /// No storage instance, no unboxed entry, no fingerprint: usable via
    /// [`call_boxed`](Self::call_boxed) directly and via
    /// [`call_unboxed`](Self::call_unboxed) through the reverse bridge.
    pub fn from_boxed_function(func: BoxedKernelFn) -> Self {
        Self::with_parts(LazyFunctor::absent(), Some(func), None, None)
    }

    /// Build from an eagerly-constructed kernel storage instance.
    ///
    /// Generates both entry points and records the signature fingerprint;
    /// all three call paths are available.
    pub fn from_functor<K: TypedKernel>(functor: Arc<K>) -> Self {
        debug!("registering kernel storage `{}`", type_name::<K>());
        Self::with_parts(
            LazyFunctor::eager(functor),
            Some(boxed_adapter::<K>),
            Some(UnboxedEntry::new::<K>()),
            Some(signature_fingerprint::<K::Ret, K::Args>()),
        )
    }

    /// Build from a deferred kernel storage factory.
    ///
    /// Identical to [`from_functor`](Self::from_functor) except the storage
    /// instance is constructed on the first call, exactly once, even under
    /// concurrent first use. Needed for kernels whose members cannot be
    /// constructed during process static initialization.
    pub fn from_functor_factory<K, C>(creator: C) -> Self
    where
        K: TypedKernel,
        C: Fn() -> Arc<K> + Send + Sync + 'static,
    {
        debug!(
            "registering deferred kernel storage `{}`",
            type_name::<K>()
        );
        let creator: FunctorCreator = Box::new(move || -> Arc<dyn OperatorKernel> { creator() });
        Self::with_parts(
            LazyFunctor::deferred(creator),
            Some(boxed_adapter::<K>),
            Some(UnboxedEntry::new::<K>()),
            Some(signature_fingerprint::<K::Ret, K::Args>()),
        )
    }

    /// Build from an eager kernel storage instance, suppressing the boxed
    /// entry.
    ///
    /// Escape hatch for argument shapes the boxing adapter cannot represent;
    /// the result is callable only through the typed paths.
    pub fn from_unboxed_only_functor<K: TypedKernel>(functor: Arc<K>) -> Self {
        Self::with_parts(
            LazyFunctor::eager(functor),
            None,
            Some(UnboxedEntry::new::<K>()),
            Some(signature_fingerprint::<K::Ret, K::Args>()),
        )
    }

    /// Build from a plain function.
    ///
    /// The callable is wrapped in a generated [`FnKernel`] storage type and
    /// registered through [`from_functor`](Self::from_functor). Passing a
    /// function item (rather than a function pointer) lets the compiler
    /// inline the call into the generated adapters.
    pub fn from_function<F, Args, Ret>(func: F) -> Self
    where
        FnKernel<F, Args, Ret>: TypedKernel<Args = Args, Ret = Ret>,
        Args: StackArgs,
        Ret: StackResult,
    {
        Self::from_functor(Arc::new(FnKernel::new(func)))
    }

    /// Build from a closure, capturing state included.
    ///
    /// Same machinery as [`from_function`](Self::from_function); the
    /// separate name keeps registration sites explicit about what they wrap.
    pub fn from_closure<F, Args, Ret>(closure: F) -> Self
    where
        FnKernel<F, Args, Ret>: TypedKernel<Args = Args, Ret = Ret>,
        Args: StackArgs,
        Ret: StackResult,
    {
        Self::from_functor(Arc::new(FnKernel::new(closure)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator_kernel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SumKernel;
    operator_kernel!(SumKernel);

    impl TypedKernel for SumKernel {
        type Args = (i64, i64);
        type Ret = i64;

        fn invoke(&self, (a, b): (i64, i64)) -> i64 {
            a + b
        }
    }

    fn doubling_boxed(_kernel: Option<&dyn OperatorKernel>, stack: &mut Stack) {
        let x = stack.pop().unwrap().take::<i64>();
        stack.push(x * 2);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn kernel_function_is_shareable_across_threads() {
        assert_send_sync::<KernelFunction>();
    }

    #[test]
    fn default_wrapper_is_invalid() {
        assert!(!KernelFunction::default().is_valid());
    }

    #[test]
    fn every_factory_produces_a_valid_wrapper() {
        assert!(KernelFunction::from_boxed_function(doubling_boxed).is_valid());
        assert!(KernelFunction::from_functor(Arc::new(SumKernel)).is_valid());
        assert!(KernelFunction::from_functor_factory(|| Arc::new(SumKernel)).is_valid());
        assert!(KernelFunction::from_unboxed_only_functor(Arc::new(SumKernel)).is_valid());
        assert!(KernelFunction::from_function(|x: i64| x).is_valid());
    }

    #[test]
    fn eager_functor_supports_all_three_paths() {
        let func = KernelFunction::from_functor(Arc::new(SumKernel));

        assert_eq!(func.call_unboxed::<i64, (i64, i64)>((2, 3)), 5);
        assert_eq!(func.call_unboxed_only::<i64, (i64, i64)>((2, 3)), 5);

        let mut stack = Stack::new();
        stack.push(2i64);
        stack.push(3i64);
        func.call_boxed(&mut stack);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop().unwrap().take::<i64>(), 5);
    }

    #[test]
    fn boxed_only_wrapper_bridges_typed_calls() {
        let func = KernelFunction::from_boxed_function(doubling_boxed);
        assert_eq!(func.call_unboxed::<i64, (i64,)>((4,)), 8);
    }

    #[test]
    #[should_panic(expected = "only supports the boxed calling convention")]
    fn boxed_only_wrapper_rejects_unboxed_only_calls() {
        let func = KernelFunction::from_boxed_function(doubling_boxed);
        let _: i64 = func.call_unboxed_only((4i64,));
    }

    #[test]
    #[should_panic(expected = "only supports the unboxed calling convention")]
    fn unboxed_only_wrapper_rejects_boxed_calls() {
        let func = KernelFunction::from_unboxed_only_functor(Arc::new(SumKernel));
        let mut stack = Stack::new();
        stack.push(2i64);
        stack.push(3i64);
        func.call_boxed(&mut stack);
    }

    #[test]
    #[should_panic(expected = "uninitialized kernel function")]
    fn empty_wrapper_boxed_call_is_fatal() {
        KernelFunction::default().call_boxed(&mut Stack::new());
    }

    #[test]
    #[should_panic(expected = "uninitialized kernel function")]
    fn empty_wrapper_unboxed_call_is_fatal() {
        let _: i64 = KernelFunction::default().call_unboxed((1i64,));
    }

    #[test]
    #[should_panic(expected = "wrong argument types")]
    fn fingerprint_rejects_mismatched_signature() {
        let func = KernelFunction::from_functor(Arc::new(SumKernel));
        let _: i32 = func.call_unboxed((2i32, 3i32));
    }

    #[test]
    fn boxed_only_wrapper_skips_fingerprint_check() {
        // No fingerprint was recorded, so any declared signature reaches the
        // boxed entry; the entry itself only touches one i64.
        let func = KernelFunction::from_boxed_function(doubling_boxed);
        assert_eq!(func.call_unboxed::<i64, (i64,)>((21,)), 42);
    }

    #[test]
    fn deferred_factory_runs_lazily_and_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        let func = KernelFunction::from_functor_factory(move || {
            observed.fetch_add(1, Ordering::SeqCst);
            Arc::new(SumKernel)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(func.call_unboxed::<i64, (i64, i64)>((2, 3)), 5);
        assert_eq!(func.call_unboxed::<i64, (i64, i64)>((4, 5)), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closure_factory_carries_captured_state() {
        let scale = 3i64;
        let func = KernelFunction::from_closure(move |x: i64| x * scale);
        assert_eq!(func.call_unboxed::<i64, (i64,)>((7,)), 21);

        let mut stack = Stack::new();
        stack.push(7i64);
        func.call_boxed(&mut stack);
        assert_eq!(stack.pop().unwrap().take::<i64>(), 21);
    }

    #[test]
    fn unit_returning_kernel_leaves_stack_empty() {
        let hits = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&hits);
        let func = KernelFunction::from_closure(move |_msg: String| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        func.call_unboxed::<(), (String,)>(("logged".to_string(),));

        let mut stack = Stack::new();
        stack.push("logged again".to_string());
        func.call_boxed(&mut stack);
        assert!(stack.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "left 1 value(s) on the stack, expected 0")]
    fn misbehaving_boxed_kernel_fails_arity_check() {
        fn leaves_stray(_kernel: Option<&dyn OperatorKernel>, stack: &mut Stack) {
            let _ = stack.pop();
            stack.push(1i64);
        }
        let func = KernelFunction::from_boxed_function(leaves_stray);
        func.call_unboxed::<(), (i64,)>((1,));
    }

    #[test]
    fn debug_output_reports_populated_entries() {
        let rendered = format!("{:?}", KernelFunction::from_functor(Arc::new(SumKernel)));
        assert!(rendered.contains("boxed_entry: true"));
        assert!(rendered.contains("unboxed_entry: true"));
    }
}
