/// Clones a handle-like value and passes it into a `smol::unblock` closure, awaited.
///
/// Lets the synchronous, blocking OS calls behind a [`RegionSource`](crate::memory::RegionSource)
/// run on the blocking pool instead of an async executor thread.
macro_rules! await_memop {
    (
        $source:expr,
        $body:expr
    ) => {{
        let source_clone = $source.clone();

        smol::unblock(move || -> $crate::MemOpResult<_> { $body(source_clone) }).await
    }};
}

pub(crate) use await_memop;
