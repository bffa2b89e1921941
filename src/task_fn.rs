//! The function applied to every item.
//!
//! The item is always the first argument; extra arguments are a single
//! shared value `A` lent to every call. No extras is `A = ()`, positional
//! extras are a tuple, keyword extras are a struct with named fields, and
//! [`Args`] carries both.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A function callable as `f(item, &args)`.
pub trait TaskFn<I, A>: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    fn call(&self, item: I, args: &A) -> Result<Self::Output, Self::Error>;
}

/// A [`TaskFn`] that worker processes can find by name.
///
/// Both the parent and the worker binary must see the same task under the
/// same name; declaring it as a `const` [`RemoteFn`] shared by both is the
/// usual way.
pub trait RemoteTask<I, A>: TaskFn<I, A> {
    fn name(&self) -> &'static str;
}

/// Positional and keyword extras passed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args<P, K> {
    pub positional: P,
    pub keyword: K,
}

impl<P, K> Args<P, K> {
    pub fn new(positional: P, keyword: K) -> Self {
        Self { positional, keyword }
    }
}

/// Adapter for `Fn(item)` closures that take no extra arguments.
pub struct ItemFn<G>(pub(crate) G);

impl<I, T, E, G> TaskFn<I, ()> for ItemFn<G>
where
    G: Fn(I) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    fn call(&self, item: I, _args: &()) -> Result<T, E> {
        (self.0)(item)
    }
}

/// Adapter for `Fn(item, &args)` closures.
pub struct ArgsFn<G>(pub(crate) G);

impl<I, A, T, E, G> TaskFn<I, A> for ArgsFn<G>
where
    G: Fn(I, &A) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    fn call(&self, item: I, args: &A) -> Result<T, E> {
        (self.0)(item, args)
    }
}

impl<G> fmt::Debug for ItemFn<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemFn")
    }
}

impl<G> fmt::Debug for ArgsFn<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgsFn")
    }
}

/// A named plain function that can run on threads or in worker processes.
///
/// ```
/// use concurrent_runner::RemoteFn;
///
/// fn add(x: i64, extra: &(i64,)) -> Result<i64, std::convert::Infallible> {
///     Ok(x + extra.0)
/// }
///
/// const ADD: RemoteFn<i64, (i64,), i64, std::convert::Infallible> = RemoteFn::new("add", add);
/// assert_eq!(ADD.name(), "add");
/// ```
pub struct RemoteFn<I, A, T, E> {
    name: &'static str,
    func: fn(I, &A) -> Result<T, E>,
}

impl<I, A, T, E> RemoteFn<I, A, T, E> {
    pub const fn new(name: &'static str, func: fn(I, &A) -> Result<T, E>) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<I, A, T, E> Clone for RemoteFn<I, A, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, A, T, E> Copy for RemoteFn<I, A, T, E> {}

impl<I, A, T, E> fmt::Debug for RemoteFn<I, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFn").field("name", &self.name).finish()
    }
}

impl<I, A, T, E> TaskFn<I, A> for RemoteFn<I, A, T, E>
where
    I: 'static,
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    fn call(&self, item: I, args: &A) -> Result<T, E> {
        (self.func)(item, args)
    }
}

impl<I, A, T, E> RemoteTask<I, A> for RemoteFn<I, A, T, E>
where
    I: 'static,
    A: 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn scale(x: i32, args: &Args<(i32,), Factor>) -> Result<i32, Infallible> {
        Ok((x + args.positional.0) * args.keyword.factor)
    }

    #[derive(Debug, Clone)]
    struct Factor {
        factor: i32,
    }

    const SCALE: RemoteFn<i32, Args<(i32,), Factor>, i32, Infallible> = RemoteFn::new("scale", scale);

    #[test]
    fn test_item_fn_ignores_unit_args() {
        let f = ItemFn(|x: i32| Ok::<_, Infallible>(x * 2));
        assert_eq!(f.call(4, &()).unwrap(), 8);
    }

    #[test]
    fn test_args_fn_forwards_positional() {
        let f = ArgsFn(|x: i32, extra: &(i32, i32)| Ok::<_, Infallible>(x + extra.0 + extra.1));
        assert_eq!(f.call(1, &(10, 100)).unwrap(), 111);
    }

    #[test]
    fn test_remote_fn_is_callable_locally() {
        let args = Args::new((1,), Factor { factor: 3 });
        assert_eq!(SCALE.call(2, &args).unwrap(), 9);
        assert_eq!(RemoteTask::name(&SCALE), "scale");
    }
}
