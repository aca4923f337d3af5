//! Calling a function with a work item tuple unpacked into positional arguments.

/// Implemented for every `Fn(A1, .., An) -> Out` that can be shared between
/// workers, with `Args = (A1, .., An)`.
///
/// ```
/// use starpool::Invoke;
///
/// fn add(a: i32, b: i32) -> i32 { a + b }
/// assert_eq!(add.invoke((2, 3)), 5);
/// ```
pub trait Invoke<Args>: Send + Sync {
    type Output;

    fn invoke(&self, args: Args) -> Self::Output;
}

macro_rules! impl_invoke {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg,)*> Invoke<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Out + Send + Sync,
        {
            type Output = Out;

            #[inline(always)]
            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> Out {
                self($($arg),*)
            }
        }
    };
}

impl_invoke!();
impl_invoke!(A1);
impl_invoke!(A1, A2);
impl_invoke!(A1, A2, A3);
impl_invoke!(A1, A2, A3, A4);
impl_invoke!(A1, A2, A3, A4, A5);
impl_invoke!(A1, A2, A3, A4, A5, A6);
impl_invoke!(A1, A2, A3, A4, A5, A6, A7);
impl_invoke!(A1, A2, A3, A4, A5, A6, A7, A8);


#[cfg(test)]
mod tests {
    use super::Invoke;

    fn zero() -> u8 {
        0
    }

    #[test]
    fn unpacks_tuples_of_each_arity() {
        assert_eq!(zero.invoke(()), 0);
        assert_eq!((|x: i64| x * x).invoke((4,)), 16);
        assert_eq!((|a: &str, b: usize| a.repeat(b)).invoke(("ab", 2)), "abab");
        let sum8 = |a: u8, b: u8, c: u8, d: u8, e: u8, f: u8, g: u8, h: u8| {
            a + b + c + d + e + f + g + h
        };
        assert_eq!(sum8.invoke((1, 1, 1, 1, 1, 1, 1, 1)), 8);
    }
}
