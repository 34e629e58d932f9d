//! Internal testing utilities for the opgraph crates.

use std::any::Any;
use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Table-driven tests.
///
/// Declare a `Case` struct holding the data for one case (it must implement
/// `Debug`), build a collection of cases and pass the test body to
/// [`test_each`](TestCases::test_each). Every case is run, even if earlier
/// ones fail. Afterwards, if any case panicked, a single panic is raised
/// which lists the index, debug representation and panic message of each
/// failing case.
///
/// ```
/// use opgraph_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     shape: &'static [usize],
///     len: usize,
/// }
///
/// let cases = [
///     Case { shape: &[2, 3], len: 6 },
///     Case { shape: &[], len: 1 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.shape.iter().product::<usize>(), case.len);
/// });
/// ```
///
/// Cases and any values captured by the test body must be unwind safe. Wrap
/// them in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe) if needed.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Run `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Run `test` with an owned clone of each case.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;
}

/// Details of a failed test case.
struct Failure {
    index: usize,
    case: String,
    message: String,
}

/// Extract the message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

fn report(failures: &[Failure]) {
    if failures.is_empty() {
        return;
    }
    let details: Vec<String> = failures
        .iter()
        .map(|f| format!("case {} {}: {}", f.index, f.case, f.message))
        .collect();
    panic!(
        "{} test cases failed:\n{}",
        failures.len(),
        details.join("\n")
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let mut failures = Vec::new();
        for (index, case) in self.into_iter().enumerate() {
            if let Err(payload) = std::panic::catch_unwind(|| test(&case)) {
                failures.push(Failure {
                    index,
                    case: format!("{:?}", case),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        report(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe,
    {
        let mut failures = Vec::new();
        for (index, case) in self.into_iter().enumerate() {
            let value = case.clone();
            let test = &test;
            if let Err(payload) = std::panic::catch_unwind(move || test(value)) {
                failures.push(Failure {
                    index,
                    case: format!("{:?}", case),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        report(&failures);
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;

    #[derive(Clone, Debug)]
    struct Case {
        x: i32,
    }

    #[test]
    fn test_test_cases_success() {
        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.clone().test_each(|case| assert!(case.x > 0));
        cases.test_each_clone(|case| assert!(case.x > 0));
    }

    #[test]
    #[should_panic(expected = "1 test cases failed:\ncase 1 Case { x: 2 }: even")]
    fn test_test_each_failure() {
        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.test_each(|case| {
            if case.x % 2 == 0 {
                panic!("even");
            }
        })
    }

    #[test]
    #[should_panic(expected = "2 test cases failed")]
    fn test_test_each_clone_failure() {
        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.test_each_clone(|case| panic!("case {}", case.x))
    }
}
