//! Memoization of derived references.
//!
//! UI code rebuilds its references on every evaluation pass. Handing a
//! freshly built reference to a subscription each time would tear down and
//! re-register the listener on every pass; the [`Stabilizer`] returns the
//! *same* `Arc` for as long as the inputs are equal, so downstream identity
//! checks stay quiet.
//!
//! ```ignore
//! let mut profile_ref = Stabilizer::new();
//! // every render:
//! let uid = session.borrow().user.as_ref().map(|u| u.uid);
//! let reference = profile_ref.stabilize(uid, |uid| {
//!     uid.and_then(|uid| Reference::document(&format!("users/{}", uid.to_hex())).ok())
//! });
//! profile.set_reference(reference);
//! ```

use std::sync::Arc;

/// Caches the output of a factory keyed by its dependency list.
#[derive(Debug)]
pub struct Stabilizer<D, R> {
    deps: Option<D>,
    value: Option<Arc<R>>,
    computations: u64,
}

impl<D, R> Default for Stabilizer<D, R> {
    fn default() -> Self {
        Self {
            deps: None,
            value: None,
            computations: 0,
        }
    }
}

impl<D: PartialEq, R> Stabilizer<D, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value when `deps` equals the previous dependency
    /// list, else run `factory` and cache its result.
    ///
    /// `factory` returns `None` when a required input is not available yet;
    /// that propagates as `None`, meaning "do not subscribe yet".
    pub fn stabilize(&mut self, deps: D, factory: impl FnOnce(&D) -> Option<R>) -> Option<Arc<R>> {
        if self.deps.as_ref() == Some(&deps) {
            return self.value.clone();
        }
        self.value = factory(&deps).map(Arc::new);
        self.deps = Some(deps);
        self.computations += 1;
        self.value.clone()
    }

    /// How many times the factory has run.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn test_equal_deps_return_same_instance() {
        let mut s = Stabilizer::new();
        let a = s.stabilize(("visitors".to_string(), 1), |(c, _)| Reference::collection(c).ok());
        let b = s.stabilize(("visitors".to_string(), 1), |(c, _)| Reference::collection(c).ok());
        assert!(Arc::ptr_eq(a.as_ref().unwrap(), b.as_ref().unwrap()));
        assert_eq!(s.computations(), 1);
    }

    #[test]
    fn test_changed_dep_yields_new_instance() {
        let mut s = Stabilizer::new();
        let a = s.stabilize(("users", "u1"), |(c, id)| Reference::document(&format!("{c}/{id}")).ok());
        let b = s.stabilize(("users", "u2"), |(c, id)| Reference::document(&format!("{c}/{id}")).ok());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.id(), Some("u2"));
    }

    #[test]
    fn test_changing_back_recomputes() {
        // Only the previous dependency list is remembered.
        let mut s = Stabilizer::new();
        let a = s.stabilize(1, |n| Some(*n)).unwrap();
        s.stabilize(2, |n| Some(*n));
        let c = s.stabilize(1, |n| Some(*n)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*c, 1);
        assert_eq!(s.computations(), 3);
    }

    #[test]
    fn test_not_ready_is_none_and_cached() {
        let mut s: Stabilizer<Option<&str>, Reference> = Stabilizer::new();
        let mut runs = 0;
        for _ in 0..3 {
            let r = s.stabilize(None, |uid| {
                runs += 1;
                uid.and_then(|u| Reference::document(&format!("users/{u}")).ok())
            });
            assert!(r.is_none());
        }
        assert_eq!(runs, 1);

        let r = s.stabilize(Some("abc"), |uid| uid.and_then(|u| Reference::document(&format!("users/{u}")).ok()));
        assert_eq!(r.unwrap().path(), "users/abc");
    }
}
