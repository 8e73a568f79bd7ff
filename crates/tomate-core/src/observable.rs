//! A value cell that notifies observers when it is written.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Observer<T> = Rc<dyn Fn(&T, &T)>;

/// Holds a value and calls every observer with `(old, new)` after a write
/// that actually changes it.
pub struct Observable<T> {
    value: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
}

impl<T: Clone + PartialEq> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RefCell::new(initial),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store `value` and notify observers. Writing the current value is a
    /// no-op and returns `false`.
    pub fn set(&self, value: T) -> bool {
        let old = {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return false;
            }
            std::mem::replace(&mut *current, value.clone())
        };

        let observers: Vec<Observer<T>> = self.observers.borrow().iter().cloned().collect();
        for observer in observers {
            observer(&old, &value);
        }
        true
    }

    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&T, &T) + 'static,
    {
        self.observers.borrow_mut().push(Rc::new(observer));
    }
}

impl<T: Clone + PartialEq + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable").field(&*self.value.borrow()).finish()
    }
}
